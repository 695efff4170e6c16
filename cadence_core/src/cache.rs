//! In-memory TTL cache for session state and progress lookups.
//!
//! Values are stored serialized so one cache instance can hold progress,
//! course structures and session snapshots side by side. Expired entries
//! are dropped lazily on read and, when a tokio runtime is available, by a
//! background sweep that stops once the last cache handle is dropped.

use crate::config::CacheConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// What a cache entry holds, scoped to a user and course
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Selected session + resolved workout for automatic progression
    SessionState { user_id: String, course_id: String },
    /// Progress record
    Progress { user_id: String, course_id: String },
    /// Flattened, ordered session list of a course
    CourseSessions { course_id: String },
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::SessionState { user_id, course_id } => {
                write!(f, "session:{}:{}", user_id, course_id)
            }
            CacheKey::Progress { user_id, course_id } => {
                write!(f, "progress:{}:{}", user_id, course_id)
            }
            CacheKey::CourseSessions { course_id } => write!(f, "course:{}", course_id),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Entries = Arc<Mutex<HashMap<CacheKey, CacheEntry>>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared TTL cache; clones share the same entries
#[derive(Clone)]
pub struct TtlCache {
    entries: Entries,
    short_ttl: Duration,
    long_ttl: Duration,
    // Dropping the last sender stops the sweep task
    _sweep_shutdown: Option<Arc<tokio::sync::mpsc::Sender<()>>>,
}

impl TtlCache {
    pub fn new(config: &CacheConfig) -> Self {
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));

        let sweep_shutdown = match tokio::runtime::Handle::try_current() {
            Ok(handle) if config.background_sweep => {
                let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
                let sweep_entries = entries.clone();
                let period = config.sweep_interval();

                handle.spawn(async move {
                    let mut interval = tokio::time::interval(period);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                sweep(&sweep_entries);
                            }
                            _ = shutdown_rx.recv() => {
                                tracing::debug!("Cache sweep task stopping");
                                break;
                            }
                        }
                    }
                });

                Some(Arc::new(shutdown_tx))
            }
            _ => None,
        };

        Self {
            entries,
            short_ttl: config.short_ttl(),
            long_ttl: config.long_ttl(),
            _sweep_shutdown: sweep_shutdown,
        }
    }

    /// TTL for session state and progress (minutes)
    pub fn short_ttl(&self) -> Duration {
        self.short_ttl
    }

    /// TTL for course structure (hours)
    pub fn long_ttl(&self) -> Duration {
        self.long_ttl
    }

    /// Cached value, or None when missing, expired or undecodable
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(key)?;

        if entry.is_expired(Instant::now()) {
            entries.remove(key);
            tracing::debug!("Cache entry {} expired", key);
            return None;
        }

        match serde_json::from_slice(&entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Dropping undecodable cache entry {}: {}", key, e);
                entries.remove(key);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: CacheKey, value: &T, ttl: Duration) {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Not caching {}: {}", key, e);
                return;
            }
        };

        let now = Instant::now();
        lock(&self.entries).insert(
            key,
            CacheEntry {
                data,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &CacheKey) {
        lock(&self.entries).remove(key);
    }

    /// Drop session state and progress for one user in one course
    pub fn invalidate_user_course(&self, user_id: &str, course_id: &str) {
        let mut entries = lock(&self.entries);
        entries.remove(&CacheKey::SessionState {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
        });
        entries.remove(&CacheKey::Progress {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
        });
        tracing::debug!("Invalidated cached state for {}/{}", user_id, course_id);
    }

    /// Remove expired entries now; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.entries)
    }

    /// Age of a live entry
    pub fn age(&self, key: &CacheKey) -> Option<Duration> {
        let entries = lock(&self.entries);
        let entry = entries.get(key)?;
        let now = Instant::now();
        (!entry.is_expired(now)).then(|| now.duration_since(entry.created_at))
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut entries = lock(entries);
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    let removed = before - entries.len();
    if removed > 0 {
        tracing::debug!("Swept {} expired cache entries", removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache {
        TtlCache::new(&CacheConfig {
            background_sweep: false,
            ..Default::default()
        })
    }

    fn progress_key() -> CacheKey {
        CacheKey::Progress {
            user_id: "u1".into(),
            course_id: "c1".into(),
        }
    }

    #[test]
    fn test_set_and_get() {
        let cache = cache();
        cache.set(progress_key(), &vec![1, 2, 3], Duration::from_secs(60));

        let value: Option<Vec<i32>> = cache.get(&progress_key());
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(cache.age(&progress_key()).is_some());
    }

    #[test]
    fn test_expired_entry_is_dropped_on_read() {
        let cache = cache();
        cache.set(progress_key(), &"stale", Duration::ZERO);

        let value: Option<String> = cache.get(&progress_key());
        assert!(value.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_user_course_keeps_course_structure() {
        let cache = cache();
        let ttl = Duration::from_secs(60);
        cache.set(progress_key(), &1, ttl);
        cache.set(
            CacheKey::SessionState {
                user_id: "u1".into(),
                course_id: "c1".into(),
            },
            &2,
            ttl,
        );
        cache.set(
            CacheKey::CourseSessions {
                course_id: "c1".into(),
            },
            &3,
            ttl,
        );

        cache.invalidate_user_course("u1", "c1");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = cache();
        cache.set(progress_key(), &1, Duration::ZERO);
        cache.set(
            CacheKey::CourseSessions {
                course_id: "c1".into(),
            },
            &2,
            Duration::from_secs(60),
        );

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let cache = cache();
        cache.set(progress_key(), &"text", Duration::from_secs(60));
        let value: Option<u32> = cache.get(&progress_key());
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_background_sweep() {
        let cache = TtlCache::new(&CacheConfig {
            background_sweep: true,
            sweep_interval_secs: 1,
            ..Default::default()
        });
        cache.set(progress_key(), &1, Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(progress_key().to_string(), "progress:u1:c1");
    }
}
