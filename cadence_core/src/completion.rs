//! Session completion.
//!
//! Completing a session runs a fixed sequence:
//! 1. Progress update (must succeed)
//! 2. Session and exercise history (must succeed, genuine completions only)
//! 3. 1RM estimates and 4. weekly muscle volume, run together; failures are
//!    logged and do not fail the completion
//! 5. Cache invalidation for the user and course, after 3 and 4 finish
//!
//! The cache is also cleared as soon as progress is saved, so a failure in
//! step 2 cannot leave the previous session cached as current.
//!
//! Skips advance progress but never touch history, 1RM or volume.

use crate::cache::TtlCache;
use crate::catalog::SessionCatalog;
use crate::one_rep_max::OneRepMaxTracker;
use crate::store::{self, paths, DocumentStore};
use crate::volume::{VolumeTracker, VolumeUpdate};
use crate::week::Clock;
use crate::{
    Completion, ExerciseHistoryEntry, ExerciseLog, PerformedExercise, PersonalRecord, Progress,
    Result, SessionHistoryRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a completion changed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletionReport {
    pub progress: Progress,
    pub personal_records: Vec<PersonalRecord>,
    /// None for skips, empty logs and failed volume updates
    pub volume: Option<VolumeUpdate>,
}

/// Records completed and skipped sessions
#[derive(Clone)]
pub struct CompletionOrchestrator {
    catalog: Arc<dyn SessionCatalog>,
    store: Arc<dyn DocumentStore>,
    cache: TtlCache,
    clock: Arc<dyn Clock>,
    one_rep_max: OneRepMaxTracker,
    volume: VolumeTracker,
}

impl CompletionOrchestrator {
    pub fn new(
        catalog: Arc<dyn SessionCatalog>,
        store: Arc<dyn DocumentStore>,
        cache: TtlCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            one_rep_max: OneRepMaxTracker::new(store.clone(), clock.clone()),
            volume: VolumeTracker::new(store.clone(), clock.clone()),
            catalog,
            store,
            cache,
            clock,
        }
    }

    pub async fn complete(
        &self,
        user_id: &str,
        course_id: &str,
        completion: Completion,
    ) -> Result<CompletionReport> {
        let now = self.clock.now();
        let session_id = completion.session_id().to_string();
        let performed = completion.performed_exercises();

        let progress = self
            .update_progress(user_id, course_id, &session_id, performed.is_some(), now)
            .await?;
        self.cache.invalidate_user_course(user_id, course_id);

        let mut report = CompletionReport {
            progress,
            personal_records: Vec::new(),
            volume: None,
        };

        if let (Some(exercises), Completion::Performed { title, duration_seconds, .. }) =
            (performed, &completion)
        {
            self.append_history(
                user_id,
                course_id,
                &session_id,
                title,
                *duration_seconds,
                exercises,
                now,
            )
            .await?;

            let (records, volume) = tokio::join!(
                self.one_rep_max.record_session(user_id, exercises),
                self.volume.record_session(user_id, exercises),
            );

            report.personal_records = records;
            report.volume = match volume {
                Ok(update) => Some(update),
                Err(e) => {
                    tracing::warn!("Volume update failed for session {}: {}", session_id, e);
                    None
                }
            };
        } else {
            tracing::info!("Session {} marked done without exercise data", session_id);
        }

        self.cache.invalidate_user_course(user_id, course_id);

        tracing::info!(
            "Completed session {} for {} in {} ({} personal records)",
            session_id,
            user_id,
            course_id,
            report.personal_records.len()
        );
        Ok(report)
    }

    async fn update_progress(
        &self,
        user_id: &str,
        course_id: &str,
        session_id: &str,
        genuine: bool,
        now: DateTime<Utc>,
    ) -> Result<Progress> {
        let path = paths::progress(user_id, course_id);
        let mut progress: Progress = store::load(self.store.as_ref(), &path)
            .await?
            .unwrap_or_default();

        progress.advance(session_id, genuine, now);

        match self.catalog.get_flattened_sessions(course_id).await {
            Ok(sessions) => {
                if sessions.last().is_some_and(|last| last.id == session_id) {
                    progress.complete_cycle();
                    tracing::info!(
                        "Cycle {} of {} finished for {}",
                        progress.cycles_completed,
                        course_id,
                        user_id
                    );
                }
            }
            Err(e) => tracing::warn!("Could not check cycle end for {}: {}", course_id, e),
        }

        store::save(self.store.as_ref(), &path, &progress).await?;
        Ok(progress)
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_history(
        &self,
        user_id: &str,
        course_id: &str,
        session_id: &str,
        title: &str,
        duration_seconds: Option<u32>,
        exercises: &[PerformedExercise],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = SessionHistoryRecord {
            session_id: session_id.to_string(),
            course_id: course_id.to_string(),
            title: title.to_string(),
            completed_at: now,
            duration_seconds,
            exercises: exercises
                .iter()
                .map(|performed| ExerciseLog {
                    exercise_id: performed.exercise.reference.id.clone(),
                    name: performed.exercise.name.clone(),
                    key: performed.exercise.key(),
                    sets: performed.sets.clone(),
                })
                .collect(),
        };
        store::append(self.store.as_ref(), &paths::session_history(user_id), &record).await?;

        for performed in exercises {
            let Some(key) = performed.exercise.key() else {
                tracing::debug!(
                    "No library key for {}, exercise history not written",
                    performed.exercise.reference.id
                );
                continue;
            };
            store::append(
                self.store.as_ref(),
                &paths::exercise_history(user_id, &key),
                &ExerciseHistoryEntry {
                    session_id: session_id.to_string(),
                    course_id: course_id.to_string(),
                    date: now,
                    sets: performed.sets.clone(),
                },
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use crate::catalog::{Course, DeliveryMode, Module, StaticCatalog};
    use crate::config::CacheConfig;
    use crate::store::{DocPath, InMemoryStore};
    use crate::week::FixedClock;
    use crate::{
        Error, ExerciseKey, ExerciseRef, PerformedSet, ResolvedExercise, Session, SetValue,
        WeeklyMuscleVolume,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::Value;
    use std::collections::BTreeMap;

    /// Store that fails writes under one top-level collection
    struct FailingStore {
        inner: InMemoryStore,
        failing_segment: &'static str,
    }

    impl FailingStore {
        fn fails(&self, path: &DocPath) -> bool {
            path.segments().get(2).is_some_and(|s| s == self.failing_segment)
        }
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn get_document(&self, path: &DocPath) -> Result<Option<Value>> {
            self.inner.get_document(path).await
        }

        async fn update_document(&self, path: &DocPath, partial: Value) -> Result<()> {
            if self.fails(path) {
                return Err(Error::Store(format!("write refused: {}", path)));
            }
            self.inner.update_document(path, partial).await
        }

        async fn append_to_subcollection(&self, path: &DocPath, record: Value) -> Result<String> {
            if self.fails(path) {
                return Err(Error::Store(format!("append refused: {}", path)));
            }
            self.inner.append_to_subcollection(path, record).await
        }

        async fn read_subcollection(&self, path: &DocPath) -> Result<Vec<Value>> {
            self.inner.read_subcollection(path).await
        }
    }

    fn session(id: &str, order: u32) -> Session {
        Session {
            id: id.into(),
            title: id.to_uppercase(),
            module_id: "m1".into(),
            order,
            exercises: vec![],
            planned_date: None,
        }
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new().with_course(Course {
            id: "c1".into(),
            title: "Course".into(),
            delivery: DeliveryMode::Linear,
            modules: vec![Module {
                id: "m1".into(),
                title: "Block".into(),
                order: 0,
                sessions: vec![session("a", 0), session("b", 1)],
            }],
            slots: BTreeMap::new(),
        })
    }

    fn bench() -> ResolvedExercise {
        ResolvedExercise {
            reference: ExerciseRef {
                id: "e1".into(),
                primary: BTreeMap::from([("lib".to_string(), "Bench Press".to_string())]),
                sets: vec![],
                order: 0,
            },
            name: "Bench Press".into(),
            description: String::new(),
            media_ref: None,
            muscle_activation: BTreeMap::from([
                ("chest".to_string(), 60.0),
                ("triceps".to_string(), 40.0),
            ]),
            degraded: false,
        }
    }

    fn performed(session_id: &str, weight: &str) -> Completion {
        Completion::Performed {
            session_id: session_id.into(),
            title: "Push".into(),
            exercises: vec![PerformedExercise {
                exercise: bench(),
                sets: vec![PerformedSet {
                    reps: Some(SetValue::Text("5".into())),
                    weight: Some(SetValue::Text(weight.into())),
                    intensity: Some("8/10".into()),
                }],
            }],
            duration_seconds: Some(1800),
        }
    }

    fn setup(store: Arc<dyn DocumentStore>) -> (CompletionOrchestrator, TtlCache) {
        let cache = TtlCache::new(&CacheConfig {
            background_sweep: false,
            ..Default::default()
        });
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 16).unwrap());
        let orchestrator =
            CompletionOrchestrator::new(Arc::new(catalog()), store, cache.clone(), Arc::new(clock));
        (orchestrator, cache)
    }

    #[tokio::test]
    async fn test_genuine_completion_runs_every_step() {
        crate::logging::init_test();
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, _) = setup(store.clone());

        let first = orchestrator.complete("u1", "c1", performed("a", "100")).await.unwrap();
        assert!(first.personal_records.is_empty());
        assert!(first.progress.has_completed("a"));
        assert_eq!(first.volume.as_ref().unwrap().session["chest"], 0.6);

        let second = orchestrator.complete("u1", "c1", performed("b", "110")).await.unwrap();
        assert_eq!(second.personal_records.len(), 1);
        assert_eq!(second.progress.total_sessions_completed, 2);
        assert_eq!(second.progress.cycles_completed, 1);
        assert_eq!(second.volume.unwrap().week["chest"], 1.2);

        let history: Vec<SessionHistoryRecord> =
            store::load_all(store.as_ref(), &paths::session_history("u1"))
                .await
                .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].duration_seconds, Some(1800));

        let per_exercise: Vec<ExerciseHistoryEntry> = store::load_all(
            store.as_ref(),
            &paths::exercise_history("u1", &ExerciseKey::new("lib", "Bench Press")),
        )
        .await
        .unwrap();
        assert_eq!(per_exercise.len(), 2);
    }

    #[tokio::test]
    async fn test_skip_advances_progress_only() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, _) = setup(store.clone());

        let report = orchestrator
            .complete("u1", "c1", Completion::Skipped { session_id: "a".into() })
            .await
            .unwrap();

        assert_eq!(report.progress.last_session_completed.as_deref(), Some("a"));
        assert_eq!(report.progress.total_sessions_completed, 1);
        assert!(!report.progress.has_completed("a"));
        assert!(report.volume.is_none());

        let history: Vec<SessionHistoryRecord> =
            store::load_all(store.as_ref(), &paths::session_history("u1"))
                .await
                .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_empty_performed_log_counts_as_skip() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, _) = setup(store.clone());

        let report = orchestrator
            .complete(
                "u1",
                "c1",
                Completion::Performed {
                    session_id: "a".into(),
                    title: "Push".into(),
                    exercises: vec![],
                    duration_seconds: None,
                },
            )
            .await
            .unwrap();
        assert!(!report.progress.has_completed("a"));
    }

    #[tokio::test]
    async fn test_progress_write_failure_is_fatal() {
        let store = Arc::new(FailingStore {
            inner: InMemoryStore::new(),
            failing_segment: "progress",
        });
        let (orchestrator, _) = setup(store);

        let result = orchestrator.complete("u1", "c1", performed("a", "100")).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_history_write_failure_is_fatal() {
        let store = Arc::new(FailingStore {
            inner: InMemoryStore::new(),
            failing_segment: "sessionHistory",
        });
        let (orchestrator, _) = setup(store);

        let result = orchestrator.complete("u1", "c1", performed("a", "100")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_analytics_failures_do_not_fail_completion() {
        crate::logging::init_test();
        let store = Arc::new(FailingStore {
            inner: InMemoryStore::new(),
            failing_segment: "weeklyVolume",
        });
        let (orchestrator, _) = setup(store.clone());

        let report = orchestrator
            .complete("u1", "c1", performed("a", "100"))
            .await
            .unwrap();
        assert!(report.volume.is_none());
        assert!(report.progress.has_completed("a"));

        let stored: Option<WeeklyMuscleVolume> = store::load(
            store.as_ref(),
            &paths::weekly_volume("u1", "2024-W20"),
        )
        .await
        .unwrap();
        assert!(stored.is_none());

        let one_rm_store = Arc::new(FailingStore {
            inner: InMemoryStore::new(),
            failing_segment: "oneRepMax",
        });
        let (orchestrator, _) = setup(one_rm_store);
        let report = orchestrator
            .complete("u1", "c1", performed("a", "100"))
            .await
            .unwrap();
        assert!(report.personal_records.is_empty());
        assert!(report.volume.is_some());
    }

    #[tokio::test]
    async fn test_completion_invalidates_cached_state() {
        let store = Arc::new(InMemoryStore::new());
        let (orchestrator, cache) = setup(store);

        let progress_key = CacheKey::Progress {
            user_id: "u1".into(),
            course_id: "c1".into(),
        };
        let state_key = CacheKey::SessionState {
            user_id: "u1".into(),
            course_id: "c1".into(),
        };
        cache.set(progress_key.clone(), &Progress::default(), cache.short_ttl());
        cache.set(state_key.clone(), &"stale", cache.short_ttl());

        orchestrator
            .complete("u1", "c1", Completion::Skipped { session_id: "a".into() })
            .await
            .unwrap();

        assert!(cache.get::<Progress>(&progress_key).is_none());
        assert!(cache.get::<String>(&state_key).is_none());
    }

    #[tokio::test]
    async fn test_history_failure_still_clears_cached_state() {
        use crate::progression::{ProgressionEngine, SelectionMode};
        use crate::resolver::WorkoutResolver;
        use crate::library::StaticLibrary;

        let store: Arc<dyn DocumentStore> = Arc::new(FailingStore {
            inner: InMemoryStore::new(),
            failing_segment: "sessionHistory",
        });
        let (orchestrator, cache) = setup(store.clone());
        let engine = ProgressionEngine::new(
            Arc::new(catalog()),
            store.clone(),
            cache,
            Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 16).unwrap())),
            WorkoutResolver::new(Arc::new(StaticLibrary::builtin())),
        );

        let before = engine
            .current_session("u1", "c1", SelectionMode::Automatic)
            .await
            .unwrap();
        assert_eq!(before.state.selected().unwrap().session.id, "a");

        let result = orchestrator.complete("u1", "c1", performed("a", "100")).await;
        assert!(result.is_err());

        let stored: Progress = store::load(store.as_ref(), &paths::progress("u1", "c1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_session_completed.as_deref(), Some("a"));

        let after = engine
            .current_session("u1", "c1", SelectionMode::Automatic)
            .await
            .unwrap();
        assert_eq!(after.state.selected().unwrap().session.id, "b");
        assert_eq!(after.progress.total_sessions_completed, 1);
    }
}
