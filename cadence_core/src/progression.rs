//! Session progression: which session a user should train next.
//!
//! Three selection modes:
//! - Automatic: the session after the last completed one, wrapping to the
//!   first at the end of the course
//! - Manual: an explicit session chosen by the caller
//! - One-on-one: today's coach-planned session, restricted to the current
//!   week
//!
//! One-on-one "nothing this week" and "nothing today" are ordinary states,
//! not errors. A course with no sessions at all is an error.

use crate::cache::{CacheKey, TtlCache};
use crate::catalog::SessionCatalog;
use crate::resolver::WorkoutResolver;
use crate::store::{self, paths, DocumentStore};
use crate::week::{in_same_week, Clock};
use crate::{Error, Progress, Result, Session, Workout};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the caller wants the session chosen
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    Automatic,
    /// Caller-picked session; `index` disambiguates repeated session ids
    Manual { session_id: String, index: usize },
    /// Coach-scheduled delivery; None asks the catalog for today's plan
    OneOnOne { planned_today: Option<String> },
}

/// Why a one-on-one lookup has nothing to show
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// No session of the course falls in the current week
    NoSessionsThisWeek,
    /// Nothing is planned for today
    NothingPlannedToday,
    /// Today's plan names a session outside this week's list
    PlannedSessionNotInWeek,
}

/// A chosen session and its position in the flattened course list
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SelectedSession {
    pub session: Session,
    pub index: usize,
    pub already_completed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Automatic(SelectedSession),
    Manual(SelectedSession),
    PlannedToday(SelectedSession),
    NoPlanningThisWeek { reason: EmptyReason },
    NoSessionToday { reason: EmptyReason },
}

impl SessionState {
    pub fn selected(&self) -> Option<&SelectedSession> {
        match self {
            SessionState::Automatic(selected)
            | SessionState::Manual(selected)
            | SessionState::PlannedToday(selected) => Some(selected),
            SessionState::NoPlanningThisWeek { .. } | SessionState::NoSessionToday { .. } => None,
        }
    }
}

/// Everything the UI needs to render the current session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub workout: Option<Workout>,
    pub progress: Progress,
}

/// Outcome of the one-on-one selection rules
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OneOnOneSelection {
    Planned(usize),
    NoPlanningThisWeek(EmptyReason),
    NoSessionToday(EmptyReason),
}

// ============================================================================
// Selection Rules
// ============================================================================

/// Index of the session after `last_completed`
///
/// Starts at 0 when nothing was completed yet, when the last id is no longer
/// in the list, or after the final session. None only for an empty list.
pub fn select_automatic(sessions: &[Session], last_completed: Option<&str>) -> Option<usize> {
    if sessions.is_empty() {
        return None;
    }

    let next = last_completed
        .and_then(|id| sessions.iter().position(|s| s.id == id))
        .map(|i| i + 1)
        .filter(|&i| i < sessions.len())
        .unwrap_or(0);
    Some(next)
}

/// Index of a manually chosen session
///
/// The caller's index wins when it points at a session with that id, so a
/// template scheduled twice resolves to the occurrence the user tapped.
/// Otherwise the first session with the id is used.
pub fn select_manual(sessions: &[Session], session_id: &str, index: usize) -> Option<usize> {
    if sessions.get(index).is_some_and(|s| s.id == session_id) {
        return Some(index);
    }
    sessions.iter().position(|s| s.id == session_id)
}

/// Apply the one-on-one rules for `today`
///
/// Sessions without a planned date always count as part of the week.
pub fn select_one_on_one(
    sessions: &[Session],
    today: NaiveDate,
    planned_today: Option<&str>,
) -> OneOnOneSelection {
    let this_week: Vec<usize> = sessions
        .iter()
        .enumerate()
        .filter(|(_, s)| s.planned_date.map_or(true, |date| in_same_week(date, today)))
        .map(|(i, _)| i)
        .collect();

    if this_week.is_empty() {
        return OneOnOneSelection::NoPlanningThisWeek(EmptyReason::NoSessionsThisWeek);
    }

    let Some(planned_id) = planned_today else {
        return OneOnOneSelection::NoSessionToday(EmptyReason::NothingPlannedToday);
    };

    match this_week.into_iter().find(|&i| sessions[i].id == planned_id) {
        Some(index) => OneOnOneSelection::Planned(index),
        None => OneOnOneSelection::NoSessionToday(EmptyReason::PlannedSessionNotInWeek),
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Chooses sessions and tracks progress for a user in a course
#[derive(Clone)]
pub struct ProgressionEngine {
    catalog: Arc<dyn SessionCatalog>,
    store: Arc<dyn DocumentStore>,
    cache: TtlCache,
    clock: Arc<dyn Clock>,
    resolver: WorkoutResolver,
}

impl ProgressionEngine {
    pub fn new(
        catalog: Arc<dyn SessionCatalog>,
        store: Arc<dyn DocumentStore>,
        cache: TtlCache,
        clock: Arc<dyn Clock>,
        resolver: WorkoutResolver,
    ) -> Self {
        Self {
            catalog,
            store,
            cache,
            clock,
            resolver,
        }
    }

    /// Flattened sessions of a course; an empty course is an error
    pub async fn sessions(&self, course_id: &str) -> Result<Vec<Session>> {
        let key = CacheKey::CourseSessions {
            course_id: course_id.to_string(),
        };
        if let Some(sessions) = self.cache.get::<Vec<Session>>(&key) {
            return Ok(sessions);
        }

        let sessions = self.catalog.get_flattened_sessions(course_id).await?;
        if sessions.is_empty() {
            return Err(Error::NoSessions {
                course_id: course_id.to_string(),
            });
        }

        self.cache.set(key, &sessions, self.cache.long_ttl());
        Ok(sessions)
    }

    /// Stored progress, default when the user has not started the course
    pub async fn progress(&self, user_id: &str, course_id: &str) -> Result<Progress> {
        let key = CacheKey::Progress {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
        };
        if let Some(progress) = self.cache.get::<Progress>(&key) {
            return Ok(progress);
        }

        let progress: Progress =
            store::load(self.store.as_ref(), &paths::progress(user_id, course_id))
                .await?
                .unwrap_or_default();
        self.cache.set(key, &progress, self.cache.short_ttl());
        Ok(progress)
    }

    /// Pick the session to show and resolve its workout
    pub async fn current_session(
        &self,
        user_id: &str,
        course_id: &str,
        mode: SelectionMode,
    ) -> Result<SessionSnapshot> {
        let state_key = CacheKey::SessionState {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
        };
        if mode == SelectionMode::Automatic {
            if let Some(snapshot) = self.cache.get::<SessionSnapshot>(&state_key) {
                tracing::debug!("Session state cache hit for {}", state_key);
                return Ok(snapshot);
            }
        }

        let sessions = self.sessions(course_id).await?;
        let progress = self.progress(user_id, course_id).await?;

        let snapshot = match mode {
            SelectionMode::Automatic => {
                let index =
                    select_automatic(&sessions, progress.last_session_completed.as_deref())
                        .ok_or_else(|| Error::NoSessions {
                            course_id: course_id.to_string(),
                        })?;
                tracing::info!(
                    "Automatic progression for {} in {}: session {} ({}/{})",
                    user_id,
                    course_id,
                    sessions[index].id,
                    index + 1,
                    sessions.len()
                );
                let selected = self.select(&sessions, index, &progress);
                let workout = self.resolver.resolve(&selected.session).await;
                let snapshot = SessionSnapshot {
                    state: SessionState::Automatic(selected),
                    workout: Some(workout),
                    progress,
                };
                self.cache.set(state_key, &snapshot, self.cache.short_ttl());
                snapshot
            }
            SelectionMode::Manual { session_id, index } => {
                let index = select_manual(&sessions, &session_id, index).ok_or_else(|| {
                    Error::SessionNotFound {
                        course_id: course_id.to_string(),
                        session_id: session_id.clone(),
                    }
                })?;
                tracing::info!("Manual selection of session {} at {}", session_id, index);
                let selected = self.select(&sessions, index, &progress);
                let workout = self.resolver.resolve(&selected.session).await;
                SessionSnapshot {
                    state: SessionState::Manual(selected),
                    workout: Some(workout),
                    progress,
                }
            }
            SelectionMode::OneOnOne { planned_today } => {
                let planned_today = match planned_today {
                    Some(id) => Some(id),
                    None => {
                        self.catalog
                            .get_planned_session_for_today(user_id, course_id)
                            .await?
                    }
                };
                self.one_on_one(user_id, course_id, &sessions, planned_today, progress)
                    .await
            }
        };

        Ok(snapshot)
    }

    async fn one_on_one(
        &self,
        user_id: &str,
        course_id: &str,
        sessions: &[Session],
        planned_today: Option<String>,
        progress: Progress,
    ) -> SessionSnapshot {
        let today = self.clock.today();
        let state = match select_one_on_one(sessions, today, planned_today.as_deref()) {
            OneOnOneSelection::Planned(index) => {
                let mut selected = self.select(sessions, index, &progress);
                let media_ref = self
                    .overlay_slot(user_id, course_id, &mut selected.session)
                    .await;
                let mut workout = self.resolver.resolve(&selected.session).await;
                workout.media_ref = media_ref;
                tracing::info!("Planned session {} for {} today", selected.session.id, user_id);
                return SessionSnapshot {
                    state: SessionState::PlannedToday(selected),
                    workout: Some(workout),
                    progress,
                };
            }
            OneOnOneSelection::NoPlanningThisWeek(reason) => {
                tracing::info!("No planning this week for {} in {}", user_id, course_id);
                SessionState::NoPlanningThisWeek { reason }
            }
            OneOnOneSelection::NoSessionToday(reason) => {
                tracing::info!("No session today for {} in {}: {:?}", user_id, course_id, reason);
                SessionState::NoSessionToday { reason }
            }
        };

        SessionSnapshot {
            state,
            workout: None,
            progress,
        }
    }

    /// Replace template content with the coach's slot content, if any
    async fn overlay_slot(
        &self,
        user_id: &str,
        course_id: &str,
        session: &mut Session,
    ) -> Option<String> {
        match self
            .catalog
            .get_slot_content(user_id, course_id, &session.id)
            .await
        {
            Ok(Some(slot)) => {
                if let Some(title) = slot.title {
                    session.title = title;
                }
                session.exercises = slot.exercises;
                slot.media_ref
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    "Slot content unavailable for session {}, using template: {}",
                    session.id,
                    e
                );
                None
            }
        }
    }

    fn select(&self, sessions: &[Session], index: usize, progress: &Progress) -> SelectedSession {
        let session = sessions[index].clone();
        let already_completed = progress.has_completed(&session.id);
        SelectedSession {
            session,
            index,
            already_completed,
        }
    }

    /// Restart the course from its first session
    ///
    /// Counts a cycle unless the pass was already counted when its last
    /// session was completed.
    pub async fn start_new_cycle(&self, user_id: &str, course_id: &str) -> Result<Progress> {
        let sessions = self.sessions(course_id).await?;
        let path = paths::progress(user_id, course_id);
        let mut progress: Progress = store::load(self.store.as_ref(), &path)
            .await?
            .unwrap_or_default();

        let pass_counted = match (sessions.last(), progress.last_session_completed.as_deref()) {
            (Some(last), Some(completed)) => last.id == completed,
            _ => false,
        };
        if pass_counted {
            progress.rewind();
        } else {
            progress.start_new_cycle();
        }
        store::save(self.store.as_ref(), &path, &progress).await?;
        self.cache.invalidate_user_course(user_id, course_id);

        tracing::info!("Restarted {} for {}", course_id, user_id);
        Ok(progress)
    }
}
