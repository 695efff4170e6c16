//! Workout resolution: turns a session's library pointers into displayable
//! exercises.
//!
//! Lookups run concurrently. A failed lookup never fails the workout; the
//! exercise is replaced by a degraded placeholder instead.

use crate::library::ExerciseLibrary;
use crate::{ExerciseRef, ResolvedExercise, Session, Workout};
use futures_util::future::join_all;
use std::sync::Arc;

/// Resolves sessions against an exercise library
#[derive(Clone)]
pub struct WorkoutResolver {
    library: Arc<dyn ExerciseLibrary>,
}

impl WorkoutResolver {
    pub fn new(library: Arc<dyn ExerciseLibrary>) -> Self {
        Self { library }
    }

    /// Resolve every exercise of a session, in exercise order
    pub async fn resolve(&self, session: &Session) -> Workout {
        let mut references = session.exercises.clone();
        references.sort_by_key(|r| r.order);

        let exercises = join_all(references.into_iter().map(|r| self.resolve_exercise(r))).await;

        let degraded = exercises.iter().filter(|e| e.degraded).count();
        if degraded > 0 {
            tracing::warn!(
                "Session {} resolved with {} placeholder exercise(s)",
                session.id,
                degraded
            );
        }

        Workout {
            session_id: session.id.clone(),
            title: session.title.clone(),
            exercises,
            media_ref: None,
        }
    }

    async fn resolve_exercise(&self, reference: ExerciseRef) -> ResolvedExercise {
        let Some(key) = reference.key() else {
            tracing::warn!(
                "Exercise {} has {} library references, expected one",
                reference.id,
                reference.primary.len()
            );
            return ResolvedExercise::placeholder(reference);
        };

        match self
            .library
            .resolve_exercise(&key.library_id, &key.exercise_name)
            .await
        {
            Ok(entry) => {
                tracing::debug!("Resolved {}", key);
                ResolvedExercise {
                    name: key.exercise_name,
                    reference,
                    description: entry.description,
                    media_ref: entry.media_ref,
                    muscle_activation: entry.muscle_activation,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!("Library lookup failed for {}: {}", key, e);
                ResolvedExercise::placeholder(reference)
            }
        }
    }
}
