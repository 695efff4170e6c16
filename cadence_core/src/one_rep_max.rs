//! One-rep-max estimation and personal record tracking.
//!
//! Estimates use `weight × (1 + 0.0333·reps) / (1 − 0.025·(10 − intensity))`
//! rounded to one decimal. Each exercise keeps a single best estimate that
//! only moves up; every improvement is appended to its history, and an
//! improvement over an existing estimate is reported as a personal record.

use crate::sets::{parse_intensity, parse_reps, round_to_tenth, MAX_INTENSITY};
use crate::store::{self, paths, DocumentStore};
use crate::week::Clock;
use crate::{
    AchievedWith, ExerciseKey, OneRepMaxEstimate, OneRepMaxHistoryEntry, PerformedExercise,
    PerformedSet, PersonalRecord, Result, Workout,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const REPS_COEFFICIENT: f64 = 0.0333;
const INTENSITY_COEFFICIENT: f64 = 0.025;

/// Suggested weights are rounded up to this increment
pub const WEIGHT_INCREMENT: f64 = 5.0;

fn intensity_factor(intensity: u8) -> f64 {
    1.0 - INTENSITY_COEFFICIENT * f64::from(MAX_INTENSITY.saturating_sub(intensity))
}

/// Estimate a 1RM from one set, rounded to one decimal
///
/// `reps` and `intensity` must already be validated; sets without them never
/// reach this function.
pub fn estimate_1rm(weight: f64, reps: f64, intensity: u8) -> f64 {
    round_to_tenth(weight * (1.0 + REPS_COEFFICIENT * reps) / intensity_factor(intensity))
}

/// Unrounded working weight for a target, the inverse of [`estimate_1rm`]
pub fn theoretical_weight(one_rep_max: f64, target_reps: f64, target_intensity: u8) -> f64 {
    one_rep_max * intensity_factor(target_intensity) / (1.0 + REPS_COEFFICIENT * target_reps)
}

/// Suggested working weight, always rounded up to a multiple of 5
pub fn suggest_weight(one_rep_max: f64, target_reps: f64, target_intensity: u8) -> f64 {
    let raw = theoretical_weight(one_rep_max, target_reps, target_intensity);
    let rounded = (raw / WEIGHT_INCREMENT).ceil() * WEIGHT_INCREMENT;
    // Division can land a hair under an exact multiple; never under-load
    if rounded < raw {
        rounded + WEIGHT_INCREMENT
    } else {
        rounded
    }
}

/// Highest estimate among the valid sets, with the set that produced it
///
/// Sets lacking weight, reps or a valid intensity are ignored.
pub fn best_estimate(sets: &[PerformedSet]) -> Option<(f64, AchievedWith)> {
    sets.iter()
        .filter_map(|set| {
            let weight = set.weight_value()?;
            let reps = set.reps_value()?;
            let intensity = set.intensity_value()?;
            Some((
                estimate_1rm(weight, reps, intensity),
                AchievedWith { weight, reps },
            ))
        })
        .fold(None, |best: Option<(f64, AchievedWith)>, candidate| match best {
            Some(current) if current.0 >= candidate.0 => Some(current),
            _ => Some(candidate),
        })
}

/// Suggested load for one exercise of a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightSuggestion {
    pub exercise_id: String,
    pub key: ExerciseKey,
    pub one_rep_max: f64,
    pub target_reps: f64,
    pub target_intensity: u8,
    pub weight: f64,
}

/// Reads and updates per-user 1RM estimates
#[derive(Clone)]
pub struct OneRepMaxTracker {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl OneRepMaxTracker {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn estimate_for(
        &self,
        user_id: &str,
        key: &ExerciseKey,
    ) -> Result<Option<OneRepMaxEstimate>> {
        store::load(self.store.as_ref(), &paths::one_rep_max(user_id, key)).await
    }

    pub async fn history_for(
        &self,
        user_id: &str,
        key: &ExerciseKey,
    ) -> Result<Vec<OneRepMaxHistoryEntry>> {
        store::load_all(self.store.as_ref(), &paths::one_rep_max_history(user_id, key)).await
    }

    /// Update estimates from a session's performed sets
    ///
    /// Returns the personal records set. First-ever estimates are stored but
    /// not reported. Malformed exercise references and per-exercise store
    /// failures are logged and skipped so one bad entry cannot hide the
    /// records of the others.
    pub async fn record_session(
        &self,
        user_id: &str,
        exercises: &[PerformedExercise],
    ) -> Vec<PersonalRecord> {
        let mut records = Vec::new();

        for performed in exercises {
            let Some(key) = performed.exercise.key() else {
                tracing::warn!(
                    "Skipping 1RM update for exercise {}: malformed library reference",
                    performed.exercise.reference.id
                );
                continue;
            };

            let Some((estimate, achieved_with)) = best_estimate(&performed.sets) else {
                tracing::debug!("No valid sets for {}, skipping 1RM update", key);
                continue;
            };

            match self
                .record_estimate(user_id, &key, &performed.exercise.name, estimate, achieved_with)
                .await
            {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to update 1RM for {}: {}", key, e),
            }
        }

        records
    }

    async fn record_estimate(
        &self,
        user_id: &str,
        key: &ExerciseKey,
        exercise_name: &str,
        estimate: f64,
        achieved_with: AchievedWith,
    ) -> Result<Option<PersonalRecord>> {
        let previous = self.estimate_for(user_id, key).await?;

        if let Some(ref stored) = previous {
            if estimate <= stored.current {
                tracing::debug!(
                    "1RM for {} unchanged ({} <= {})",
                    key,
                    estimate,
                    stored.current
                );
                return Ok(None);
            }
        }

        let now = self.clock.now();
        let updated = OneRepMaxEstimate {
            current: estimate,
            last_updated: now,
            achieved_with,
        };
        store::save(self.store.as_ref(), &paths::one_rep_max(user_id, key), &updated).await?;
        store::append(
            self.store.as_ref(),
            &paths::one_rep_max_history(user_id, key),
            &OneRepMaxHistoryEntry {
                estimate,
                date: now,
            },
        )
        .await?;

        match previous {
            Some(stored) => {
                tracing::info!("New 1RM for {}: {} (was {})", key, estimate, stored.current);
                Ok(Some(PersonalRecord {
                    key: key.clone(),
                    exercise_name: exercise_name.to_string(),
                    achieved_with,
                    previous: stored.current,
                    estimate,
                }))
            }
            None => {
                tracing::info!("First 1RM estimate for {}: {}", key, estimate);
                Ok(None)
            }
        }
    }

    /// Suggested weights for the exercises of a workout
    ///
    /// Uses the first planned set with a valid intensity. Exercises without a
    /// stored estimate or a usable target get no suggestion.
    pub async fn suggestions_for(
        &self,
        user_id: &str,
        workout: &Workout,
    ) -> Result<Vec<WeightSuggestion>> {
        let mut suggestions = Vec::new();

        for exercise in &workout.exercises {
            let Some(key) = exercise.key() else {
                continue;
            };
            let Some((target_reps, target_intensity)) = exercise
                .reference
                .sets
                .iter()
                .find_map(|set| parse_intensity(&set.intensity).map(|i| (parse_reps(&set.reps), i)))
            else {
                continue;
            };
            let Some(estimate) = self.estimate_for(user_id, &key).await? else {
                continue;
            };

            suggestions.push(WeightSuggestion {
                exercise_id: exercise.reference.id.clone(),
                weight: suggest_weight(estimate.current, target_reps, target_intensity),
                key,
                one_rep_max: estimate.current,
                target_reps,
                target_intensity,
            });
        }

        Ok(suggestions)
    }
}
