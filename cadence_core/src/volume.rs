//! Muscle volume aggregation.
//!
//! Only effective sets count: a set needs logged reps or weight and an
//! intensity of at least 7/10. Sub-threshold and unlogged sets contribute
//! nothing. Each exercise's effective set count is spread over its muscle
//! activation table, rounded per muscle, and added to the current week.

use crate::sets::round_to_tenth;
use crate::store::{self, paths, DocumentStore};
use crate::week::{week_key, Clock};
use crate::{MuscleMap, PerformedExercise, PerformedSet, Result, WeeklyMuscleVolume};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum intensity for a set to count toward volume
pub const EFFECTIVE_INTENSITY_THRESHOLD: u8 = 7;

/// True when the set has data and meets the intensity threshold
pub fn is_effective(set: &PerformedSet) -> bool {
    set.has_data()
        && set
            .intensity_value()
            .is_some_and(|intensity| intensity >= EFFECTIVE_INTENSITY_THRESHOLD)
}

pub fn effective_set_count(sets: &[PerformedSet]) -> usize {
    sets.iter().filter(|set| is_effective(set)).count()
}

/// Effective sets per muscle for one session, rounded to one decimal
pub fn session_volume(exercises: &[PerformedExercise]) -> MuscleMap {
    let mut totals = MuscleMap::new();

    for performed in exercises {
        let effective = effective_set_count(&performed.sets);
        if effective == 0 {
            continue;
        }

        let activation = &performed.exercise.muscle_activation;
        if activation.is_empty() {
            tracing::debug!(
                "No muscle activation data for {}, volume not distributed",
                performed.exercise.name
            );
            continue;
        }

        for (muscle, percent) in activation {
            if *percent <= 0.0 {
                continue;
            }
            *totals.entry(muscle.clone()).or_insert(0.0) += effective as f64 * percent / 100.0;
        }
    }

    totals
        .into_iter()
        .map(|(muscle, sets)| (muscle, round_to_tenth(sets)))
        .filter(|(_, sets)| *sets > 0.0)
        .collect()
}

/// Add a session's volume into a week's totals
pub fn merge_volume(week: &mut MuscleMap, session: &MuscleMap) {
    for (muscle, sets) in session {
        let total = week.entry(muscle.clone()).or_insert(0.0);
        *total = round_to_tenth(*total + sets);
    }
}

/// Outcome of folding one session into its week
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VolumeUpdate {
    pub week_key: String,
    pub session: MuscleMap,
    pub week: MuscleMap,
}

/// Reads and accumulates weekly muscle volume
#[derive(Clone)]
pub struct VolumeTracker {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl VolumeTracker {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn week(&self, user_id: &str, week_key: &str) -> Result<WeeklyMuscleVolume> {
        Ok(
            store::load(self.store.as_ref(), &paths::weekly_volume(user_id, week_key))
                .await?
                .unwrap_or_default(),
        )
    }

    /// Add a session's effective sets to the current week
    pub async fn record_session(
        &self,
        user_id: &str,
        exercises: &[PerformedExercise],
    ) -> Result<VolumeUpdate> {
        let week_key = week_key(self.clock.today());
        let session = session_volume(exercises);
        let mut week = self.week(user_id, &week_key).await?;

        if session.is_empty() {
            tracing::debug!("Session had no effective sets, week {} unchanged", week_key);
        } else {
            merge_volume(&mut week.muscles, &session);
            week.updated_at = Some(self.clock.now());
            store::save(
                self.store.as_ref(),
                &paths::weekly_volume(user_id, &week_key),
                &week,
            )
            .await?;
            tracing::info!(
                "Added volume for {} muscles to week {}",
                session.len(),
                week_key
            );
        }

        Ok(VolumeUpdate {
            week_key,
            session,
            week: week.muscles,
        })
    }
}
