//! Core domain types for the Cadence training engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Course templates (sessions, exercise references, planned sets)
//! - Performed data submitted by the user
//! - Per-user records (progress, 1RM estimates, volume, history)
//! - The tagged completion input accepted by the orchestrator

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Muscle group name -> effective set count (or activation percent)
pub type MuscleMap = BTreeMap<String, f64>;

// ============================================================================
// Exercise Identity
// ============================================================================

/// Identity of an exercise in an external library
///
/// Kept as two fields rather than a joined string so that names containing
/// separators never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExerciseKey {
    pub library_id: String,
    pub exercise_name: String,
}

impl ExerciseKey {
    pub fn new(library_id: impl Into<String>, exercise_name: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            exercise_name: exercise_name.into(),
        }
    }
}

impl fmt::Display for ExerciseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.exercise_name, self.library_id)
    }
}

// ============================================================================
// Course Templates
// ============================================================================

/// Planned set targets, as authored ("8-12", "8/10")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SetSpec {
    #[serde(default)]
    pub reps: String,
    #[serde(default)]
    pub intensity: String,
}

/// Pointer from a session into the exercise library
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseRef {
    pub id: String,
    /// Single-entry mapping `library_id -> exercise_name`
    #[serde(default)]
    pub primary: BTreeMap<String, String>,
    #[serde(default)]
    pub sets: Vec<SetSpec>,
    #[serde(default)]
    pub order: u32,
}

impl ExerciseRef {
    /// Library key, or None when `primary` is not exactly one entry
    pub fn key(&self) -> Option<ExerciseKey> {
        if self.primary.len() != 1 {
            return None;
        }
        self.primary
            .iter()
            .next()
            .map(|(library_id, name)| ExerciseKey::new(library_id.clone(), name.clone()))
    }
}

/// A session template owned by a course
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub module_id: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub exercises: Vec<ExerciseRef>,
    #[serde(default)]
    pub planned_date: Option<NaiveDate>,
}

/// Coach-provided content for a one-on-one schedule slot
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SlotContent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub exercises: Vec<ExerciseRef>,
    #[serde(default)]
    pub media_ref: Option<String>,
}

// ============================================================================
// Library and Resolved Workouts
// ============================================================================

/// Library entry returned by an exercise lookup
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct LibraryExercise {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub muscle_activation: MuscleMap,
}

/// An exercise reference enriched with library content
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResolvedExercise {
    pub reference: ExerciseRef,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub muscle_activation: MuscleMap,
    /// True when the library lookup failed and this is a placeholder
    #[serde(default)]
    pub degraded: bool,
}

impl ResolvedExercise {
    pub fn key(&self) -> Option<ExerciseKey> {
        self.reference.key()
    }

    /// Placeholder used when the library lookup fails
    pub fn placeholder(reference: ExerciseRef) -> Self {
        Self {
            name: reference.id.clone(),
            reference,
            description: String::new(),
            media_ref: None,
            muscle_activation: MuscleMap::new(),
            degraded: true,
        }
    }
}

/// A session with every exercise resolved
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub session_id: String,
    pub title: String,
    pub exercises: Vec<ResolvedExercise>,
    #[serde(default)]
    pub media_ref: Option<String>,
}

// ============================================================================
// Performed Data
// ============================================================================

/// A numeric field as entered by the user: either a number or free text
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SetValue {
    Number(f64),
    Text(String),
}

/// What the user actually did for one set; any field may be empty
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct PerformedSet {
    #[serde(default)]
    pub reps: Option<SetValue>,
    #[serde(default)]
    pub weight: Option<SetValue>,
    #[serde(default)]
    pub intensity: Option<String>,
}

/// Performed sets for one resolved exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PerformedExercise {
    pub exercise: ResolvedExercise,
    #[serde(default)]
    pub sets: Vec<PerformedSet>,
}

/// Completion input, explicitly tagged by the caller
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Completion {
    /// The user trained and logged exercise data
    Performed {
        session_id: String,
        title: String,
        exercises: Vec<PerformedExercise>,
        #[serde(default)]
        duration_seconds: Option<u32>,
    },
    /// The session was marked done without exercise data
    Skipped { session_id: String },
}

impl Completion {
    pub fn session_id(&self) -> &str {
        match self {
            Completion::Performed { session_id, .. } => session_id,
            Completion::Skipped { session_id } => session_id,
        }
    }

    /// Performed exercises, or None for skips and empty logs
    pub fn performed_exercises(&self) -> Option<&[PerformedExercise]> {
        match self {
            Completion::Performed { exercises, .. } if !exercises.is_empty() => Some(exercises),
            _ => None,
        }
    }
}

// ============================================================================
// Per-User Records
// ============================================================================

/// Progress of one user through one course
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Progress {
    #[serde(default)]
    pub last_session_completed: Option<String>,
    #[serde(default)]
    pub all_sessions_completed: Vec<String>,
    #[serde(default)]
    pub total_sessions_completed: u32,
    #[serde(default)]
    pub cycles_completed: u32,
    #[serde(default)]
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    pub fn has_completed(&self, session_id: &str) -> bool {
        self.all_sessions_completed.iter().any(|id| id == session_id)
    }

    /// Advance past `session_id`; only genuine completions join the completed set
    pub fn advance(&mut self, session_id: &str, genuine: bool, at: DateTime<Utc>) {
        self.last_session_completed = Some(session_id.to_string());
        self.total_sessions_completed += 1;
        self.last_completed_at = Some(at);
        if genuine && !self.has_completed(session_id) {
            self.all_sessions_completed.push(session_id.to_string());
        }
    }

    /// Point back at the first session without touching any counter
    pub fn rewind(&mut self) {
        self.last_session_completed = None;
    }

    /// Restart the course from the first session, counting a new cycle
    pub fn start_new_cycle(&mut self) {
        self.rewind();
        self.cycles_completed += 1;
    }

    /// Count a full pass through the course
    pub fn complete_cycle(&mut self) {
        self.cycles_completed += 1;
    }
}

/// Weight and reps that produced an estimate
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct AchievedWith {
    pub weight: f64,
    pub reps: f64,
}

/// Best 1RM estimate for one exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OneRepMaxEstimate {
    pub current: f64,
    pub last_updated: DateTime<Utc>,
    pub achieved_with: AchievedWith,
}

/// Append-only 1RM improvement log entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OneRepMaxHistoryEntry {
    pub estimate: f64,
    pub date: DateTime<Utc>,
}

/// Emitted when a stored estimate is beaten
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersonalRecord {
    pub key: ExerciseKey,
    pub exercise_name: String,
    pub achieved_with: AchievedWith,
    pub previous: f64,
    pub estimate: f64,
}

/// Accumulated effective sets per muscle for one week
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct WeeklyMuscleVolume {
    #[serde(default)]
    pub muscles: MuscleMap,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One exercise's sets inside a session history record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseLog {
    pub exercise_id: String,
    pub name: String,
    #[serde(default)]
    pub key: Option<ExerciseKey>,
    pub sets: Vec<PerformedSet>,
}

/// Audit record appended for every genuine completion
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionHistoryRecord {
    pub session_id: String,
    pub course_id: String,
    pub title: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    pub exercises: Vec<ExerciseLog>,
}

/// Per-exercise history entry appended alongside the session record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseHistoryEntry {
    pub session_id: String,
    pub course_id: String,
    pub date: DateTime<Utc>,
    pub sets: Vec<PerformedSet>,
}
