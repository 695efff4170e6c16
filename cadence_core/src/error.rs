//! Error types for the cadence_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cadence_core operations
///
/// Only failures that would leave progress or history inconsistent are
/// returned as errors. Analytics failures (1RM, muscle volume) and
/// per-exercise library misses are logged and absorbed by their callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document store read/write failure
    #[error("Store error: {0}")]
    Store(String),

    /// Course has no sessions at all
    #[error("Course {course_id} has no sessions")]
    NoSessions { course_id: String },

    /// Explicitly requested session does not exist in the course
    #[error("Session {session_id} not found in course {course_id}")]
    SessionNotFound {
        course_id: String,
        session_id: String,
    },

    /// Exercise library has no entry for the reference
    #[error("Exercise {exercise_name} not found in library {library_id}")]
    ExerciseNotFound {
        library_id: String,
        exercise_name: String,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}
