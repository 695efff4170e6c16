#![forbid(unsafe_code)]

//! Core domain model and business logic for the Cadence training engine.
//!
//! This crate provides:
//! - Domain types (courses, sessions, performed sets, per-user records)
//! - Set parsing, 1RM estimation and muscle volume aggregation
//! - Session progression and workout resolution
//! - Completion orchestration over a pluggable document store
//! - TTL caching, configuration and logging

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod sets;
pub mod week;
pub mod store;
pub mod file_store;
pub mod cache;
pub mod library;
pub mod catalog;
pub mod resolver;
pub mod one_rep_max;
pub mod volume;
pub mod progression;
pub mod completion;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use cache::{CacheKey, TtlCache};
pub use catalog::{Course, FileCatalog, SessionCatalog, StaticCatalog};
pub use completion::{CompletionOrchestrator, CompletionReport};
pub use file_store::JsonFileStore;
pub use library::{ExerciseLibrary, StaticLibrary};
pub use one_rep_max::{estimate_1rm, suggest_weight, OneRepMaxTracker};
pub use progression::{ProgressionEngine, SelectionMode, SessionSnapshot, SessionState};
pub use resolver::WorkoutResolver;
pub use sets::{parse_intensity, parse_reps};
pub use store::{DocPath, DocumentStore, InMemoryStore};
pub use volume::VolumeTracker;
pub use week::{week_key, Clock, FixedClock, SystemClock};
