//! Exercise library lookups.
//!
//! Sessions only carry `library_id -> exercise_name` pointers; the library
//! supplies descriptions, media and muscle activation tables. A small
//! built-in library covers the common barbell and bodyweight lifts.

use crate::{Error, ExerciseKey, LibraryExercise, MuscleMap, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Library id of the built-in entries
pub const BUILTIN_LIBRARY_ID: &str = "cadence";

/// External exercise library lookup
#[async_trait]
pub trait ExerciseLibrary: Send + Sync {
    async fn resolve_exercise(
        &self,
        library_id: &str,
        exercise_name: &str,
    ) -> Result<LibraryExercise>;
}

/// Library held in memory
#[derive(Clone, Debug, Default)]
pub struct StaticLibrary {
    entries: HashMap<ExerciseKey, LibraryExercise>,
}

/// On-disk library format
#[derive(Debug, Deserialize)]
struct LibraryFile {
    id: String,
    #[serde(default)]
    exercises: BTreeMap<String, LibraryExercise>,
}

impl StaticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the built-in library
    pub fn builtin() -> Self {
        DEFAULT_LIBRARY.clone()
    }

    pub fn insert(&mut self, key: ExerciseKey, exercise: LibraryExercise) {
        self.entries.insert(key, exercise);
    }

    /// Add every entry of `other`, replacing entries with the same key
    pub fn extend(&mut self, other: StaticLibrary) {
        self.entries.extend(other.entries);
    }

    /// Load libraries from a JSON file: `[{"id": ..., "exercises": {name: entry}}]`
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let files: Vec<LibraryFile> = serde_json::from_str(&contents)?;

        let mut library = Self::new();
        for file in files {
            for (name, exercise) in file.exercises {
                library.insert(ExerciseKey::new(file.id.clone(), name), exercise);
            }
        }

        tracing::info!("Loaded {} library exercises from {:?}", library.len(), path);
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ExerciseLibrary for StaticLibrary {
    async fn resolve_exercise(
        &self,
        library_id: &str,
        exercise_name: &str,
    ) -> Result<LibraryExercise> {
        self.entries
            .get(&ExerciseKey::new(library_id, exercise_name))
            .cloned()
            .ok_or_else(|| Error::ExerciseNotFound {
                library_id: library_id.to_string(),
                exercise_name: exercise_name.to_string(),
            })
    }
}

static DEFAULT_LIBRARY: Lazy<StaticLibrary> = Lazy::new(build_default_library);

fn activation(pairs: &[(&str, f64)]) -> MuscleMap {
    pairs.iter().map(|(m, p)| (m.to_string(), *p)).collect()
}

fn build_default_library() -> StaticLibrary {
    let entries: [(&str, &str, &[(&str, f64)]); 10] = [
        (
            "Bench Press",
            "Barbell press from the chest, feet planted, shoulder blades retracted.",
            &[("chest", 60.0), ("triceps", 25.0), ("front_delts", 15.0)],
        ),
        (
            "Back Squat",
            "Bar on the upper back, squat to depth with a braced trunk.",
            &[("quads", 50.0), ("glutes", 30.0), ("adductors", 10.0), ("lower_back", 10.0)],
        ),
        (
            "Deadlift",
            "Pull the bar from the floor to lockout, hinging at the hips.",
            &[("hamstrings", 30.0), ("glutes", 30.0), ("lower_back", 25.0), ("traps", 15.0)],
        ),
        (
            "Overhead Press",
            "Standing barbell press from the front rack to overhead.",
            &[("front_delts", 50.0), ("side_delts", 20.0), ("triceps", 30.0)],
        ),
        (
            "Barbell Row",
            "Hinged row pulling the bar to the lower ribs.",
            &[("lats", 40.0), ("upper_back", 35.0), ("biceps", 15.0), ("rear_delts", 10.0)],
        ),
        (
            "Pull-up",
            "Dead hang to chin over bar.",
            &[("lats", 55.0), ("biceps", 25.0), ("upper_back", 20.0)],
        ),
        (
            "Romanian Deadlift",
            "Soft-knee hinge lowering the bar along the thighs.",
            &[("hamstrings", 55.0), ("glutes", 35.0), ("lower_back", 10.0)],
        ),
        (
            "Hip Thrust",
            "Upper back on a bench, drive the hips up against a loaded bar.",
            &[("glutes", 75.0), ("hamstrings", 15.0), ("quads", 10.0)],
        ),
        (
            "Lateral Raise",
            "Raise dumbbells out to the sides to shoulder height.",
            &[("side_delts", 85.0), ("traps", 15.0)],
        ),
        (
            "Dip",
            "Lower between parallel bars and press back to lockout.",
            &[("chest", 40.0), ("triceps", 45.0), ("front_delts", 15.0)],
        ),
    ];

    let mut library = StaticLibrary::new();
    for (name, description, muscles) in entries {
        library.insert(
            ExerciseKey::new(BUILTIN_LIBRARY_ID, name),
            LibraryExercise {
                description: description.to_string(),
                media_ref: None,
                muscle_activation: activation(muscles),
            },
        );
    }
    library
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_lookup() {
        let library = StaticLibrary::builtin();
        let bench = library
            .resolve_exercise(BUILTIN_LIBRARY_ID, "Bench Press")
            .await
            .unwrap();
        assert_eq!(bench.muscle_activation["chest"], 60.0);
    }

    #[tokio::test]
    async fn test_missing_entry_errors() {
        let library = StaticLibrary::builtin();
        let result = library.resolve_exercise("other", "Bench Press").await;
        assert!(matches!(result, Err(Error::ExerciseNotFound { .. })));
    }

    #[test]
    fn test_builtin_activation_at_most_100() {
        let library = StaticLibrary::builtin();
        assert_eq!(library.len(), 10);
        for exercise in library.entries.values() {
            let total: f64 = exercise.muscle_activation.values().sum();
            assert!(total <= 100.0 + 1e-9);
        }
    }

    #[tokio::test]
    async fn test_load_and_extend() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("library.json");
        std::fs::write(
            &path,
            r#"[{"id": "coach", "exercises": {"Sled Push": {"description": "Push", "muscle_activation": {"quads": 70, "glutes": 30}}}}]"#,
        )
        .unwrap();

        let mut library = StaticLibrary::builtin();
        library.extend(StaticLibrary::load_from(&path).unwrap());

        let sled = library.resolve_exercise("coach", "Sled Push").await.unwrap();
        assert_eq!(sled.muscle_activation["quads"], 70.0);
        assert!(library
            .resolve_exercise(BUILTIN_LIBRARY_ID, "Deadlift")
            .await
            .is_ok());
    }
}
