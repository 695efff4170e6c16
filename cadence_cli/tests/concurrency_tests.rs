//! Concurrency tests for the cadence binary.
//!
//! These tests verify that multiple processes can safely:
//! - Append to the same history file simultaneously (file locking)
//! - Rewrite the same progress document without corrupting it
//! - Read state while other processes write

use assert_cmd::Command;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cadence"));
    cmd.arg("--data-dir")
        .arg(data_dir)
        .arg("--now")
        .arg("2024-05-16");
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn write_course(data_dir: &Path, course_id: &str, session_ids: &[&str]) {
    let courses = data_dir.join("courses");
    fs::create_dir_all(&courses).unwrap();
    let sessions: Vec<Value> = session_ids
        .iter()
        .enumerate()
        .map(|(i, id)| json!({"id": id, "title": id, "order": i}))
        .collect();
    let course = json!({"id": course_id, "modules": [{"id": "m1", "sessions": sessions}]});
    fs::write(courses.join(format!("{}.json", course_id)), course.to_string()).unwrap();
}

fn write_performed(data_dir: &Path, session_id: &str) -> PathBuf {
    let completion = json!({
        "kind": "performed",
        "session_id": session_id,
        "title": session_id,
        "exercises": [{
            "exercise": {
                "reference": {"id": "e1", "primary": {"cadence": "Squat"}},
                "name": "Squat",
                "muscle_activation": {"quads": 100}
            },
            "sets": [{"reps": 5, "weight": 100, "intensity": "8/10"}]
        }]
    });
    let path = data_dir.join(format!("{}.performed.json", session_id));
    fs::write(&path, completion.to_string()).unwrap();
    path
}

#[test]
fn test_concurrent_completions_share_history_file() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    // One course per process so progress documents do not contend
    let courses: Vec<String> = (0..5).map(|i| format!("course{}", i)).collect();
    for course in &courses {
        write_course(&data_dir, course, &["s1"]);
    }
    let performed = write_performed(&data_dir, "s1");

    let handles: Vec<_> = courses
        .iter()
        .cloned()
        .map(|course| {
            let data_dir = data_dir.clone();
            let performed = performed.clone();
            thread::spawn(move || {
                cli(&data_dir)
                    .args(["complete", &course, "--performed"])
                    .arg(&performed)
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Completion thread panicked");
    }

    // Verify every completion landed on its own intact line
    let history_path = data_dir.join("store/users/local/sessionHistory.jsonl");
    let history = fs::read_to_string(&history_path).expect("Failed to read history");
    assert_eq!(history.lines().count(), 5, "Expected 5 history lines");
    for line in history.lines() {
        let record: Value = serde_json::from_str(line).expect("History line is corrupt");
        assert!(record["data"]["course_id"]
            .as_str()
            .unwrap()
            .starts_with("course"));
    }
}

#[test]
fn test_concurrent_progress_writes_stay_readable() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    write_course(&data_dir, "strength", &["a", "b", "c", "d"]);

    let handles: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .enumerate()
        .map(|(i, session)| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(i as u64 * 5));
                cli(&data_dir)
                    .args(["complete", "strength", "--skip", session])
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Skip thread panicked");
    }

    // Racing writers may overwrite each other, but never leave a torn document
    let progress_path = data_dir.join("store/users/local/progress/strength.json");
    let contents = fs::read_to_string(&progress_path).unwrap();
    let progress: Value = serde_json::from_str(&contents).expect("Progress is corrupt");
    let total = progress["total_sessions_completed"].as_u64().unwrap();
    assert!((1..=4).contains(&total));

    let leftovers: Vec<_> = fs::read_dir(progress_path.parent().unwrap())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().map_or(true, |ext| ext != "json"))
        .collect();
    assert!(leftovers.is_empty(), "Temp files left behind");

    cli(&data_dir)
        .args(["current", "strength"])
        .assert()
        .success();
}

#[test]
fn test_reads_while_writing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    write_course(&data_dir, "strength", &["a", "b"]);

    let writer_dir = data_dir.clone();
    let writer = thread::spawn(move || {
        for _ in 0..4 {
            let performed = write_performed(&writer_dir, "a");
            cli(&writer_dir)
                .args(["complete", "strength", "--performed"])
                .arg(&performed)
                .assert()
                .success();
        }
    });

    // Readers can run at any time
    for _ in 0..4 {
        cli(&data_dir).args(["volume"]).assert().success();
        cli(&data_dir)
            .args(["current", "strength"])
            .assert()
            .success();
        thread::sleep(Duration::from_millis(5));
    }

    writer.join().expect("Writer thread panicked");

    let history = fs::read_to_string(data_dir.join("store/users/local/sessionHistory.jsonl"))
        .expect("Failed to read history");
    assert_eq!(history.lines().count(), 4);
}
