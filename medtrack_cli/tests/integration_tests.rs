//! Integration tests for the medtrack binary.
//!
//! These tests verify end-to-end behavior including:
//! - Adding medications (structured and free-text)
//! - Occurrence listing and adherence recording
//! - The missed-sweep and its idempotence
//! - CSV rollup operations

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("medtrack"))
}

/// Add a one-dose-per-day schedule over a fixed date range
fn add_daily_aspirin(data_dir: &Path, start: &str, end: &str) {
    cli()
        .arg("add")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--name")
        .arg("aspirin")
        .arg("--dose")
        .arg("500mg")
        .arg("--time")
        .arg("08:00")
        .arg("--start")
        .arg(start)
        .arg("--end")
        .arg(end)
        .assert()
        .success();
}

/// Pull the occurrence keys out of `due` output for one day
fn due_keys(data_dir: &Path, date: &str) -> Vec<String> {
    let output = cli()
        .arg("due")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--date")
        .arg(date)
        .output()
        .expect("Failed to run due");
    assert!(output.status.success());

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.split_whitespace().last().map(str::to_string))
        .filter(|token| token.contains('@'))
        .collect()
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Medication schedule and adherence tracker",
        ));
}

#[test]
fn test_add_from_natural_language() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("add")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--text")
        .arg("aspirin 500mg twice daily")
        .assert()
        .success()
        .stdout(predicate::str::contains("Added aspirin"))
        .stdout(predicate::str::contains("08:00, 20:00"));

    assert!(temp_dir.path().join("registry.json").exists());
}

#[test]
fn test_add_as_needed_gets_no_schedule() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("add")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--text")
        .arg("inhaler 2 puffs as needed")
        .assert()
        .success()
        .stdout(predicate::str::contains("no reminder schedule"));

    cli()
        .arg("due")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--date")
        .arg("2024-01-01")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing due"));
}

#[test]
fn test_structured_add_and_list() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-31");

    cli()
        .arg("list")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("aspirin (500mg)"))
        .stdout(predicate::str::contains("08:00"));
}

#[test]
fn test_invalid_schedule_rejected() {
    let temp_dir = setup_test_dir();

    // End date before start date
    cli()
        .arg("add")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--name")
        .arg("aspirin")
        .arg("--time")
        .arg("08:00")
        .arg("--start")
        .arg("2024-01-10")
        .arg("--end")
        .arg("2024-01-05")
        .assert()
        .failure();
}

#[test]
fn test_edit_creates_new_schedule_version() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-31");

    cli()
        .arg("edit")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("aspirin")
        .arg("--dose")
        .arg("100mg")
        .arg("--time")
        .arg("09:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated aspirin"))
        .stdout(predicate::str::contains("v2"));

    cli()
        .arg("list")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("aspirin (100mg)"))
        .stdout(predicate::str::contains("v2"))
        .stdout(predicate::str::contains("09:00"));

    // Only the new version generates occurrences from here on
    cli()
        .arg("due")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--date")
        .arg("2024-01-02")
        .assert()
        .success()
        .stdout(predicate::str::contains("09:00"));
}

#[test]
fn test_old_dose_recordable_after_edit() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-03");

    // Capture the 08:00 occurrence key before the schedule is revised
    let keys = due_keys(temp_dir.path(), "2024-01-01");
    assert_eq!(keys.len(), 1);

    cli()
        .arg("edit")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("aspirin")
        .arg("--time")
        .arg("09:00")
        .assert()
        .success();

    // The dose scheduled under the old version can still be recorded
    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&keys[0])
        .arg("--at")
        .arg("2024-01-01T08:05")
        .assert()
        .success()
        .stdout(predicate::str::contains("recorded as taken"));
}

#[test]
fn test_discontinue_stops_reminders_but_keeps_history() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-03");

    let day_one = due_keys(temp_dir.path(), "2024-01-01");
    let day_two = due_keys(temp_dir.path(), "2024-01-02");
    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&day_one[0])
        .arg("--at")
        .arg("2024-01-01T08:05")
        .assert()
        .success();

    cli()
        .arg("discontinue")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("aspirin")
        .assert()
        .success()
        .stdout(predicate::str::contains("Discontinued aspirin"));

    // No further reminders, but the medication stays listed as inactive
    cli()
        .arg("due")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--date")
        .arg("2024-01-02")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing due"));
    cli()
        .arg("list")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("✗ aspirin"));

    // The recorded history survives, and new records are rejected
    let wal_content = fs::read_to_string(temp_dir.path().join("wal/adherence.wal"))
        .expect("Failed to read adherence log");
    assert!(wal_content.contains("taken"));

    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&day_two[0])
        .arg("--at")
        .arg("2024-01-02T08:05")
        .assert()
        .failure()
        .stderr(predicate::str::contains("UnknownOccurrence"));
}

#[test]
fn test_due_shows_pending_occurrences() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-03");

    cli()
        .arg("due")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--date")
        .arg("2024-01-02")
        .assert()
        .success()
        .stdout(predicate::str::contains("08:00"))
        .stdout(predicate::str::contains("[pending]"));
}

#[test]
fn test_take_records_once_and_rejects_duplicates() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-03");

    let keys = due_keys(temp_dir.path(), "2024-01-01");
    assert_eq!(keys.len(), 1);

    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&keys[0])
        .arg("--at")
        .arg("2024-01-01T08:05")
        .assert()
        .success()
        .stdout(predicate::str::contains("recorded as taken"));

    // Second write for the same occurrence must fail, with any status
    cli()
        .arg("skip")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&keys[0])
        .arg("--at")
        .arg("2024-01-01T09:00")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AlreadyRecorded"));

    // And the original status is unchanged
    cli()
        .arg("due")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--date")
        .arg("2024-01-01")
        .assert()
        .success()
        .stdout(predicate::str::contains("[taken]"));
}

#[test]
fn test_sweep_marks_missed_and_is_idempotent() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-02");

    // Well past both doses plus the 30-minute grace period
    cli()
        .arg("sweep")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--as-of")
        .arg("2024-01-03T12:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked 2 dose(s) missed"));

    // Same as_of again: nothing left to do
    cli()
        .arg("sweep")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--as-of")
        .arg("2024-01-03T12:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing newly missed"));
}

#[test]
fn test_sweep_respects_grace_period() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-01");

    // 08:20 is inside the 30-minute grace window for the 08:00 dose
    cli()
        .arg("sweep")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--as-of")
        .arg("2024-01-01T08:20")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing newly missed"));

    cli()
        .arg("sweep")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--as-of")
        .arg("2024-01-01T08:45")
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked 1 dose(s) missed"));
}

#[test]
fn test_taken_dose_is_not_swept() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-01");

    let keys = due_keys(temp_dir.path(), "2024-01-01");
    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&keys[0])
        .arg("--at")
        .arg("2024-01-01T08:05")
        .assert()
        .success();

    cli()
        .arg("sweep")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--as-of")
        .arg("2024-01-01T08:45")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing newly missed"));
}

#[test]
fn test_stats_reports_no_data_without_records() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-03");

    cli()
        .arg("stats")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("aspirin: no data"));
}

#[test]
fn test_stats_after_recording() {
    let temp_dir = setup_test_dir();

    // Schedule anchored to midnight today so the occurrence is already in
    // the past whatever time of day the test runs
    let today = chrono::Local::now().date_naive().to_string();
    cli()
        .arg("add")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--name")
        .arg("aspirin")
        .arg("--time")
        .arg("00:00")
        .arg("--start")
        .arg(&today)
        .arg("--end")
        .arg(&today)
        .assert()
        .success();

    let keys = due_keys(temp_dir.path(), &today);
    assert_eq!(keys.len(), 1);

    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&keys[0])
        .assert()
        .success();

    cli()
        .arg("stats")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--days")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("aspirin: 100%"));
}

#[test]
fn test_rollup_archives_log() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-02");

    cli()
        .arg("sweep")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--as-of")
        .arg("2024-01-03T12:00")
        .assert()
        .success();

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--cleanup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 2 records"));

    assert!(temp_dir.path().join("adherence.csv").exists());
    assert!(!temp_dir.path().join("wal/adherence.wal").exists());

    // Archived records still count: the missed doses stay visible
    cli()
        .arg("due")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--date")
        .arg("2024-01-01")
        .assert()
        .success()
        .stdout(predicate::str::contains("[missed]"));
}

#[test]
fn test_rollup_with_nothing_to_do() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to roll up"));
}

#[test]
fn test_records_persist_in_wal() {
    let temp_dir = setup_test_dir();
    add_daily_aspirin(temp_dir.path(), "2024-01-01", "2024-01-01");

    let keys = due_keys(temp_dir.path(), "2024-01-01");
    cli()
        .arg("take")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg(&keys[0])
        .arg("--at")
        .arg("2024-01-01T08:05")
        .assert()
        .success();

    let wal_content = fs::read_to_string(temp_dir.path().join("wal/adherence.wal"))
        .expect("Failed to read adherence log");
    assert!(wal_content.contains("occurrence_key"));
    assert!(wal_content.contains("taken"));
}
