use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Same timetable on every weekday so the output does not depend on the
/// day the tests run.
fn valid_schedule_json() -> String {
    let day = r#"{
    "portrait_view": {
      "7 B": {"lessons": [
        {"lesson_number": 1, "display_time": "8:00-8:40", "subject": "Maths",
         "cabinet": "12", "start_time": "8:00", "end_time": "8:40"},
        {"lesson_number": 2, "display_time": "8:50-9:30", "subject": "Physics",
         "cabinet": "31", "start_time": "8:50", "end_time": "9:30"},
        {"lesson_number": 3, "display_time": "9:40", "subject": "Chemistry",
         "start_time": "9:40"}
      ]},
      "7 A": {"lessons": []},
      "10 A": {"lessons": []}
    }
  }"#;
    let entries = DAYS
        .iter()
        .map(|name| format!(r#""{name}": {day}"#))
        .collect::<Vec<_>>();
    format!("{{{}}}", entries.join(","))
}

fn write_schedule(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("schedule.json");
    fs::write(&path, content).expect("write schedule");
    path
}

#[test]
fn one_shot_board_marks_current_and_next_lessons() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--class")
        .arg("7 B")
        .arg("--at")
        .arg("08:20")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("08:20:00"))
        .stdout(predicate::str::contains(">> 1 | 8:00-8:40 | Maths | 12"))
        .stdout(predicate::str::contains("-> 2 | 8:50-9:30 | Physics | 31"))
        .stdout(predicate::str::contains("next at 8:50"));
}

#[test]
fn fixed_duration_highlights_lessons_without_end_time() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(&schedule)
        .arg("--class")
        .arg("7 B")
        .arg("--at")
        .arg("9:45:00")
        .arg("--default-duration-min")
        .arg("40")
        .assert()
        .success()
        .stdout(predicate::str::contains(">> 3 | 9:40 | Chemistry"));

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(&schedule)
        .arg("--class")
        .arg("7 B")
        .arg("--at")
        .arg("9:45:00")
        .assert()
        .success()
        .stdout(predicate::str::contains(">>").not());
}

#[test]
fn malformed_json_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), "{ not-valid-json ");

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--at")
        .arg("08:20")
        .assert()
        .failure()
        .stdout(predicate::str::contains("schedule unavailable"))
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn missing_schedule_file_fails() {
    let dir = tempdir().expect("tempdir");

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(dir.path().join("missing.json"))
        .arg("--max-ticks")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unable to read schedule file"));
}

#[test]
fn list_classes_groups_by_grade() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--list-classes")
        .assert()
        .success()
        .stdout(predicate::str::contains("7: 7 A, 7 B\n10: 10 A\n"));
}

#[test]
fn list_classes_includes_consultation_days() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());
    let consultations = dir.path().join("consultations.json");
    fs::write(
        &consultations,
        r#"{
  "Friday": [{"time": "15:00-16:00", "teacher": "Orlov", "room": 7}],
  "Tuesday": [{"time": "14:00-15:00", "teacher": "Ivanova", "room": "204"}],
  "Wednesday": []
}"#,
    )
    .expect("write consultations");

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--consultations")
        .arg(consultations)
        .arg("--list-classes")
        .assert()
        .success()
        .stdout(predicate::str::contains("7: 7 A, 7 B\n"))
        .stdout(predicate::str::contains("consultations: Tuesday, Friday\n"));
}

#[test]
fn zero_refresh_interval_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--refresh-interval")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "--refresh-interval must be greater than zero",
        ));
}

#[test]
fn unknown_consultation_day_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--consultation-day")
        .arg("Funday")
        .arg("--max-ticks")
        .arg("1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown weekday 'Funday'"));
}

#[test]
fn malformed_server_time_falls_back_to_local_clock() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--class")
        .arg("7 B")
        .arg("--server-time")
        .arg("not-a-time")
        .arg("--max-ticks")
        .arg("1")
        .arg("--log-level")
        .arg("warn")
        .assert()
        .success()
        .stdout(predicate::str::contains("unsynchronized"))
        .stderr(predicate::str::contains("falling back to the local clock"));
}

#[test]
fn server_time_is_reported_on_the_board() {
    let dir = tempdir().expect("tempdir");
    let schedule = write_schedule(dir.path(), &valid_schedule_json());

    let mut cmd = cargo_bin_cmd!("lessonclock");
    cmd.arg("--schedule")
        .arg(schedule)
        .arg("--server-time")
        .arg("12:00:00")
        .arg("--time-source")
        .arg("wall")
        .arg("--max-ticks")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("12:00:0"))
        .stdout(predicate::str::contains("LOCAL_WALL, offset"));
}
