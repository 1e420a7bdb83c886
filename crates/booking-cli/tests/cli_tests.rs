//! Integration tests for the `booking` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to drive the binary against a
//! snapshot file in a per-test temp directory, configured through `BOOKING_*`
//! environment variables.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

/// Helper: a fresh snapshot path under the system temp dir.
fn store_path(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("booking-cli-{}-{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("temp dir must be creatable");
    dir.join("appointments.json")
}

/// Helper: the binary pointed at `store`, isolated from any user config.
fn booking(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("booking").unwrap();
    cmd.env("BOOKING_STORE", store)
        .env("BOOKING_TIMEZONE", "America/Montevideo")
        .env("XDG_CONFIG_HOME", store.parent().unwrap())
        .env_remove("RUST_LOG");
    cmd
}

/// Helper: book appointment A, weekly on Thursdays at 10:00 for 30 minutes.
fn book_thursdays(store: &Path) {
    booking(store)
        .args([
            "book",
            "--id",
            "A",
            "--service",
            "haircut",
            "--start",
            "2024-01-04T10:00:00",
            "--duration",
            "30",
            "--freq",
            "weekly",
            "--weekday",
            "3",
            "--title",
            "Juan",
        ])
        .assert()
        .success()
        .stdout("A\n");
}

fn list_january(store: &Path) -> Vec<Value> {
    let output = booking(store)
        .args([
            "--json",
            "list",
            "2024-01-01T00:00:00",
            "2024-01-31T23:59:59",
            "--now",
            "2024-01-01T00:00:00",
        ])
        .output()
        .expect("binary runs");
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("JSON output");
    value.as_array().expect("array").clone()
}

// ─────────────────────────────────────────────────────────────────────────────
// Book and list
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn book_then_list_shows_every_instance() {
    let store = store_path("book-list");
    book_thursdays(&store);

    booking(&store)
        .args([
            "list",
            "2024-01-01T00:00:00",
            "2024-01-31T23:59:59",
            "--now",
            "2024-01-01T00:00:00",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("A::2024-01-04T10:00:00"))
        .stdout(predicate::str::contains("A::2024-01-25T10:00:00"))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("Juan"));

    assert_eq!(list_january(&store).len(), 4);
}

#[test]
fn store_file_uses_the_snapshot_format() {
    let store = store_path("snapshot");
    book_thursdays(&store);

    let json = std::fs::read_to_string(&store).expect("store file written");
    let value: Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["version"], 1);
    assert_eq!(value["appointments"][0]["startDateTime"], "2024-01-04T10:00:00");
    assert_eq!(value["appointments"][0]["durationMin"], 30);
    assert_eq!(value["appointments"][0]["rrule"]["freq"], "WEEKLY");
}

#[test]
fn double_booking_is_refused() {
    let store = store_path("double");
    book_thursdays(&store);

    booking(&store)
        .args([
            "book",
            "--service",
            "beard",
            "--start",
            "2024-01-11T10:15:00",
            "--duration",
            "30",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlaps"));

    let json = std::fs::read_to_string(&store).unwrap();
    assert!(!json.contains("beard"), "refused booking is not stored");
}

#[test]
fn invalid_duration_is_refused() {
    let store = store_path("duration");

    booking(&store)
        .args([
            "book",
            "--service",
            "beard",
            "--start",
            "2024-01-11T10:00:00",
            "--duration",
            "20",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("multiple of 15"));
}

#[test]
fn non_canonical_times_are_rejected_at_parse_time() {
    let store = store_path("canonical");

    booking(&store)
        .args(["list", "2024-01-01T00:00:00-03:00", "2024-01-31T23:59:59"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid time"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Slot checks and free slots
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn check_reports_conflicts() {
    let store = store_path("check");
    book_thursdays(&store);

    booking(&store)
        .args(["check", "2024-01-11T10:00:00", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unavailable"))
        .stdout(predicate::str::contains("A::2024-01-11T10:00:00 (30 min overlap)"));

    booking(&store)
        .args(["check", "2024-01-11T10:30:00", "30"])
        .assert()
        .success()
        .stdout("available\n");

    booking(&store)
        .args(["check", "2024-01-11T10:00:00", "30", "--exclude", "A"])
        .assert()
        .success()
        .stdout("available\n");
}

#[test]
fn free_lists_gaps_of_the_day() {
    let store = store_path("free");
    book_thursdays(&store);

    let output = booking(&store)
        .args(["--json", "free", "2024-01-11", "--min", "60"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let slots: Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(slots[0]["start"], "2024-01-11T00:00:00");
    assert_eq!(slots[0]["end"], "2024-01-11T10:00:00");
    assert_eq!(slots[1]["start"], "2024-01-11T10:30:00");
    assert_eq!(slots[1]["durationMinutes"], 810);
}

// ─────────────────────────────────────────────────────────────────────────────
// Occurrence edits
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn cancel_removes_one_instance() {
    let store = store_path("cancel");
    book_thursdays(&store);

    booking(&store)
        .args(["cancel", "A::2024-01-11T10:00:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cancelled A::2024-01-11T10:00:00"));

    let ids: Vec<Value> = list_january(&store).iter().map(|o| o["id"].clone()).collect();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&Value::from("A::2024-01-11T10:00:00")));
}

#[test]
fn cancel_of_a_non_instance_fails() {
    let store = store_path("cancel-bogus");
    book_thursdays(&store);

    booking(&store)
        .args(["cancel", "A::2024-01-12T10:00:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an occurrence"));
}

#[test]
fn move_keeps_the_occurrence_identity() {
    let store = store_path("move");
    book_thursdays(&store);

    booking(&store)
        .args([
            "move",
            "A::2024-01-18T10:00:00",
            "--to",
            "2024-01-19T09:00:00",
        ])
        .assert()
        .success();

    let occurrences = list_january(&store);
    let moved = occurrences
        .iter()
        .find(|o| o["id"] == "A::2024-01-18T10:00:00")
        .expect("moved occurrence still listed");
    assert_eq!(moved["start"], "2024-01-19T09:00:00");
    assert_eq!(moved["moved"], true);
}

#[test]
fn detach_creates_a_single_appointment() {
    let store = store_path("detach");
    book_thursdays(&store);

    let output = booking(&store)
        .args(["detach", "A::2024-01-25T10:00:00"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let new_id = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert_eq!(new_id.len(), 36);

    let ids: Vec<Value> = list_january(&store).iter().map(|o| o["id"].clone()).collect();
    assert!(ids.contains(&Value::from(new_id)));
    assert!(!ids.contains(&Value::from("A::2024-01-25T10:00:00")));
}

#[test]
fn cancel_series_deletes_everything() {
    let store = store_path("cancel-series");
    book_thursdays(&store);
    booking(&store)
        .args(["cancel", "A::2024-01-11T10:00:00"])
        .assert()
        .success();

    booking(&store)
        .args(["cancel-series", "A"])
        .assert()
        .success()
        .stdout("deleted A\n");

    assert!(list_january(&store).is_empty());
    let snapshot: Value = serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
    assert!(snapshot["exceptions"].as_array().unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn mark_refuses_series_instances() {
    let store = store_path("mark-series");
    book_thursdays(&store);

    booking(&store)
        .args(["mark", "A", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("detach it first"));
}

#[test]
fn settle_persists_done_for_ended_singles() {
    let store = store_path("settle");
    booking(&store)
        .args([
            "book",
            "--id",
            "S",
            "--service",
            "beard",
            "--start",
            "2024-01-10T09:00:00",
            "--duration",
            "30",
        ])
        .assert()
        .success();

    booking(&store)
        .args(["settle", "--now", "2024-01-10T12:00:00"])
        .assert()
        .success()
        .stdout("S\n");

    // Second run has nothing left to do.
    booking(&store)
        .args(["settle", "--now", "2024-01-10T12:00:00"])
        .assert()
        .success()
        .stdout("");

    let snapshot: Value = serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(snapshot["appointments"][0]["status"], "done");
}

#[test]
fn mark_sets_an_explicit_status() {
    let store = store_path("mark");
    booking(&store)
        .args([
            "book",
            "--id",
            "S",
            "--service",
            "beard",
            "--start",
            "2024-01-10T09:00:00",
            "--duration",
            "30",
        ])
        .assert()
        .success();

    booking(&store)
        .args(["mark", "S", "cancelled"])
        .assert()
        .success()
        .stdout("S cancelled\n");

    booking(&store)
        .args(["mark", "S", "finished"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unknown_timezone_is_a_config_error() {
    let store = store_path("bad-zone");

    booking(&store)
        .env("BOOKING_TIMEZONE", "Mars/Olympus_Mons")
        .args(["list", "2024-01-01T00:00:00", "2024-01-31T23:59:59"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid timezone"));
}

#[test]
fn explicit_config_file_must_exist() {
    let store = store_path("missing-config");
    let missing = store.parent().unwrap().join("nope.toml");

    booking(&store)
        .args(["--config", missing.to_str().unwrap(), "list", "2024-01-01T00:00:00", "2024-01-02T00:00:00"])
        .assert()
        .failure();
}

#[test]
fn config_file_sets_the_store() {
    let store = store_path("config-file");
    let config = store.parent().unwrap().join("config.toml");
    let other_store = store.parent().unwrap().join("from-config.json");
    std::fs::write(
        &config,
        format!(
            "timezone = \"America/Montevideo\"\nstore = \"{}\"\n",
            other_store.display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("booking").unwrap();
    cmd.env_remove("BOOKING_STORE")
        .env_remove("BOOKING_TIMEZONE")
        .args([
            "--config",
            config.to_str().unwrap(),
            "book",
            "--id",
            "S",
            "--service",
            "beard",
            "--start",
            "2024-01-10T09:00:00",
            "--duration",
            "30",
        ])
        .assert()
        .success();

    assert!(other_store.exists(), "store path taken from the config file");
}

#[test]
fn unreadable_records_do_not_block_the_store() {
    let store = store_path("unreadable");
    std::fs::write(
        &store,
        r#"{
  "version": 1,
  "appointments": [
    { "id": "A", "serviceId": "x", "durationMin": 30, "startDateTime": "2024-01-05T10:00:00.000-03:00" },
    { "id": "C", "serviceId": "x", "durationMin": 30, "startDateTime": "next tuesday" }
  ],
  "exceptions": []
}"#,
    )
    .unwrap();

    booking(&store)
        .args([
            "list",
            "2024-01-01T00:00:00",
            "2024-01-31T23:59:59",
            "--now",
            "2024-01-01T00:00:00",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-01-05T10:00:00  2024-01-05T10:30:00"))
        .stderr(predicate::str::contains("unreadable appointments record C"));
}
