//! Tests for the booking write guard.

use chrono::DateTime;
use chrono_tz::Tz;
use occurrence_engine::availability::longest_duration_minutes;
use occurrence_engine::{
    check_availability, Appointment, Availability, CivilTime, EngineError, Exception,
    RecurrenceRule, WallClock,
};

fn clock() -> WallClock {
    WallClock::from_name("America/Montevideo").expect("valid zone")
}

fn civil(s: &str) -> CivilTime {
    s.parse().expect("canonical time")
}

fn at(s: &str) -> DateTime<Tz> {
    clock().from_canonical(s).expect("canonical time")
}

fn thursdays() -> Appointment {
    Appointment::recurring(
        "A",
        "haircut",
        civil("2024-01-04T10:00:00"),
        30,
        RecurrenceRule::weekly([3]),
    )
}

fn check(
    appointments: &[Appointment],
    exceptions: &[Exception],
    start: &str,
    duration: u32,
    exclude: Option<&str>,
) -> Availability {
    check_availability(
        appointments,
        exceptions,
        &clock(),
        &at(start),
        duration,
        exclude,
        &at("2024-01-01T00:00:00"),
    )
    .expect("should check")
}

// ---------------------------------------------------------------------------
// Recurring instances
// ---------------------------------------------------------------------------

#[test]
fn generated_instance_blocks_its_slot() {
    let result = check(&[thursdays()], &[], "2024-01-11T10:00:00", 30, None);

    assert!(!result.available);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(
        result.conflicts[0].occurrence.to_string(),
        "A::2024-01-11T10:00:00"
    );
}

#[test]
fn excluded_series_does_not_block_itself() {
    let result = check(&[thursdays()], &[], "2024-01-11T10:00:00", 30, Some("A"));

    assert!(result.available);
}

#[test]
fn back_to_back_is_available() {
    let after = check(&[thursdays()], &[], "2024-01-11T10:30:00", 30, None);
    let before = check(&[thursdays()], &[], "2024-01-11T09:30:00", 30, None);

    assert!(after.available);
    assert!(before.available);
}

#[test]
fn partial_overlap_reports_overlap_minutes() {
    let result = check(&[thursdays()], &[], "2024-01-11T10:15:00", 30, None);

    assert!(!result.available);
    assert_eq!(result.conflicts[0].overlap_minutes, 15);
}

#[test]
fn skipped_instance_frees_its_slot() {
    let skip = Exception::skip("x1", "A", civil("2024-01-11T10:00:00"));

    let result = check(&[thursdays()], &[skip], "2024-01-11T10:00:00", 30, None);

    assert!(result.available);
}

#[test]
fn moved_instance_blocks_its_new_slot_only() {
    let mv = Exception::moved(
        "x1",
        "A",
        civil("2024-01-18T10:00:00"),
        Some(civil("2024-01-19T09:00:00")),
        None,
    );
    let exceptions = [mv];

    let old_slot = check(&[thursdays()], &exceptions, "2024-01-18T10:00:00", 30, None);
    let new_slot = check(&[thursdays()], &exceptions, "2024-01-19T09:00:00", 30, None);

    assert!(old_slot.available, "the original slot is free after the move");
    assert!(!new_slot.available, "the moved occurrence blocks its new slot");
}

#[test]
fn lengthened_move_blocks_the_extra_time() {
    let mv = Exception::moved("x1", "A", civil("2024-01-11T10:00:00"), None, Some(90));

    let result = check(&[thursdays()], &[mv], "2024-01-11T11:00:00", 15, None);

    assert!(!result.available);
}

// ---------------------------------------------------------------------------
// One-off appointments and day boundaries
// ---------------------------------------------------------------------------

#[test]
fn single_running_past_midnight_blocks_next_morning() {
    let late = Appointment::single("S", "color", civil("2024-01-10T23:00:00"), 120);

    let result = check(&[late], &[], "2024-01-11T00:30:00", 30, None);

    assert!(!result.available);
    assert_eq!(result.conflicts[0].overlap_minutes, 30);
}

#[test]
fn scan_window_reaches_back_by_the_longest_duration() {
    let late = Appointment::single("S", "color", civil("2024-01-10T23:00:00"), 120);

    let result = check(&[late, thursdays()], &[], "2024-01-11T00:30:00", 30, None);

    assert_eq!(result.window_start, at("2024-01-10T22:30:00"));
    assert_eq!(result.window_end, at("2024-01-11T01:00:00"));
}

#[test]
fn longest_duration_considers_moves() {
    let mv = Exception::moved("x1", "A", civil("2024-01-11T10:00:00"), None, Some(240));

    assert_eq!(longest_duration_minutes(&[thursdays()], &[]), 30);
    assert_eq!(longest_duration_minutes(&[thursdays()], &[mv]), 240);
    assert_eq!(longest_duration_minutes(&[], &[]), 0);
}

#[test]
fn cancelled_single_frees_its_slot() {
    let cancelled = Appointment::single("S", "color", civil("2024-01-11T10:00:00"), 30)
        .with_status(occurrence_engine::Status::Cancelled);

    let result = check(&[cancelled], &[], "2024-01-11T10:00:00", 30, None);

    assert!(result.available);
    assert!(result.conflicts.is_empty());
}

#[test]
fn cancelled_series_frees_every_instance() {
    let cancelled = thursdays().with_status(occurrence_engine::Status::Cancelled);

    let result = check(&[cancelled], &[], "2024-01-18T10:00:00", 30, None);

    assert!(result.available);
}

// ---------------------------------------------------------------------------
// Errors and failures
// ---------------------------------------------------------------------------

#[test]
fn zero_duration_is_rejected() {
    let result = check_availability(
        &[thursdays()],
        &[],
        &clock(),
        &at("2024-01-11T10:00:00"),
        0,
        None,
        &at("2024-01-01T00:00:00"),
    );

    assert!(matches!(result, Err(EngineError::InvalidAppointment(_))));
}

#[test]
fn broken_appointment_is_reported_but_does_not_block() {
    let mut broken = Appointment::single("broken", "x", civil("2024-01-11T10:00:00"), 30);
    broken.is_recurring = true;

    let result = check(&[broken], &[], "2024-01-11T10:00:00", 30, None);

    assert!(result.available);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].appointment_id, "broken");
}
