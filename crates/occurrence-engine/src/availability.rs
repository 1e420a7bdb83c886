//! Slot availability -- the write guard consulted before any booking is stored.
//!
//! A proposed slot `[start, start + duration)` is available iff no existing
//! occurrence overlaps it. Occurrences owned by an excluded base appointment
//! are ignored.
//!
//! The candidates are not limited to the proposal's civil day. The scan
//! window opens `longest` minutes before the proposed start, where `longest`
//! is the longest base or moved duration in the data, so an occurrence that
//! starts late the previous evening and runs past midnight still blocks an
//! early-morning proposal.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::clock::WallClock;
use crate::conflict::{find_conflicts, Conflict};
use crate::error::{EngineError, Result};
use crate::model::{Appointment, Exception, ExceptionKind};
use crate::occurrence::{occurrences_in_range, AppointmentFailure};

/// Outcome of an availability check.
#[derive(Debug)]
pub struct Availability {
    pub available: bool,
    /// Every occurrence overlapping the proposed slot.
    pub conflicts: Vec<Conflict>,
    /// Appointments that could not be evaluated. They do not block the slot.
    pub failures: Vec<AppointmentFailure>,
    pub window_start: DateTime<Tz>,
    pub window_end: DateTime<Tz>,
}

/// The longest duration any occurrence in the data can have.
pub fn longest_duration_minutes(appointments: &[Appointment], exceptions: &[Exception]) -> u32 {
    let base = appointments.iter().map(|a| a.duration_minutes);
    let moved = exceptions.iter().filter_map(|x| match x.kind {
        ExceptionKind::Move {
            new_duration_minutes,
            ..
        } => new_duration_minutes,
        ExceptionKind::Skip => None,
    });
    base.chain(moved).max().unwrap_or(0)
}

/// Check whether `[start, start + duration_minutes)` is free.
///
/// # Arguments
/// - `start` -- Proposed start
/// - `duration_minutes` -- Proposed duration, must be positive
/// - `exclude_base_id` -- Base appointment whose occurrences are ignored (the one being edited)
/// - `now` -- Reference instant for the statuses of the returned conflicts
///
/// # Errors
/// Returns `EngineError::InvalidAppointment` for a zero duration and
/// `EngineError::InvalidTime` when the window leaves the representable range.
pub fn check_availability(
    appointments: &[Appointment],
    exceptions: &[Exception],
    clock: &WallClock,
    start: &DateTime<Tz>,
    duration_minutes: u32,
    exclude_base_id: Option<&str>,
    now: &DateTime<Tz>,
) -> Result<Availability> {
    if duration_minutes == 0 {
        return Err(EngineError::InvalidAppointment(
            "proposed duration must be positive".into(),
        ));
    }

    let end = clock.add_minutes(start, i64::from(duration_minutes))?;
    let lookback = longest_duration_minutes(appointments, exceptions);
    let window_start = clock.add_minutes(start, -i64::from(lookback))?;

    let expansion = occurrences_in_range(appointments, exceptions, clock, &window_start, &end, now);
    let conflicts = find_conflicts(start, &end, &expansion.occurrences, exclude_base_id);

    tracing::debug!(
        start = %start,
        duration_minutes,
        exclude = exclude_base_id.unwrap_or(""),
        candidates = expansion.occurrences.len(),
        conflicts = conflicts.len(),
        "checked slot availability"
    );

    Ok(Availability {
        available: conflicts.is_empty(),
        conflicts,
        failures: expansion.failures,
        window_start,
        window_end: end,
    })
}
