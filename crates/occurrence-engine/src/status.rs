//! Lifecycle status derivation and the expired-appointment settlement pass.
//!
//! Queries only *compute* status. Persisting the `pending -> done` transition
//! of one-off appointments is a separate maintenance step,
//! [`settle_expired`], so reading the calendar never writes to the store.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::clock::WallClock;
use crate::error::Result;
use crate::model::{Appointment, Status};
use crate::store::AppointmentStore;

/// Status of an occurrence ending at `end`, as seen at `now`.
///
/// `cancelled` on the base appointment always wins. A one-off appointment
/// already marked `done` stays done. Otherwise the occurrence is `done` once
/// its end is strictly before `now`. Recurring series never carry a stored
/// `done`; each instance is judged on its own end.
pub fn derive_status(
    stored: Option<Status>,
    recurring: bool,
    end: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Status {
    match stored {
        Some(Status::Cancelled) => Status::Cancelled,
        Some(Status::Done) if !recurring => Status::Done,
        _ if end < now => Status::Done,
        _ => Status::Pending,
    }
}

/// Whether a one-off appointment is still `pending` although it has ended.
pub fn is_expired(appointment: &Appointment, clock: &WallClock, now: &DateTime<Tz>) -> Result<bool> {
    if appointment.is_recurring || appointment.stored_status() != Status::Pending {
        return Ok(false);
    }
    let start = clock.localize(appointment.start)?;
    let end = clock.add_minutes(&start, i64::from(appointment.duration_minutes))?;
    Ok(end < *now)
}

/// Persist `done` on every one-off appointment that has ended while `pending`.
///
/// Returns the ids actually updated. The transition is idempotent: a second
/// run finds nothing to do. An appointment that cannot be evaluated or
/// written is logged and left for the next run.
///
/// # Errors
/// Only fails when the store cannot list appointments.
pub fn settle_expired<S: AppointmentStore + ?Sized>(
    store: &mut S,
    clock: &WallClock,
    now: &DateTime<Tz>,
) -> Result<Vec<String>> {
    let appointments = store.appointments()?;
    let mut settled = Vec::new();

    for appointment in &appointments {
        match is_expired(appointment, clock, now) {
            Ok(false) => {}
            Ok(true) => match store.set_status(&appointment.id, Status::Done) {
                Ok(()) => settled.push(appointment.id.clone()),
                Err(error) => tracing::warn!(
                    appointment_id = %appointment.id,
                    error = %error,
                    "failed to persist done status; will retry on next settle"
                ),
            },
            Err(error) => tracing::warn!(
                appointment_id = %appointment.id,
                error = %error,
                "cannot evaluate appointment for settlement"
            ),
        }
    }

    if !settled.is_empty() {
        tracing::info!(count = settled.len(), "settled expired appointments");
    }
    Ok(settled)
}
