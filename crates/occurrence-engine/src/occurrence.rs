//! Occurrence building -- turns base appointments plus exceptions into concrete intervals.
//!
//! An occurrence is derived on every query and never stored. Its identity is
//! an [`OccurrenceId`]: the bare appointment id for a one-off appointment, or
//! the appointment id plus the canonical key the rule generated for a
//! recurring one. The key is the *original* generated time, so a moved
//! occurrence keeps its identity.
//!
//! ## Range inclusion
//!
//! - One-off appointments and moved instances are included when their
//!   effective interval overlaps the range: `end > range_start && start < range_end`.
//! - Unmoved instances are included when their generated start lies in
//!   `[range_start, range_end]`.
//!
//! Moves are judged by where the occurrence ends up: a move out of the window
//! drops it, a move into the window brings it in even though the original key
//! lies outside.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::clock::{CivilTime, WallClock};
use crate::error::{EngineError, Result};
use crate::exceptions::{ExceptionIndex, Override};
use crate::expander;
use crate::model::{Appointment, Exception, Status};
use crate::status::derive_status;

/// Separator of the `id::key` wire form.
pub const ID_SEPARATOR: &str = "::";

/// Identity of a derived occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OccurrenceId {
    /// A one-off appointment, identified by its own id.
    Single(String),
    /// One generated instance of a recurring appointment.
    Instance {
        appointment_id: String,
        key: CivilTime,
    },
}

impl OccurrenceId {
    pub fn single(appointment_id: impl Into<String>) -> Self {
        Self::Single(appointment_id.into())
    }

    pub fn instance(appointment_id: impl Into<String>, key: CivilTime) -> Self {
        Self::Instance {
            appointment_id: appointment_id.into(),
            key,
        }
    }

    /// The id of the base appointment that owns this occurrence.
    pub fn base_id(&self) -> &str {
        match self {
            Self::Single(id) => id,
            Self::Instance { appointment_id, .. } => appointment_id,
        }
    }

    /// The canonical key of a recurring instance.
    pub fn key(&self) -> Option<&CivilTime> {
        match self {
            Self::Single(_) => None,
            Self::Instance { key, .. } => Some(key),
        }
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(id) => write!(f, "{}", id),
            Self::Instance {
                appointment_id,
                key,
            } => write!(f, "{}{}{}", appointment_id, ID_SEPARATOR, key),
        }
    }
}

impl FromStr for OccurrenceId {
    type Err = EngineError;

    /// Parses the `id` / `id::key` wire form.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(ID_SEPARATOR) {
            None if s.is_empty() => Err(EngineError::InvalidAppointment(
                "empty occurrence id".into(),
            )),
            None => Ok(Self::single(s)),
            Some(("", _)) => Err(EngineError::InvalidAppointment(format!(
                "occurrence id '{}' has no appointment id",
                s
            ))),
            Some((id, key)) => Ok(Self::instance(id, key.parse()?)),
        }
    }
}

/// One concrete bookable interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub duration_minutes: u32,
    pub title: Option<String>,
    pub service_id: String,
    pub client_id: Option<String>,
    pub status: Status,
    /// Whether a move exception changed the start or duration.
    pub moved: bool,
}

/// An appointment whose contribution to a query failed.
#[derive(Debug)]
pub struct AppointmentFailure {
    pub appointment_id: String,
    pub error: EngineError,
}

/// The result of a range query: everything that resolved, plus per-appointment failures.
#[derive(Debug, Default)]
pub struct Expansion {
    pub occurrences: Vec<Occurrence>,
    pub failures: Vec<AppointmentFailure>,
}

/// Resolve one base appointment at one generated (or anchor) instant.
///
/// Returns `None` when a skip exception removes the occurrence.
///
/// # Errors
/// Returns `EngineError::InvalidTime` / `NonexistentLocalTime` when a moved
/// start cannot be placed in the zone or the end overflows.
pub fn resolve(
    appointment: &Appointment,
    generated: &DateTime<Tz>,
    index: &ExceptionIndex<'_>,
    clock: &WallClock,
    now: &DateTime<Tz>,
) -> Result<Option<Occurrence>> {
    let key = clock.to_canonical(generated);

    let (start, duration_minutes, moved) = match index.resolve(&appointment.id, &key) {
        Override::Skip => return Ok(None),
        Override::Move {
            new_start,
            new_duration_minutes,
        } => {
            let start = match new_start {
                Some(civil) => clock.localize(civil)?,
                None => *generated,
            };
            let duration = new_duration_minutes.unwrap_or(appointment.duration_minutes);
            (start, duration, true)
        }
        Override::None => (*generated, appointment.duration_minutes, false),
    };

    if duration_minutes == 0 {
        return Err(EngineError::InvalidAppointment(format!(
            "occurrence {} of '{}' has zero duration",
            key, appointment.id
        )));
    }

    let end = clock.add_minutes(&start, i64::from(duration_minutes))?;
    let id = if appointment.is_recurring {
        OccurrenceId::instance(appointment.id.clone(), key)
    } else {
        OccurrenceId::single(appointment.id.clone())
    };
    let status = derive_status(appointment.status, appointment.is_recurring, &end, now);

    Ok(Some(Occurrence {
        id,
        start,
        end,
        duration_minutes,
        title: appointment.title.clone(),
        service_id: appointment.service_id.clone(),
        client_id: appointment.client_id.clone(),
        status,
        moved,
    }))
}

fn overlaps_range(occurrence: &Occurrence, range_start: &DateTime<Tz>, range_end: &DateTime<Tz>) -> bool {
    occurrence.end > *range_start && occurrence.start < *range_end
}

/// Occurrences of a single appointment inside the range.
pub fn appointment_occurrences(
    appointment: &Appointment,
    index: &ExceptionIndex<'_>,
    clock: &WallClock,
    range_start: &DateTime<Tz>,
    range_end: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Result<Vec<Occurrence>> {
    let Some(rule) = appointment.recurrence()? else {
        let anchor = clock.localize(appointment.start)?;
        return Ok(resolve(appointment, &anchor, index, clock, now)?
            .filter(|occ| overlaps_range(occ, range_start, range_end))
            .into_iter()
            .collect());
    };

    let mut out = Vec::new();
    for generated in expander::expand(rule, appointment.start, range_start, range_end, clock)? {
        if let Some(occ) = resolve(appointment, &generated, index, clock, now)? {
            // A moved instance is judged by its new interval.
            if !occ.moved || overlaps_range(&occ, range_start, range_end) {
                out.push(occ);
            }
        }
    }

    // Instances whose original key lies outside the window but whose move lands inside it.
    for key in index.moved_keys(&appointment.id) {
        let original = clock.localize(key)?;
        if original >= *range_start && original <= *range_end {
            continue;
        }
        if !expander::contains(rule, appointment.start, &original, clock)? {
            tracing::debug!(
                appointment_id = %appointment.id,
                key = %key,
                "ignoring move exception whose key is not a rule instance"
            );
            continue;
        }
        if let Some(occ) = resolve(appointment, &original, index, clock, now)? {
            if overlaps_range(&occ, range_start, range_end) {
                out.push(occ);
            }
        }
    }

    Ok(out)
}

/// Every occurrence of every appointment inside the range.
///
/// Each appointment is processed independently: a failure is logged and
/// reported in [`Expansion::failures`] without affecting the others. The
/// occurrences are sorted by start, then by id.
pub fn occurrences_in_range(
    appointments: &[Appointment],
    exceptions: &[Exception],
    clock: &WallClock,
    range_start: &DateTime<Tz>,
    range_end: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Expansion {
    let index = ExceptionIndex::new(exceptions);
    let mut expansion = Expansion::default();

    for appointment in appointments {
        match appointment_occurrences(appointment, &index, clock, range_start, range_end, now) {
            Ok(mut occurrences) => expansion.occurrences.append(&mut occurrences),
            Err(error) => {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    error = %error,
                    "skipping appointment that failed to expand"
                );
                expansion.failures.push(AppointmentFailure {
                    appointment_id: appointment.id.clone(),
                    error,
                });
            }
        }
    }

    expansion
        .occurrences
        .sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    expansion
}
