//! The scheduler facade -- the read and write entry points used by the application.
//!
//! [`Scheduler`] owns an [`AppointmentStore`] and a [`WallClock`]. Reads go
//! through [`Scheduler::get_occurrences`]; every write that places an
//! appointment on the calendar goes through the availability guard first.
//!
//! The check-then-write sequence is not transactional. Two callers booking
//! the same slot concurrently can both succeed; deployments with more than
//! one writer need a serializable check-and-insert in the store.

use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::availability::{check_availability, Availability};
use crate::clock::{CivilTime, WallClock};
use crate::error::{EngineError, Result};
use crate::exceptions::{ExceptionIndex, Override};
use crate::expander;
use crate::freebusy::{self, FreeSlot};
use crate::model::{validate_duration, Appointment, Exception, ExceptionKind, Status};
use crate::occurrence::{occurrences_in_range, resolve, Expansion, Occurrence, OccurrenceId};
use crate::status;
use crate::store::AppointmentStore;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct Scheduler<S> {
    store: S,
    clock: WallClock,
}

impl<S: AppointmentStore> Scheduler<S> {
    pub fn new(store: S, clock: WallClock) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &WallClock {
        &self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All occurrences in `[range_start, range_end]`, sorted by start.
    ///
    /// Both bounds are canonical civil-time strings (`2024-01-01T00:00:00`).
    pub fn get_occurrences(&self, range_start: &str, range_end: &str) -> Result<Expansion> {
        self.get_occurrences_at(range_start, range_end, &self.clock.now())
    }

    /// [`Scheduler::get_occurrences`] with an explicit reference instant for statuses.
    pub fn get_occurrences_at(
        &self,
        range_start: &str,
        range_end: &str,
        now: &DateTime<Tz>,
    ) -> Result<Expansion> {
        let start = self.clock.from_canonical(range_start)?;
        let end = self.clock.from_canonical(range_end)?;
        self.occurrences_between(&start, &end, now)
    }

    fn occurrences_between(
        &self,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
        now: &DateTime<Tz>,
    ) -> Result<Expansion> {
        let appointments = self.store.appointments()?;
        let exceptions = self.store.exceptions()?;
        Ok(occurrences_in_range(
            &appointments,
            &exceptions,
            &self.clock,
            start,
            end,
            now,
        ))
    }

    /// Whether `[start, start + duration_minutes)` is free, ignoring `exclude_base_id`.
    pub fn is_slot_available(
        &self,
        start: &str,
        duration_minutes: u32,
        exclude_base_id: Option<&str>,
    ) -> Result<bool> {
        Ok(self.check_slot(start, duration_minutes, exclude_base_id)?.available)
    }

    /// Like [`Scheduler::is_slot_available`], reporting the conflicting occurrences.
    pub fn check_slot(
        &self,
        start: &str,
        duration_minutes: u32,
        exclude_base_id: Option<&str>,
    ) -> Result<Availability> {
        let start = self.clock.from_canonical(start)?;
        self.check_at(&start, duration_minutes, exclude_base_id)
    }

    fn check_at(
        &self,
        start: &DateTime<Tz>,
        duration_minutes: u32,
        exclude_base_id: Option<&str>,
    ) -> Result<Availability> {
        let appointments = self.store.appointments()?;
        let exceptions = self.store.exceptions()?;
        check_availability(
            &appointments,
            &exceptions,
            &self.clock,
            start,
            duration_minutes,
            exclude_base_id,
            &self.clock.now(),
        )
    }

    /// Free slots on a civil date.
    pub fn free_slots(&self, date: NaiveDate) -> Result<Vec<FreeSlot>> {
        let (day_start, day_end) = self.civil_day(date)?;
        let expansion = self.occurrences_between(&day_start, &day_end, &self.clock.now())?;
        Ok(freebusy::free_slots(
            &expansion.occurrences,
            &day_start,
            &day_end,
        ))
    }

    /// The first free slot on `date` long enough for `duration_minutes`.
    pub fn first_free_slot(&self, date: NaiveDate, duration_minutes: u32) -> Result<Option<FreeSlot>> {
        let (day_start, day_end) = self.civil_day(date)?;
        let expansion = self.occurrences_between(&day_start, &day_end, &self.clock.now())?;
        Ok(freebusy::first_free_slot(
            &expansion.occurrences,
            &day_start,
            &day_end,
            i64::from(duration_minutes),
        ))
    }

    /// `[00:00, next 00:00)` of a civil date.
    fn civil_day(&self, date: NaiveDate) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
        let (day_start, last_second) = self.clock.date_bounds(date)?;
        let day_end = last_second
            .checked_add_signed(Duration::seconds(1))
            .unwrap_or(last_second);
        Ok((day_start, day_end))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Create or replace an appointment after checking its slot.
    ///
    /// The appointment's own id is excluded from the check, so an edit does
    /// not conflict with the record it replaces.
    ///
    /// For a series only the anchor slot is checked. Later instances are not
    /// compared with existing bookings and may overlap them; callers that need
    /// that guarantee check the instances of interest with
    /// [`Scheduler::check_slot`] first.
    ///
    /// # Errors
    /// `InvalidAppointment`/`InvalidRule` when validation fails,
    /// `SlotUnavailable` when the slot overlaps another occurrence.
    pub fn book(&mut self, appointment: Appointment) -> Result<()> {
        appointment.validate()?;
        let start = self.clock.localize(appointment.start)?;
        let availability = self.check_at(
            &start,
            appointment.duration_minutes,
            Some(appointment.id.as_str()),
        )?;
        if !availability.available {
            return Err(EngineError::SlotUnavailable {
                start: appointment.start.to_string(),
                conflicts: availability.conflicts.len(),
            });
        }

        tracing::info!(
            appointment_id = %appointment.id,
            start = %appointment.start,
            duration_minutes = appointment.duration_minutes,
            recurring = appointment.is_recurring,
            "booked appointment"
        );
        self.store.put_appointment(appointment)
    }

    /// Cancel one occurrence.
    ///
    /// A recurring instance gets a skip exception; the series keeps
    /// generating its other occurrences. A one-off appointment is marked
    /// `cancelled`.
    pub fn cancel_occurrence(&mut self, id: &OccurrenceId) -> Result<()> {
        let appointment = self.require(id.base_id())?;
        match id {
            OccurrenceId::Single(_) => self.mark(id, Status::Cancelled),
            OccurrenceId::Instance { key, .. } => {
                self.instance_start(&appointment, *key)?;
                self.store
                    .put_exception(Exception::skip(new_id(), appointment.id.clone(), *key))?;
                tracing::info!(occurrence = %id, "cancelled occurrence");
                Ok(())
            }
        }
    }

    /// Delete a whole appointment; the store drops the exceptions it owns.
    pub fn cancel_series(&mut self, appointment_id: &str) -> Result<()> {
        self.require(appointment_id)?;
        self.store.delete_appointment(appointment_id)?;
        tracing::info!(appointment_id, "cancelled series");
        Ok(())
    }

    /// Turn one recurring instance into a standalone appointment.
    ///
    /// The new appointment copies the occurrence's effective start and
    /// duration (after any move), and a skip exception removes the original
    /// instance. The series itself is left intact.
    pub fn detach_occurrence(&mut self, id: &OccurrenceId) -> Result<Appointment> {
        let OccurrenceId::Instance { key, .. } = id else {
            return Err(EngineError::InvalidAppointment(format!(
                "'{}' is already a single appointment",
                id
            )));
        };
        let appointment = self.require(id.base_id())?;
        let occurrence = self.current_instance(&appointment, *key)?;

        let detached = Appointment {
            id: new_id(),
            start: self.clock.to_canonical(&occurrence.start),
            duration_minutes: occurrence.duration_minutes,
            is_recurring: false,
            rule: None,
            status: None,
            ..appointment.clone()
        };

        self.store.put_appointment(detached.clone())?;
        self.store
            .put_exception(Exception::skip(new_id(), appointment.id.clone(), *key))?;
        tracing::info!(
            occurrence = %id,
            detached_id = %detached.id,
            "detached occurrence"
        );
        Ok(detached)
    }

    /// Give one occurrence a new start and/or duration.
    ///
    /// A recurring instance gets a move exception keyed by its original time
    /// (replacing any earlier move for that key) and its new slot is checked
    /// against every other occurrence, sibling instances of the same series
    /// included. A one-off appointment is rescheduled in place through
    /// [`Scheduler::book`].
    pub fn move_occurrence(
        &mut self,
        id: &OccurrenceId,
        new_start: Option<CivilTime>,
        new_duration_minutes: Option<u32>,
    ) -> Result<()> {
        if new_start.is_none() && new_duration_minutes.is_none() {
            return Err(EngineError::InvalidAppointment(
                "a move needs a new start or a new duration".into(),
            ));
        }
        if let Some(minutes) = new_duration_minutes {
            validate_duration(minutes)?;
        }

        let appointment = self.require(id.base_id())?;
        let key = match id {
            OccurrenceId::Single(_) => {
                if appointment.is_recurring {
                    return Err(EngineError::NotSingle(id.to_string()));
                }
                let rescheduled = Appointment {
                    start: new_start.unwrap_or(appointment.start),
                    duration_minutes: new_duration_minutes.unwrap_or(appointment.duration_minutes),
                    ..appointment
                };
                return self.book(rescheduled);
            }
            OccurrenceId::Instance { key, .. } => *key,
        };

        let original = self.instance_start(&appointment, key)?;
        let exceptions = self.store.exceptions()?;
        if ExceptionIndex::new(&exceptions).resolve(&appointment.id, &key) == Override::Skip {
            return Err(EngineError::NotFound(format!("occurrence {} is cancelled", id)));
        }

        let start = match new_start {
            Some(civil) => self.clock.localize(civil)?,
            None => original,
        };
        let duration = new_duration_minutes.unwrap_or(appointment.duration_minutes);
        let mut availability = self.check_at(&start, duration, None)?;
        availability.conflicts.retain(|c| c.occurrence != *id);
        if !availability.conflicts.is_empty() {
            return Err(EngineError::SlotUnavailable {
                start: self.clock.to_canonical(&start).to_string(),
                conflicts: availability.conflicts.len(),
            });
        }

        for stale in exceptions.iter().filter(|x| {
            x.appointment_id == appointment.id
                && x.original_date_time == key
                && matches!(x.kind, ExceptionKind::Move { .. })
        }) {
            self.store.delete_exception(&stale.id)?;
        }
        self.store.put_exception(Exception::moved(
            new_id(),
            appointment.id.clone(),
            key,
            new_start,
            new_duration_minutes,
        ))?;
        tracing::info!(occurrence = %id, "moved occurrence");
        Ok(())
    }

    /// Set an explicit status on a one-off appointment.
    ///
    /// # Errors
    /// `NotSingle` for a recurring instance or series; detach it first.
    pub fn mark(&mut self, id: &OccurrenceId, status: Status) -> Result<()> {
        if let OccurrenceId::Instance { .. } = id {
            return Err(EngineError::NotSingle(id.to_string()));
        }
        let appointment = self.require(id.base_id())?;
        if appointment.is_recurring {
            return Err(EngineError::NotSingle(id.to_string()));
        }
        self.store.set_status(&appointment.id, status)?;
        tracing::info!(occurrence = %id, status = status.as_str(), "marked appointment");
        Ok(())
    }

    /// Persist `done` on one-off appointments that ended while pending.
    pub fn settle_expired(&mut self) -> Result<Vec<String>> {
        let now = self.clock.now();
        self.settle_expired_at(&now)
    }

    pub fn settle_expired_at(&mut self, now: &DateTime<Tz>) -> Result<Vec<String>> {
        status::settle_expired(&mut self.store, &self.clock, now)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn require(&self, appointment_id: &str) -> Result<Appointment> {
        self.store
            .appointment(appointment_id)?
            .ok_or_else(|| EngineError::NotFound(format!("appointment '{}'", appointment_id)))
    }

    /// The generated start of the instance at `key`, verifying that the rule produces it.
    fn instance_start(&self, appointment: &Appointment, key: CivilTime) -> Result<DateTime<Tz>> {
        let rule = appointment.recurrence()?.ok_or_else(|| {
            EngineError::InvalidAppointment(format!(
                "appointment '{}' is not recurring",
                appointment.id
            ))
        })?;
        let original = self.clock.localize(key)?;
        if !expander::contains(rule, appointment.start, &original, &self.clock)? {
            return Err(EngineError::NotFound(format!(
                "{} is not an occurrence of '{}'",
                key, appointment.id
            )));
        }
        Ok(original)
    }

    /// The instance at `key` with its exceptions applied.
    fn current_instance(&self, appointment: &Appointment, key: CivilTime) -> Result<Occurrence> {
        let original = self.instance_start(appointment, key)?;
        let exceptions = self.store.exceptions()?;
        let index = ExceptionIndex::new(&exceptions);
        resolve(appointment, &original, &index, &self.clock, &self.clock.now())?.ok_or_else(|| {
            EngineError::NotFound(format!(
                "occurrence {}{}{} is cancelled",
                appointment.id,
                crate::occurrence::ID_SEPARATOR,
                key
            ))
        })
    }
}
