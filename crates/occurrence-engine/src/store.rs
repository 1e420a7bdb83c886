//! The appointment store seam and an in-memory implementation.
//!
//! The engine reads the full appointment and exception tables on every query
//! and writes through point operations. Anything that can do that (a
//! browser-side database, a JSON file, a SQL table) implements
//! [`AppointmentStore`].

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{CivilTime, WallClock};
use crate::error::{EngineError, Result};
use crate::model::{Appointment, Exception, Status};

/// Current version of the snapshot document.
pub const SNAPSHOT_VERSION: u32 = 1;

/// JSON pointers of the time fields in an appointment record.
const APPOINTMENT_TIME_FIELDS: &[&str] = &["/startDateTime", "/rrule/until"];
/// JSON pointers of the time fields in an exception record.
const EXCEPTION_TIME_FIELDS: &[&str] = &["/originalDateTime", "/newStartDateTime"];

pub trait AppointmentStore {
    /// Full scan of the appointment table.
    fn appointments(&self) -> Result<Vec<Appointment>>;

    /// Full scan of the exception table.
    fn exceptions(&self) -> Result<Vec<Exception>>;

    fn appointment(&self, id: &str) -> Result<Option<Appointment>>;

    /// Insert or replace by id.
    fn put_appointment(&mut self, appointment: Appointment) -> Result<()>;

    /// Delete an appointment together with the exceptions it owns.
    fn delete_appointment(&mut self, id: &str) -> Result<()>;

    /// Point update of an appointment's status.
    fn set_status(&mut self, id: &str, status: Status) -> Result<()>;

    /// Insert or replace by id.
    fn put_exception(&mut self, exception: Exception) -> Result<()>;

    fn delete_exception(&mut self, id: &str) -> Result<()>;
}

/// A stored record that could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// `"appointments"` or `"exceptions"`.
    pub table: &'static str,
    /// The record's `id`, or `#<index>` when it has none.
    pub id: String,
    pub error: String,
}

/// A `BTreeMap`-backed store. Serializes as the `{ version, appointments, exceptions }`
/// snapshot document.
///
/// Loading is per record: a record that does not parse is reported in
/// [`MemoryStore::load_failures`] and kept verbatim, so saving writes it back
/// unchanged instead of dropping it. Client records are not the engine's
/// concern; they are carried through a load/save cycle untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    appointments: BTreeMap<String, Appointment>,
    exceptions: BTreeMap<String, Exception>,
    clients: Vec<Value>,
    unreadable_appointments: Vec<Value>,
    unreadable_exceptions: Vec<Value>,
    failures: Vec<RecordFailure>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    clients: Vec<Value>,
    #[serde(default)]
    appointments: Vec<Value>,
    #[serde(default)]
    exceptions: Vec<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(
        appointments: impl IntoIterator<Item = Appointment>,
        exceptions: impl IntoIterator<Item = Exception>,
    ) -> Self {
        Self {
            appointments: appointments
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            exceptions: exceptions.into_iter().map(|x| (x.id.clone(), x)).collect(),
            ..Self::default()
        }
    }

    /// Build a store from raw appointment and exception records.
    ///
    /// With a `clock`, offset-bearing ISO 8601 times such as
    /// `2024-01-05T10:00:00.000-03:00` are first converted to canonical civil
    /// times in the clock's zone. Without one, only canonical times parse.
    pub fn from_tables(
        appointments: Vec<Value>,
        exceptions: Vec<Value>,
        clock: Option<&WallClock>,
    ) -> Self {
        let mut store = Self::new();
        let (parsed, unreadable) = read_table::<Appointment>(
            "appointments",
            appointments,
            APPOINTMENT_TIME_FIELDS,
            clock,
            &mut store.failures,
        );
        store.appointments = parsed.into_iter().map(|a| (a.id.clone(), a)).collect();
        store.unreadable_appointments = unreadable;

        let (parsed, unreadable) = read_table::<Exception>(
            "exceptions",
            exceptions,
            EXCEPTION_TIME_FIELDS,
            clock,
            &mut store.failures,
        );
        store.exceptions = parsed.into_iter().map(|x| (x.id.clone(), x)).collect();
        store.unreadable_exceptions = unreadable;
        store
    }

    /// Load a snapshot document whose times are all canonical.
    ///
    /// # Errors
    /// `EngineError::Store` for malformed JSON or an unsupported version.
    /// Individual records that fail to parse are not errors; see
    /// [`MemoryStore::load_failures`].
    pub fn from_json(json: &str) -> Result<Self> {
        Self::load(json, None)
    }

    /// Load a snapshot document, normalizing offset-bearing times into `clock`'s zone.
    ///
    /// # Errors
    /// Same as [`MemoryStore::from_json`].
    pub fn from_json_in(json: &str, clock: &WallClock) -> Result<Self> {
        Self::load(json, Some(clock))
    }

    fn load(json: &str, clock: Option<&WallClock>) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|e| EngineError::Store(format!("invalid snapshot: {}", e)))?;
        if snapshot.version == 0 || snapshot.version > SNAPSHOT_VERSION {
            return Err(EngineError::Store(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Self {
            clients: snapshot.clients,
            ..Self::from_tables(snapshot.appointments, snapshot.exceptions, clock)
        })
    }

    /// Records skipped by the last load.
    pub fn load_failures(&self) -> &[RecordFailure] {
        &self.failures
    }

    /// Render the snapshot document.
    pub fn to_json(&self) -> Result<String> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            clients: self.clients.clone(),
            appointments: to_values(self.appointments.values(), &self.unreadable_appointments)?,
            exceptions: to_values(self.exceptions.values(), &self.unreadable_exceptions)?,
        };
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EngineError::Store(format!("cannot serialize snapshot: {}", e)))
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Rewrite offset-bearing ISO 8601 strings at `fields` as canonical civil times.
fn normalize_times(record: &mut Value, fields: &[&str], clock: &WallClock) {
    for field in fields {
        if let Some(Value::String(raw)) = record.pointer_mut(field) {
            if CivilTime::parse(raw).is_ok() {
                continue;
            }
            if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
                *raw = clock.to_canonical(&instant).to_string();
            }
        }
    }
}

/// Parse each record on its own, returning the parsed records and the unreadable ones.
fn read_table<T: DeserializeOwned>(
    table: &'static str,
    records: Vec<Value>,
    time_fields: &[&str],
    clock: Option<&WallClock>,
    failures: &mut Vec<RecordFailure>,
) -> (Vec<T>, Vec<Value>) {
    let mut parsed = Vec::with_capacity(records.len());
    let mut unreadable = Vec::new();
    for (index, mut record) in records.into_iter().enumerate() {
        if let Some(clock) = clock {
            normalize_times(&mut record, time_fields, clock);
        }
        match T::deserialize(&record) {
            Ok(value) => parsed.push(value),
            Err(e) => {
                let id = record_id(&record)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("#{}", index));
                tracing::warn!(table, id = %id, error = %e, "unreadable record kept as-is");
                failures.push(RecordFailure {
                    table,
                    id,
                    error: e.to_string(),
                });
                unreadable.push(record);
            }
        }
    }
    (parsed, unreadable)
}

fn to_values<'a, T: Serialize + 'a>(
    records: impl Iterator<Item = &'a T>,
    unreadable: &[Value],
) -> Result<Vec<Value>> {
    let mut values = records
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Store(format!("cannot serialize record: {}", e)))?;
    values.extend(unreadable.iter().cloned());
    Ok(values)
}

impl AppointmentStore for MemoryStore {
    fn appointments(&self) -> Result<Vec<Appointment>> {
        Ok(self.appointments.values().cloned().collect())
    }

    fn exceptions(&self) -> Result<Vec<Exception>> {
        Ok(self.exceptions.values().cloned().collect())
    }

    fn appointment(&self, id: &str) -> Result<Option<Appointment>> {
        Ok(self.appointments.get(id).cloned())
    }

    fn put_appointment(&mut self, appointment: Appointment) -> Result<()> {
        self.unreadable_appointments
            .retain(|raw| record_id(raw) != Some(appointment.id.as_str()));
        self.appointments.insert(appointment.id.clone(), appointment);
        Ok(())
    }

    fn delete_appointment(&mut self, id: &str) -> Result<()> {
        self.appointments.remove(id);
        self.exceptions.retain(|_, x| x.appointment_id != id);
        self.unreadable_appointments
            .retain(|raw| record_id(raw) != Some(id));
        self.unreadable_exceptions
            .retain(|raw| raw.get("appointmentId").and_then(Value::as_str) != Some(id));
        Ok(())
    }

    fn set_status(&mut self, id: &str, status: Status) -> Result<()> {
        let appointment = self
            .appointments
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("appointment '{}'", id)))?;
        appointment.status = Some(status);
        Ok(())
    }

    fn put_exception(&mut self, exception: Exception) -> Result<()> {
        self.unreadable_exceptions
            .retain(|raw| record_id(raw) != Some(exception.id.as_str()));
        self.exceptions.insert(exception.id.clone(), exception);
        Ok(())
    }

    fn delete_exception(&mut self, id: &str) -> Result<()> {
        self.exceptions.remove(id);
        self.unreadable_exceptions.retain(|raw| record_id(raw) != Some(id));
        Ok(())
    }
}
