//! WASM bindings for occurrence-engine.
//!
//! Exposes occurrence queries, the slot availability check and free-slot
//! lookup to the browser application via `wasm-bindgen`. Records cross the
//! boundary as JSON strings in the stored document format (`startDateTime`,
//! `durationMin`, `rrule`, ...), and every time is a canonical civil-time
//! string in the given zone.
//!
//! ## Build process
//!
//! ```sh
//! cargo build -p occurrence-engine-wasm --target wasm32-unknown-unknown --release
//! wasm-bindgen --target web --out-dir web/wasm/ \
//!   target/wasm32-unknown-unknown/release/occurrence_engine_wasm.wasm
//! ```
//!
//! Each export has a plain-Rust twin (`occurrences_json`, `slot_json`,
//! `free_slots_json`) returning `Result<String, String>`, so the JSON contract
//! can be exercised without a JavaScript host.

use chrono::{Duration, NaiveDate};
use occurrence_engine::{
    check_availability, free_slots, occurrences_in_range, Appointment, AppointmentStore,
    Exception, MemoryStore, RecordFailure, WallClock,
};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Serde-friendly DTOs for crossing the WASM boundary as JSON
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OccurrenceDto {
    id: String,
    appointment_id: String,
    start: String,
    end: String,
    duration_min: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    status: &'static str,
    moved: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureDto {
    appointment_id: String,
    error: String,
}

#[derive(Serialize)]
struct RejectedDto {
    table: &'static str,
    id: String,
    error: String,
}

#[derive(Serialize)]
struct ExpansionDto {
    occurrences: Vec<OccurrenceDto>,
    failures: Vec<FailureDto>,
    /// Input records that could not be read at all.
    rejected: Vec<RejectedDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConflictDto {
    id: String,
    start: String,
    end: String,
    overlap_minutes: i64,
}

#[derive(Serialize)]
struct AvailabilityDto {
    available: bool,
    conflicts: Vec<ConflictDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeSlotDto {
    start: String,
    end: String,
    duration_minutes: i64,
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

struct Records {
    appointments: Vec<Appointment>,
    exceptions: Vec<Exception>,
    rejected: Vec<RecordFailure>,
}

/// Parse both arrays record by record. Offset-bearing times are read in `clock`'s zone.
fn parse_records(
    appointments_json: &str,
    exceptions_json: &str,
    clock: &WallClock,
) -> Result<Records, String> {
    let appointments: Vec<Value> = serde_json::from_str(appointments_json)
        .map_err(|e| format!("Invalid appointments JSON: {}", e))?;
    let exceptions: Vec<Value> = serde_json::from_str(exceptions_json)
        .map_err(|e| format!("Invalid exceptions JSON: {}", e))?;

    let store = MemoryStore::from_tables(appointments, exceptions, Some(clock));
    Ok(Records {
        appointments: store.appointments().map_err(|e| e.to_string())?,
        exceptions: store.exceptions().map_err(|e| e.to_string())?,
        rejected: store.load_failures().to_vec(),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization error: {}", e))
}

// ---------------------------------------------------------------------------
// JSON contract
// ---------------------------------------------------------------------------

/// Occurrences of `appointments_json` in `[range_start, range_end]`.
///
/// `now` defaults to the current time; pass a canonical string to pin the
/// derived statuses. Returns `{ occurrences, failures, rejected }`.
pub fn occurrences_json(
    appointments_json: &str,
    exceptions_json: &str,
    timezone: &str,
    range_start: &str,
    range_end: &str,
    now: Option<&str>,
) -> Result<String, String> {
    let clock = WallClock::from_name(timezone).map_err(|e| e.to_string())?;
    let records = parse_records(appointments_json, exceptions_json, &clock)?;
    let start = clock.from_canonical(range_start).map_err(|e| e.to_string())?;
    let end = clock.from_canonical(range_end).map_err(|e| e.to_string())?;
    let now = match now {
        Some(s) => clock.from_canonical(s).map_err(|e| e.to_string())?,
        None => clock.now(),
    };

    let expansion = occurrences_in_range(
        &records.appointments,
        &records.exceptions,
        &clock,
        &start,
        &end,
        &now,
    );

    let dto = ExpansionDto {
        occurrences: expansion
            .occurrences
            .iter()
            .map(|o| OccurrenceDto {
                id: o.id.to_string(),
                appointment_id: o.id.base_id().to_string(),
                start: clock.to_canonical(&o.start).to_string(),
                end: clock.to_canonical(&o.end).to_string(),
                duration_min: o.duration_minutes,
                title: o.title.clone(),
                service_id: o.service_id.clone(),
                client_id: o.client_id.clone(),
                status: o.status.as_str(),
                moved: o.moved,
            })
            .collect(),
        failures: expansion
            .failures
            .iter()
            .map(|f| FailureDto {
                appointment_id: f.appointment_id.clone(),
                error: f.error.to_string(),
            })
            .collect(),
        rejected: records
            .rejected
            .into_iter()
            .map(|r| RejectedDto {
                table: r.table,
                id: r.id,
                error: r.error,
            })
            .collect(),
    };
    to_json(&dto)
}

/// Whether `[start, start + duration_minutes)` is free. Returns `{ available, conflicts }`.
pub fn slot_json(
    appointments_json: &str,
    exceptions_json: &str,
    timezone: &str,
    start: &str,
    duration_minutes: u32,
    exclude_id: Option<&str>,
) -> Result<String, String> {
    let clock = WallClock::from_name(timezone).map_err(|e| e.to_string())?;
    let records = parse_records(appointments_json, exceptions_json, &clock)?;
    let start = clock.from_canonical(start).map_err(|e| e.to_string())?;

    let availability = check_availability(
        &records.appointments,
        &records.exceptions,
        &clock,
        &start,
        duration_minutes,
        exclude_id,
        &clock.now(),
    )
    .map_err(|e| e.to_string())?;

    let dto = AvailabilityDto {
        available: availability.available,
        conflicts: availability
            .conflicts
            .iter()
            .map(|c| ConflictDto {
                id: c.occurrence.to_string(),
                start: clock.to_canonical(&c.start).to_string(),
                end: clock.to_canonical(&c.end).to_string(),
                overlap_minutes: c.overlap_minutes,
            })
            .collect(),
    };
    to_json(&dto)
}

/// Free slots on the civil `date` (`YYYY-MM-DD`). Returns `[{ start, end, durationMinutes }]`.
pub fn free_slots_json(
    appointments_json: &str,
    exceptions_json: &str,
    timezone: &str,
    date: &str,
) -> Result<String, String> {
    let clock = WallClock::from_name(timezone).map_err(|e| e.to_string())?;
    let records = parse_records(appointments_json, exceptions_json, &clock)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{}': {}", date, e))?;
    let (day_start, last_second) = clock.date_bounds(date).map_err(|e| e.to_string())?;
    let day_end = last_second
        .checked_add_signed(Duration::seconds(1))
        .unwrap_or(last_second);

    let expansion = occurrences_in_range(
        &records.appointments,
        &records.exceptions,
        &clock,
        &day_start,
        &day_end,
        &clock.now(),
    );
    let slots = free_slots(&expansion.occurrences, &day_start, &day_end);

    let dtos: Vec<FreeSlotDto> = slots
        .iter()
        .map(|s| FreeSlotDto {
            start: clock.to_canonical(&s.start).to_string(),
            end: clock.to_canonical(&s.end).to_string(),
            duration_minutes: s.duration_minutes,
        })
        .collect();
    to_json(&dtos)
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

/// Expand appointments and exceptions into the occurrences of a range.
///
/// # Arguments
/// - `appointments_json` -- JSON array of stored appointment records
/// - `exceptions_json` -- JSON array of stored exception records
/// - `timezone` -- IANA zone the civil times live in (e.g., "America/Montevideo")
/// - `range_start` / `range_end` -- Canonical bounds, both inclusive
/// - `now` -- Optional canonical reference time for derived statuses
#[wasm_bindgen(js_name = "getOccurrences")]
pub fn get_occurrences(
    appointments_json: &str,
    exceptions_json: &str,
    timezone: &str,
    range_start: &str,
    range_end: &str,
    now: Option<String>,
) -> Result<String, JsValue> {
    occurrences_json(
        appointments_json,
        exceptions_json,
        timezone,
        range_start,
        range_end,
        now.as_deref(),
    )
    .map_err(|e| JsValue::from_str(&e))
}

/// Check a proposed slot against every existing occurrence.
///
/// `exclude_id` names the base appointment being edited; its own occurrences
/// never block it.
#[wasm_bindgen(js_name = "isSlotAvailable")]
pub fn is_slot_available(
    appointments_json: &str,
    exceptions_json: &str,
    timezone: &str,
    start: &str,
    duration_minutes: u32,
    exclude_id: Option<String>,
) -> Result<String, JsValue> {
    slot_json(
        appointments_json,
        exceptions_json,
        timezone,
        start,
        duration_minutes,
        exclude_id.as_deref(),
    )
    .map_err(|e| JsValue::from_str(&e))
}

/// Free slots on one civil day.
#[wasm_bindgen(js_name = "findFreeSlots")]
pub fn find_free_slots(
    appointments_json: &str,
    exceptions_json: &str,
    timezone: &str,
    date: &str,
) -> Result<String, JsValue> {
    free_slots_json(appointments_json, exceptions_json, timezone, date)
        .map_err(|e| JsValue::from_str(&e))
}
