//! # occurrence-engine
//!
//! Occurrence engine for a recurring-appointment booking system.
//!
//! Given base appointments, their recurrence rules and point exceptions
//! (skip / move), the engine computes the concrete bookable intervals inside
//! any date range, guards new bookings against double-booking, and derives
//! each occurrence's lifecycle status. All civil times live in one fixed
//! timezone carried by an explicit [`WallClock`]. Rule expansion wraps the
//! `rrule` crate; zone handling uses `chrono-tz`.
//!
//! ## Modules
//!
//! - [`clock`] - canonical civil-time codec (`2024-01-04T10:00:00`) for one fixed zone
//! - [`dst`] - policy for civil times inside a DST gap
//! - [`model`] - appointments, recurrence rules, exceptions, statuses
//! - [`expander`] - recurrence rule → start instants inside a range
//! - [`exceptions`] - exception lookup by (appointment id, canonical key)
//! - [`occurrence`] - occurrence identities, building and range queries
//! - [`status`] - status derivation and the settle-expired maintenance pass
//! - [`conflict`] - half-open overlap detection
//! - [`availability`] - the booking write guard
//! - [`freebusy`] - free slots between occurrences
//! - [`store`] - the appointment store seam and an in-memory store
//! - [`scheduler`] - the facade used by applications
//! - [`error`] - Error types

pub mod availability;
pub mod clock;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod exceptions;
pub mod expander;
pub mod freebusy;
pub mod model;
pub mod occurrence;
pub mod scheduler;
pub mod status;
pub mod store;

pub use availability::{check_availability, Availability};
pub use clock::{CivilTime, WallClock};
pub use conflict::{find_conflicts, Conflict};
pub use dst::DstPolicy;
pub use error::EngineError;
pub use exceptions::{ExceptionIndex, Override};
pub use expander::expand;
pub use freebusy::{free_slots, FreeSlot};
pub use model::{Appointment, Exception, ExceptionKind, Frequency, RecurrenceRule, Status};
pub use occurrence::{occurrences_in_range, Expansion, Occurrence, OccurrenceId};
pub use scheduler::Scheduler;
pub use status::{derive_status, settle_expired};
pub use store::{AppointmentStore, MemoryStore, RecordFailure};
