//! Error types for occurrence-engine operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// A canonical time string could not be parsed, or arithmetic left the
    /// representable range.
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// The civil time falls in a DST gap and the active policy rejects it.
    #[error("Local time {0} does not exist in the configured timezone")]
    NonexistentLocalTime(String),

    #[error("Expansion error: {0}")]
    Expansion(String),

    #[error("Invalid appointment: {0}")]
    InvalidAppointment(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slot starting {start} overlaps {conflicts} existing occurrence(s)")]
    SlotUnavailable { start: String, conflicts: usize },

    /// Explicit status marks only apply to single appointments.
    #[error("Occurrence {0} belongs to a recurring series; detach it first")]
    NotSingle(String),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
