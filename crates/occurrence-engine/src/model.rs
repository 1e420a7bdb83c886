//! Persisted records: appointments, their recurrence rules, and point exceptions.
//!
//! Field names follow the stored document format (`startDateTime`,
//! `durationMin`, `isRecurring`, `rrule`, `originalDateTime`, ...), so the
//! same types read and write the snapshot files produced by the booking app.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::clock::CivilTime;
use crate::error::{EngineError, Result};

/// Appointment durations are booked in multiples of this many minutes.
pub const DURATION_GRANULARITY_MINUTES: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// The RFC 5545 `FREQ=` value.
    pub fn as_rrule(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// How a recurring appointment repeats.
///
/// `byweekday` uses 0 = Monday .. 6 = Sunday and only matters for
/// [`Frequency::Weekly`]; an empty set means "the anchor's own weekday".
/// `until` (inclusive) and `count` may both be present; expansion stops at
/// whichever bound is reached first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub byweekday: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<CivilTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl RecurrenceRule {
    fn new(freq: Frequency) -> Self {
        Self {
            freq,
            interval: 1,
            byweekday: Vec::new(),
            until: None,
            count: None,
        }
    }

    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    pub fn weekly(byweekday: impl IntoIterator<Item = u8>) -> Self {
        Self {
            byweekday: byweekday.into_iter().collect(),
            ..Self::new(Frequency::Weekly)
        }
    }

    pub fn monthly() -> Self {
        Self::new(Frequency::Monthly)
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn until(mut self, until: CivilTime) -> Self {
        self.until = Some(until);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// # Errors
    /// `EngineError::InvalidRule` for a zero interval or a weekday selector outside 0..=6.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(EngineError::InvalidRule("interval must be at least 1".into()));
        }
        self.weekdays().map(|_| ())
    }

    /// The weekday selectors as chrono weekdays, in the stored order.
    pub fn weekdays(&self) -> Result<Vec<Weekday>> {
        self.byweekday
            .iter()
            .map(|&n| match n {
                0 => Ok(Weekday::Mon),
                1 => Ok(Weekday::Tue),
                2 => Ok(Weekday::Wed),
                3 => Ok(Weekday::Thu),
                4 => Ok(Weekday::Fri),
                5 => Ok(Weekday::Sat),
                6 => Ok(Weekday::Sun),
                other => Err(EngineError::InvalidRule(format!(
                    "weekday selector {} out of range 0..=6",
                    other
                ))),
            })
            .collect()
    }
}

/// Lifecycle status of an appointment or occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Done,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Done => "done",
            Status::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "done" => Ok(Status::Done),
            "cancelled" => Ok(Status::Cancelled),
            other => Err(EngineError::InvalidAppointment(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

/// A base appointment record as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Anchor start, civil time in the configured zone.
    #[serde(rename = "startDateTime")]
    pub start: CivilTime,
    #[serde(rename = "durationMin")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(rename = "rrule", default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<RecurrenceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Appointment {
    /// A one-off appointment.
    pub fn single(
        id: impl Into<String>,
        service_id: impl Into<String>,
        start: CivilTime,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: None,
            service_id: service_id.into(),
            title: None,
            start,
            duration_minutes,
            is_recurring: false,
            rule: None,
            status: None,
            notes: None,
        }
    }

    /// A series anchored at `start` and repeating on `rule`.
    pub fn recurring(
        id: impl Into<String>,
        service_id: impl Into<String>,
        start: CivilTime,
        duration_minutes: u32,
        rule: RecurrenceRule,
    ) -> Self {
        Self {
            is_recurring: true,
            rule: Some(rule),
            ..Self::single(id, service_id, start, duration_minutes)
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Stored status, `pending` when absent.
    pub fn stored_status(&self) -> Status {
        self.status.unwrap_or_default()
    }

    /// The rule driving a recurring appointment.
    ///
    /// # Errors
    /// `EngineError::InvalidRule` when `isRecurring` is set without a rule.
    pub fn recurrence(&self) -> Result<Option<&RecurrenceRule>> {
        match (self.is_recurring, &self.rule) {
            (false, _) => Ok(None),
            (true, Some(rule)) => Ok(Some(rule)),
            (true, None) => Err(EngineError::InvalidRule(format!(
                "appointment '{}' is recurring but has no rule",
                self.id
            ))),
        }
    }

    /// Checks the invariants enforced before an appointment is written.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EngineError::InvalidAppointment("empty id".into()));
        }
        validate_duration(self.duration_minutes)?;
        if let Some(rule) = self.recurrence()? {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Durations must be positive multiples of [`DURATION_GRANULARITY_MINUTES`].
pub fn validate_duration(minutes: u32) -> Result<()> {
    if minutes == 0 || minutes % DURATION_GRANULARITY_MINUTES != 0 {
        return Err(EngineError::InvalidAppointment(format!(
            "duration {} min is not a positive multiple of {}",
            minutes, DURATION_GRANULARITY_MINUTES
        )));
    }
    Ok(())
}

/// What an exception does to the occurrence it is keyed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExceptionKind {
    Skip,
    Move {
        #[serde(
            rename = "newStartDateTime",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        new_start: Option<CivilTime>,
        #[serde(
            rename = "newDurationMin",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        new_duration_minutes: Option<u32>,
    },
}

/// A point override of one generated occurrence, owned by its appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    pub id: String,
    pub appointment_id: String,
    /// The canonical key the rule generated, unmodified.
    pub original_date_time: CivilTime,
    #[serde(flatten)]
    pub kind: ExceptionKind,
}

impl Exception {
    pub fn skip(
        id: impl Into<String>,
        appointment_id: impl Into<String>,
        original_date_time: CivilTime,
    ) -> Self {
        Self {
            id: id.into(),
            appointment_id: appointment_id.into(),
            original_date_time,
            kind: ExceptionKind::Skip,
        }
    }

    pub fn moved(
        id: impl Into<String>,
        appointment_id: impl Into<String>,
        original_date_time: CivilTime,
        new_start: Option<CivilTime>,
        new_duration_minutes: Option<u32>,
    ) -> Self {
        Self {
            id: id.into(),
            appointment_id: appointment_id.into(),
            original_date_time,
            kind: ExceptionKind::Move {
                new_start,
                new_duration_minutes,
            },
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.kind, ExceptionKind::Skip)
    }
}
