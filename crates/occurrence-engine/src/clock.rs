//! Wall-clock codec -- converts between zoned instants and canonical civil-time strings.
//!
//! Every occurrence identity and every exception key is a [`CivilTime`]: the
//! wall-clock reading in the configured zone, second precision, no UTC offset
//! (e.g. `2024-01-04T10:00:00`). Keys stay stable when a DST transition changes
//! the zone's offset; the price is that the repeated hour after a fall-back
//! transition maps to a single key (the earlier instant wins).
//!
//! The zone is an explicit [`WallClock`] value passed to every call site.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::dst::DstPolicy;
use crate::error::{EngineError, Result};

/// Canonical rendering: `YYYY-MM-DDTHH:MM:SS`.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Step used when shifting a gap time forward.
const GAP_STEP_MINUTES: i64 = 15;
/// No real-world gap is longer than this.
const MAX_GAP_STEPS: i64 = 16;

/// A civil (wall-clock) date and time in the configured zone, truncated to seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CivilTime(NaiveDateTime);

impl CivilTime {
    pub fn new(naive: NaiveDateTime) -> Self {
        Self(naive.with_nanosecond(0).unwrap_or(naive))
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    /// Parse a canonical string, rejecting anything that does not render back identically.
    pub fn parse(s: &str) -> Result<Self> {
        let naive = NaiveDateTime::parse_from_str(s, CANONICAL_FORMAT)
            .map_err(|e| EngineError::InvalidTime(format!("'{}': {}", s, e)))?;
        let civil = Self(naive);
        if civil.to_string() != s {
            return Err(EngineError::InvalidTime(format!(
                "'{}' is not in canonical form (expected {})",
                s, civil
            )));
        }
        Ok(civil)
    }
}

impl From<NaiveDateTime> for CivilTime {
    fn from(naive: NaiveDateTime) -> Self {
        Self::new(naive)
    }
}

impl fmt::Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(CANONICAL_FORMAT))
    }
}

impl FromStr for CivilTime {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for CivilTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CivilTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The single fixed civil timezone the engine operates in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallClock {
    zone: Tz,
    dst_policy: DstPolicy,
}

impl WallClock {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            dst_policy: DstPolicy::default(),
        }
    }

    /// Build a clock from an IANA zone name (e.g. "America/Montevideo").
    ///
    /// # Errors
    /// Returns `EngineError::InvalidTimezone` if the name is not a known zone.
    pub fn from_name(name: &str) -> Result<Self> {
        let zone: Tz = name
            .parse()
            .map_err(|_| EngineError::InvalidTimezone(name.to_string()))?;
        Ok(Self::new(zone))
    }

    pub fn with_dst_policy(mut self, policy: DstPolicy) -> Self {
        self.dst_policy = policy;
        self
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn dst_policy(&self) -> DstPolicy {
        self.dst_policy
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }

    /// Render an instant as its canonical civil time in this zone.
    pub fn to_canonical<T: TimeZone>(&self, instant: &DateTime<T>) -> CivilTime {
        CivilTime::new(instant.with_timezone(&self.zone).naive_local())
    }

    /// Parse a canonical string and place it in this zone.
    ///
    /// # Errors
    /// `InvalidTime` for a malformed string, `NonexistentLocalTime` for a gap
    /// time under [`DstPolicy::Reject`].
    pub fn from_canonical(&self, s: &str) -> Result<DateTime<Tz>> {
        self.localize(CivilTime::parse(s)?)
    }

    /// Place a civil time in this zone according to the DST policy.
    pub fn localize(&self, civil: CivilTime) -> Result<DateTime<Tz>> {
        match self.zone.from_local_datetime(&civil.as_naive()) {
            LocalResult::Single(dt) => Ok(dt),
            LocalResult::Ambiguous(a, b) => Ok(a.min(b)),
            LocalResult::None => match self.dst_policy {
                DstPolicy::Reject => Err(EngineError::NonexistentLocalTime(civil.to_string())),
                DstPolicy::ShiftForward => self.shift_forward(civil),
            },
        }
    }

    fn shift_forward(&self, civil: CivilTime) -> Result<DateTime<Tz>> {
        let naive = civil.as_naive();
        for step in 1..=MAX_GAP_STEPS {
            let candidate = naive + Duration::minutes(step * GAP_STEP_MINUTES);
            match self.zone.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => return Ok(dt),
                LocalResult::Ambiguous(a, b) => return Ok(a.min(b)),
                LocalResult::None => continue,
            }
        }
        Err(EngineError::NonexistentLocalTime(civil.to_string()))
    }

    /// First and last second of the civil day containing `instant`.
    pub fn day_bounds(&self, instant: &DateTime<Tz>) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
        self.date_bounds(instant.with_timezone(&self.zone).date_naive())
    }

    /// First and last second of a civil date.
    pub fn date_bounds(&self, date: NaiveDate) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
        let bound = |h, m, s| {
            date.and_hms_opt(h, m, s)
                .map(CivilTime::new)
                .ok_or_else(|| EngineError::InvalidTime(format!("no {:02}:{:02} on {}", h, m, date)))
        };
        // Day bounds always shift past a gap; a midnight transition must not fail the query.
        let lenient = self.with_dst_policy(DstPolicy::ShiftForward);
        Ok((
            lenient.localize(bound(0, 0, 0)?)?,
            lenient.localize(bound(23, 59, 59)?)?,
        ))
    }

    /// `instant + minutes`, failing loudly instead of wrapping.
    pub fn add_minutes(&self, instant: &DateTime<Tz>, minutes: i64) -> Result<DateTime<Tz>> {
        Duration::try_minutes(minutes)
            .and_then(|delta| instant.checked_add_signed(delta))
            .ok_or_else(|| {
                EngineError::InvalidTime(format!("{} + {} minutes is out of range", instant, minutes))
            })
    }
}
