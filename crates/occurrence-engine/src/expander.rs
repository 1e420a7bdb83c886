//! Rule expansion -- converts a recurrence rule and its anchor into concrete start instants.
//!
//! Wraps the `rrule` crate (v0.13): the rule is rendered as an RFC 5545
//! `DTSTART;TZID=...` / `RRULE:` block in the clock's zone, so every instance
//! keeps the anchor's wall-clock time of day across DST transitions.
//!
//! Frequency semantics follow RFC 5545:
//! - DAILY: every `interval` days from the anchor date.
//! - WEEKLY: every `interval` weeks (weeks start on Monday), on the selected
//!   weekdays or the anchor's weekday when none are selected.
//! - MONTHLY: every `interval` months on the anchor's day of month. Months
//!   without that day (the 31st in April, the 30th in February) are skipped.
//!
//! [`DstPolicy`](crate::dst::DstPolicy) governs anchors, moved starts and range
//! bounds, not generated instances. An instance whose wall-clock time falls in
//! a spring-forward gap is placed by `rrule` after the gap (a daily 02:30
//! series in New York yields 03:30 on the transition day), whatever the policy.

use chrono::{DateTime, Duration, Utc, Weekday};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::clock::{CivilTime, WallClock};
use crate::error::{EngineError, Result};
use crate::model::{Frequency, RecurrenceRule};

/// Upper bound on instances materialized by a single expansion.
const MAX_INSTANCES: u16 = u16::MAX;

fn byday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Render the iCalendar text block the `rrule` parser consumes.
///
/// `until` is deliberately not rendered: it is applied to civil times after
/// expansion so that an inclusive bound never depends on UTC conversion.
fn rule_text(rule: &RecurrenceRule, anchor: CivilTime, clock: &WallClock) -> Result<String> {
    let mut parts = vec![
        format!("FREQ={}", rule.freq.as_rrule()),
        format!("INTERVAL={}", rule.interval),
    ];

    // Weekday selectors only carry meaning for weekly rules.
    if rule.freq == Frequency::Weekly {
        let weekdays = rule.weekdays()?;
        if !weekdays.is_empty() {
            let codes: Vec<&str> = weekdays.into_iter().map(byday_code).collect();
            parts.push(format!("BYDAY={}", codes.join(",")));
        }
    }

    if let Some(count) = rule.count {
        parts.push(format!("COUNT={}", count));
    }

    Ok(format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        clock.zone().name(),
        anchor.as_naive().format("%Y%m%dT%H%M%S"),
        parts.join(";")
    ))
}

/// Expand a rule into the ordered start instants inside `[range_start, range_end]`.
///
/// Both range bounds are inclusive. `count` is counted from the anchor (so a
/// window late in the series sees only what is left of it) and `until` is an
/// inclusive bound on the generated civil time; the sequence stops at
/// whichever bound is hit first. The same inputs always yield the same output.
///
/// # Errors
/// Returns `EngineError::InvalidRule` for a zero interval, an out-of-range
/// weekday selector, or a rule the `rrule` crate rejects.
pub fn expand(
    rule: &RecurrenceRule,
    anchor: CivilTime,
    range_start: &DateTime<Tz>,
    range_end: &DateTime<Tz>,
    clock: &WallClock,
) -> Result<Vec<DateTime<Tz>>> {
    rule.validate()?;

    // Short-circuit: the rule can never produce anything here.
    if rule.count == Some(0) || range_end < range_start {
        return Ok(Vec::new());
    }
    if let Some(until) = rule.until {
        if until < anchor {
            return Ok(Vec::new());
        }
    }

    let text = rule_text(rule, anchor, clock)?;
    let rule_set: RRuleSet = text
        .parse()
        .map_err(|e| EngineError::InvalidRule(format!("{}", e)))?;

    // Widen by one second on each side so the bounds are inclusive regardless
    // of how the crate treats `after`/`before`; the exact filter runs below.
    let utc: rrule::Tz = Utc.into();
    let start_utc = range_start.with_timezone(&Utc);
    let end_utc = range_end.with_timezone(&Utc);
    let after = start_utc
        .checked_sub_signed(Duration::seconds(1))
        .unwrap_or(start_utc)
        .with_timezone(&utc);
    let before = end_utc
        .checked_add_signed(Duration::seconds(1))
        .unwrap_or(end_utc)
        .with_timezone(&utc);

    let result = rule_set.after(after).before(before).all(MAX_INSTANCES);
    if result.limited {
        tracing::warn!(
            rule = %text,
            limit = MAX_INSTANCES,
            "rule expansion hit the instance limit; later instances are dropped"
        );
    }

    let zone = clock.zone();
    let instances: Vec<DateTime<Tz>> = result
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&zone))
        .filter(|dt| dt >= range_start && dt <= range_end)
        .filter(|dt| match rule.until {
            Some(until) => clock.to_canonical(dt) <= until,
            None => true,
        })
        .collect();

    tracing::debug!(
        rule = %text,
        range_start = %range_start,
        range_end = %range_end,
        instances = instances.len(),
        "expanded recurrence rule"
    );

    Ok(instances)
}

/// Whether `instant` is one of the instants the rule generates.
pub fn contains(
    rule: &RecurrenceRule,
    anchor: CivilTime,
    instant: &DateTime<Tz>,
    clock: &WallClock,
) -> Result<bool> {
    Ok(!expand(rule, anchor, instant, instant, clock)?.is_empty())
}
