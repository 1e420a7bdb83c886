//! Compute free time slots between occurrences.
//!
//! Sorts occurrences by start time, merges overlapping busy periods, then
//! computes the gaps between merged periods within a given window.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::occurrence::Occurrence;

/// A free time slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeSlot {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub duration_minutes: i64,
}

/// Merge overlapping or adjacent busy periods, clipped to the given window.
///
/// Returns a sorted, non-overlapping list of (start, end) intervals.
pub fn merge_busy_periods(
    occurrences: &[Occurrence],
    window_start: &DateTime<Tz>,
    window_end: &DateTime<Tz>,
) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    let mut intervals: Vec<(DateTime<Tz>, DateTime<Tz>)> = occurrences
        .iter()
        .filter(|o| o.start < *window_end && o.end > *window_start)
        .map(|o| (o.start.max(*window_start), o.end.min(*window_end)))
        .collect();

    intervals.sort_by_key(|&(start, end)| (start, end));

    let mut merged: Vec<(DateTime<Tz>, DateTime<Tz>)> = Vec::new();
    for (start, end) in intervals {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }

    merged
}

/// Find free slots within the window, given the occurrences already booked.
///
/// Returns free slots sorted by start time.
pub fn free_slots(
    occurrences: &[Occurrence],
    window_start: &DateTime<Tz>,
    window_end: &DateTime<Tz>,
) -> Vec<FreeSlot> {
    let mut slots = Vec::new();
    let mut cursor = *window_start;

    for (busy_start, busy_end) in merge_busy_periods(occurrences, window_start, window_end) {
        if cursor < busy_start {
            slots.push(FreeSlot {
                start: cursor,
                end: busy_start,
                duration_minutes: (busy_start - cursor).num_minutes(),
            });
        }
        cursor = cursor.max(busy_end);
    }

    // Trailing gap after the last busy period.
    if cursor < *window_end {
        slots.push(FreeSlot {
            start: cursor,
            end: *window_end,
            duration_minutes: (*window_end - cursor).num_minutes(),
        });
    }

    slots
}

/// The first free slot of at least `min_duration_minutes` within the window.
pub fn first_free_slot(
    occurrences: &[Occurrence],
    window_start: &DateTime<Tz>,
    window_end: &DateTime<Tz>,
    min_duration_minutes: i64,
) -> Option<FreeSlot> {
    free_slots(occurrences, window_start, window_end)
        .into_iter()
        .find(|slot| slot.duration_minutes >= min_duration_minutes)
}
