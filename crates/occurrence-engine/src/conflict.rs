//! Detect overlaps between a proposed booking and existing occurrences.
//!
//! Intervals are half-open: back-to-back bookings, where one ends exactly when
//! the next starts, are NOT conflicts. Cancelled occurrences no longer hold
//! their slot.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::model::Status;
use crate::occurrence::{Occurrence, OccurrenceId};

/// A detected conflict with one existing occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub occurrence: OccurrenceId,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub overlap_minutes: i64,
}

/// Two intervals `[a_start, a_end)` and `[b_start, b_end)` overlap iff
/// `a_start < b_end && b_start < a_end`.
pub fn overlaps(
    a_start: &DateTime<Tz>,
    a_end: &DateTime<Tz>,
    b_start: &DateTime<Tz>,
    b_end: &DateTime<Tz>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Find every occurrence overlapping `[start, end)`.
///
/// Cancelled occurrences and those owned by `exclude_base_id` are ignored,
/// so editing an appointment can re-check its slot without conflicting with
/// itself.
/// The overlap duration is `min(end, occ.end) - max(start, occ.start)`.
pub fn find_conflicts(
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    occurrences: &[Occurrence],
    exclude_base_id: Option<&str>,
) -> Vec<Conflict> {
    occurrences
        .iter()
        .filter(|occ| occ.status != Status::Cancelled)
        .filter(|occ| exclude_base_id != Some(occ.id.base_id()))
        .filter(|occ| overlaps(start, end, &occ.start, &occ.end))
        .map(|occ| {
            let overlap_start = (*start).max(occ.start);
            let overlap_end = (*end).min(occ.end);
            Conflict {
                occurrence: occ.id.clone(),
                start: occ.start,
                end: occ.end,
                overlap_minutes: (overlap_end - overlap_start).num_minutes(),
            }
        })
        .collect()
}
