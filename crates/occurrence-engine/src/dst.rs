//! DST transition policies for civil times that fall into a spring-forward gap.

use serde::{Deserialize, Serialize};

/// Policy for localizing a civil time the zone skips over.
///
/// Ambiguous times (the repeated hour after a fall-back transition) are not
/// governed by this policy: they always resolve to the earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DstPolicy {
    /// Fail with `EngineError::NonexistentLocalTime`.
    #[default]
    Reject,
    /// Shift to the next valid wall-clock time after the gap
    ShiftForward,
}

impl std::str::FromStr for DstPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "shift-forward" => Ok(Self::ShiftForward),
            other => Err(format!(
                "unknown DST policy '{}' (expected 'reject' or 'shift-forward')",
                other
            )),
        }
    }
}
