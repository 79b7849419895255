//! Market resolution record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The realized side of a resolved binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolvedOutcome {
    No,
    Yes,
}

impl ResolvedOutcome {
    /// 0/1 indicator used by every scoring formula.
    #[must_use]
    pub fn indicator(self) -> f64 {
        match self {
            Self::No => 0.0,
            Self::Yes => 1.0,
        }
    }

    /// Builds from a 0/1 integer, the storage encoding.
    #[must_use]
    pub fn from_indicator(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::No),
            1 => Some(Self::Yes),
            _ => None,
        }
    }

    /// Storage encoding.
    #[must_use]
    pub fn as_indicator(self) -> i16 {
        match self {
            Self::No => 0,
            Self::Yes => 1,
        }
    }
}

/// A committed resolution. Present iff the market is considered resolved
/// for analytics purposes; the core consumes resolutions, it never derives
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub market_id: String,
    pub resolved: ResolvedOutcome,
    pub resolution_time: DateTime<Utc>,
}

impl Outcome {
    #[must_use]
    pub fn new(market_id: &str, resolved: ResolvedOutcome, resolution_time: DateTime<Utc>) -> Self {
        Self {
            market_id: market_id.to_string(),
            resolved,
            resolution_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_roundtrip() {
        assert_eq!(ResolvedOutcome::from_indicator(0), Some(ResolvedOutcome::No));
        assert_eq!(ResolvedOutcome::from_indicator(1), Some(ResolvedOutcome::Yes));
        assert_eq!(ResolvedOutcome::from_indicator(2), None);
        assert_eq!(ResolvedOutcome::Yes.as_indicator(), 1);
        assert!((ResolvedOutcome::Yes.indicator() - 1.0).abs() < f64::EPSILON);
        assert!((ResolvedOutcome::No.indicator()).abs() < f64::EPSILON);
    }
}
