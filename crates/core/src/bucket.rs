//! Bucketing scheme for per-wallet statistics.
//!
//! Wallet skill is not one number: a wallet that is sharp on crypto
//! intraday markets may be noise on month-long politics markets. Metrics
//! and trust weights are therefore keyed by a (category, horizon) bucket
//! pair, with an `"_all_"` sentinel on either axis for the pooled rows.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::params::HorizonThresholds;

/// Sentinel bucket id used for the pooled ("all categories" / "all
/// horizons") rows.
pub const ALL_BUCKET: &str = "_all_";

/// Time-to-resolution class of a trade or market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    /// Resolution within 24 hours of the trade.
    Short,
    /// Resolution between 24 hours and 7 days out.
    Medium,
    /// Resolution more than 7 days out.
    Long,
}

impl Horizon {
    /// Classifies a trade-to-resolution gap.
    ///
    /// Non-positive gaps (a trade at or after the resolution instant)
    /// classify as `Short`.
    #[must_use]
    pub fn from_gap(gap: Duration, thresholds: &HorizonThresholds) -> Self {
        let hours = gap.num_seconds() as f64 / 3600.0;
        if hours <= thresholds.short_max_hours as f64 {
            Self::Short
        } else if hours <= thresholds.medium_max_hours as f64 {
            Self::Medium
        } else {
            Self::Long
        }
    }

    /// Stable string id used in storage and bucket keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    /// Parses the stable string id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            _ => None,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category axis of a bucket key: a concrete market category or the pooled
/// sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CategoryBucket {
    /// Pooled across all categories.
    All,
    /// A concrete category (normalized: trimmed, lowercase, non-empty).
    Category(String),
}

impl CategoryBucket {
    /// Builds a bucket from a free-text market category.
    ///
    /// Empty, whitespace-only, or literal-sentinel categories collapse
    /// into the pooled bucket, per the data model ("may be empty — treat
    /// as bucket `_all_`").
    #[must_use]
    pub fn from_market_category(category: &str) -> Self {
        let normalized = category.trim().to_lowercase();
        if normalized.is_empty() || normalized == ALL_BUCKET {
            Self::All
        } else {
            Self::Category(normalized)
        }
    }

    /// Stable string id used in storage and bucket keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => ALL_BUCKET,
            Self::Category(name) => name,
        }
    }

    /// Parses the stable string id.
    #[must_use]
    pub fn from_encoded(value: &str) -> Self {
        if value == ALL_BUCKET {
            Self::All
        } else {
            Self::Category(value.to_string())
        }
    }

    /// Returns true for a concrete (non-pooled) category.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        matches!(self, Self::Category(_))
    }
}

impl PartialOrd for CategoryBucket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CategoryBucket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Serialize for CategoryBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CategoryBucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_encoded(&raw))
    }
}

/// Horizon axis of a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizonBucket {
    /// Pooled across all horizons.
    All,
    /// A concrete horizon class.
    Horizon(Horizon),
}

impl HorizonBucket {
    /// Stable string id used in storage and bucket keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => ALL_BUCKET,
            Self::Horizon(h) => h.as_str(),
        }
    }

    /// Parses the stable string id.
    #[must_use]
    pub fn from_encoded(value: &str) -> Option<Self> {
        if value == ALL_BUCKET {
            Some(Self::All)
        } else {
            Horizon::parse(value).map(Self::Horizon)
        }
    }
}

impl PartialOrd for HorizonBucket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HorizonBucket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Serialize for HorizonBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HorizonBucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_encoded(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown horizon bucket: {raw}")))
    }
}

/// Full bucket key for wallet metrics and trust weights.
///
/// Ordering is lexicographic over the encoded (category, horizon) pair so
/// engine output is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub category: CategoryBucket,
    pub horizon: HorizonBucket,
}

impl BucketKey {
    #[must_use]
    pub fn new(category: CategoryBucket, horizon: HorizonBucket) -> Self {
        Self { category, horizon }
    }

    /// The fully pooled ("_all_", "_all_") key.
    #[must_use]
    pub fn global() -> Self {
        Self {
            category: CategoryBucket::All,
            horizon: HorizonBucket::All,
        }
    }

    /// Returns true for the fully pooled key.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.category == CategoryBucket::All && self.horizon == HorizonBucket::All
    }

    /// The four rows a resolved observation feeds: global, (cat, *),
    /// (*, hz), (cat, hz).
    ///
    /// When the market has no concrete category the category axis collapses
    /// into the pooled bucket and only two distinct keys remain.
    #[must_use]
    pub fn expansion(category: &CategoryBucket, horizon: Horizon) -> Vec<Self> {
        let mut keys = vec![
            Self::global(),
            Self::new(category.clone(), HorizonBucket::All),
            Self::new(CategoryBucket::All, HorizonBucket::Horizon(horizon)),
            Self::new(category.clone(), HorizonBucket::Horizon(horizon)),
        ];
        keys.sort();
        keys.dedup();
        keys
    }

    /// Encoded `category/horizon` id, used for tie-breaking and logs.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", self.category.as_str(), self.horizon.as_str())
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category.as_str(), self.horizon.as_str())
    }
}
