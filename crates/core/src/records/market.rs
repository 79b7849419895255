//! Market record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bucket::CategoryBucket;

/// A binary prediction market as seen by the analytics core.
///
/// Identity is externally assigned and immutable; the descriptive fields
/// may be updated by re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// External market id.
    pub id: String,
    /// Free-text question.
    pub question: String,
    /// Scheduled resolution instant.
    pub end_time: DateTime<Utc>,
    /// Free-text category; may be empty.
    pub category: String,
    /// Reported liquidity in USD, when the source provides it.
    pub liquidity: Option<Decimal>,
    /// Resolution-source tag, when the source provides it.
    pub resolution_source: Option<String>,
}

impl Market {
    /// Creates a market with the required fields.
    #[must_use]
    pub fn new(id: &str, question: &str, end_time: DateTime<Utc>, category: &str) -> Self {
        Self {
            id: id.to_string(),
            question: question.to_string(),
            end_time,
            category: category.to_string(),
            liquidity: None,
            resolution_source: None,
        }
    }

    /// Adds optional source metadata.
    #[must_use]
    pub fn with_metadata(
        mut self,
        liquidity: Option<Decimal>,
        resolution_source: Option<String>,
    ) -> Self {
        self.liquidity = liquidity;
        self.resolution_source = resolution_source;
        self
    }

    /// The category bucket this market's statistics are keyed under.
    #[must_use]
    pub fn category_bucket(&self) -> CategoryBucket {
        CategoryBucket::from_market_category(&self.category)
    }
}
