//! Per-market snapshot record.
//!
//! Snapshots are append-only: recomputation writes a new row with a fresh
//! instant rather than mutating history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::CategoryBucket;

/// One wallet's contribution to a snapshot's crowd probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub wallet: String,
    /// Trust weight carried into the aggregation.
    pub weight: f64,
    /// Inferred belief at the snapshot instant.
    pub belief: f64,
    /// Signed, normalized pull away from the market price.
    pub contribution: f64,
}

/// Recent net order flow on the market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    /// Σ direction · size over the window.
    pub net_yes_size: f64,
    /// Trades in the window.
    pub trade_count: u64,
    /// Window length, hours.
    pub window_hours: i64,
}

/// Drivers grouped by category bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub category: CategoryBucket,
    pub wallets: u64,
    pub total_weight: f64,
    pub mean_belief: f64,
}

/// The full analytic record for one market at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub market_id: String,
    /// Snapshot instant; together with the market id this is the identity.
    pub at: DateTime<Utc>,
    /// Market-implied YES probability at the instant.
    pub market_prob: f64,
    /// Weighted-belief crowd probability.
    pub crowd_prob: f64,
    /// crowd_prob − market_prob, exactly.
    pub divergence: f64,
    /// Overall confidence in the crowd probability, [0, 1].
    pub confidence: f64,
    /// Weighted belief dispersion, [0, 1].
    pub disagreement: f64,
    /// Saturating function of the effective participant count, [0, 1].
    pub participation_quality: f64,
    /// Concentration-plus-churn manipulation heuristic, [0, 1].
    pub integrity_risk: f64,
    /// Wallets with positive effective weight.
    pub active_wallets: u64,
    /// Set when no trusted participant existed and the snapshot fell back
    /// to the market price.
    pub degenerate: bool,
    /// Top wallets by absolute contribution.
    pub drivers: Vec<Driver>,
    /// Recent net order flow.
    pub flow: FlowSummary,
    /// Drivers grouped by category bucket; empty when degenerate.
    pub cohorts: Vec<CohortSummary>,
}

impl Snapshot {
    /// True when the snapshot carries a usable crowd signal.
    #[must_use]
    pub fn has_signal(&self) -> bool {
        !self.degenerate && self.confidence > 0.0
    }
}
