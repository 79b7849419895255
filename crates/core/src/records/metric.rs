//! Per-wallet feature and trust-weight rows.
//!
//! Both tables are rebuilt from scratch on every pipeline run; they are
//! pure functions of the trades and outcomes visible to the run.

use serde::{Deserialize, Serialize};

use crate::bucket::BucketKey;

/// Skill and style features of one wallet in one bucket, computed against
/// resolved markets only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletMetric {
    pub wallet: String,
    pub bucket: BucketKey,
    /// Number of resolved trade observations in the bucket.
    pub sample_size: u64,
    /// Mean Brier of the wallet's revealed YES beliefs against outcomes.
    pub brier: f64,
    /// Mean clamped log-loss of the same beliefs.
    pub log_loss: f64,
    /// Sample-weighted decile calibration error.
    pub calibration_error: f64,
    /// Signed size-weighted PnL proxy, clamped to [−1, 1].
    pub roi_proxy: f64,
    /// Mean fill size.
    pub avg_size: f64,
    /// Fraction of adjacent observations whose belief side of 0.5 flips.
    pub churn: f64,
    /// 1 − churn.
    pub persistence: f64,
    /// Entropy-derived category concentration of the wallet.
    pub specialization: f64,
    /// Directional alignment of revealed belief versus fill price.
    pub timing_edge: f64,
}

/// Trust weight of one wallet in one bucket, derived from its metric row
/// by support-aware shrinkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletWeight {
    pub wallet: String,
    pub bucket: BucketKey,
    /// Bounded trust weight in [0, 4].
    pub weight: f64,
    /// Uncertainty estimate in [0, 1].
    pub uncertainty: f64,
    /// 0.25 − brier before shrinkage.
    pub raw_edge: f64,
    /// Edge after blending with the wallet's global prior.
    pub shrunk_edge: f64,
    /// Observations backing the row.
    pub support: u64,
}
