//! Tunable parameters of the analytics engine.
//!
//! Every constant that shapes the feature, weight, belief, aggregation, and
//! backtest computations lives here so a run can be reproduced from its
//! configuration alone.

use serde::{Deserialize, Serialize};

/// Boundaries of the trade-to-resolution horizon classes, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonThresholds {
    /// Upper bound of the short horizon (inclusive).
    pub short_max_hours: i64,
    /// Upper bound of the medium horizon (inclusive); beyond is long.
    pub medium_max_hours: i64,
}

impl Default for HorizonThresholds {
    fn default() -> Self {
        Self {
            short_max_hours: 24,
            medium_max_hours: 7 * 24,
        }
    }
}

/// Parameters of the crowd-wisdom computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Shrinkage strength kappa: how many observations a bucket needs before
    /// its own edge outweighs the wallet's global prior.
    pub prior_strength: f64,
    /// Recency half-life for belief inference, in hours.
    pub half_life_hours: f64,
    /// Clamp applied to beliefs before log-loss.
    pub belief_epsilon: f64,
    /// Saturation scale of the signal-mass confidence component.
    pub signal_mass_scale: f64,
    /// Saturation scale of the trade-count confidence component.
    pub support_scale: f64,
    /// Effective-N at which participation quality reaches one half.
    pub participation_half: f64,
    /// Number of driving wallets reported per snapshot.
    pub drivers_k: usize,
    /// Flow-summary lookback window, in hours.
    pub flow_window_hours: i64,
    /// Market-probability window before the snapshot instant, in minutes.
    pub price_window_minutes: i64,
    /// Horizon class boundaries.
    pub horizon_thresholds: HorizonThresholds,
    /// Divergence band boundaries for backtest edge buckets.
    pub edge_bucket_boundaries: [f64; 3],
    /// Default single-run backtest cutoff, in hours.
    pub backtest_cutoff_hours: f64,
    /// Default backtest sweep extent, in hours.
    pub backtest_max_hours: u32,
    /// Optional bound on how far back the aggregator looks for active
    /// wallets. `None` means unbounded.
    pub active_lookback_hours: Option<i64>,
    /// Optional per-market wallet-count budget; markets above it are
    /// skipped and reported.
    pub max_wallets_per_market: Option<usize>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            prior_strength: 50.0,
            half_life_hours: 48.0,
            belief_epsilon: 1e-6,
            signal_mass_scale: 5.0,
            support_scale: 4.0,
            participation_half: 8.0,
            drivers_k: 10,
            flow_window_hours: 6,
            price_window_minutes: 15,
            horizon_thresholds: HorizonThresholds::default(),
            edge_bucket_boundaries: [0.02, 0.05, 0.10],
            backtest_cutoff_hours: 12.0,
            backtest_max_hours: 168,
            active_lookback_hours: None,
            max_wallets_per_market: None,
        }
    }
}

impl EngineParams {
    /// Sets the shrinkage strength.
    #[must_use]
    pub fn with_prior_strength(mut self, kappa: f64) -> Self {
        self.prior_strength = kappa;
        self
    }

    /// Sets the recency half-life in hours.
    #[must_use]
    pub fn with_half_life_hours(mut self, hours: f64) -> Self {
        self.half_life_hours = hours;
        self
    }

    /// Sets the number of reported drivers.
    #[must_use]
    pub fn with_drivers_k(mut self, k: usize) -> Self {
        self.drivers_k = k;
        self
    }

    /// Sets the per-market wallet budget.
    #[must_use]
    pub fn with_max_wallets_per_market(mut self, budget: Option<usize>) -> Self {
        self.max_wallets_per_market = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let params = EngineParams::default();

        assert!((params.prior_strength - 50.0).abs() < f64::EPSILON);
        assert!((params.half_life_hours - 48.0).abs() < f64::EPSILON);
        assert!((params.belief_epsilon - 1e-6).abs() < f64::EPSILON);
        assert!((params.signal_mass_scale - 5.0).abs() < f64::EPSILON);
        assert!((params.support_scale - 4.0).abs() < f64::EPSILON);
        assert!((params.participation_half - 8.0).abs() < f64::EPSILON);
        assert_eq!(params.drivers_k, 10);
        assert_eq!(params.flow_window_hours, 6);
        assert_eq!(params.price_window_minutes, 15);
        assert_eq!(params.horizon_thresholds.short_max_hours, 24);
        assert_eq!(params.horizon_thresholds.medium_max_hours, 168);
        assert_eq!(params.edge_bucket_boundaries, [0.02, 0.05, 0.10]);
        assert_eq!(params.backtest_max_hours, 168);
        assert!(params.active_lookback_hours.is_none());
        assert!(params.max_wallets_per_market.is_none());
    }

    #[test]
    fn builder_methods_chain() {
        let params = EngineParams::default()
            .with_prior_strength(10.0)
            .with_half_life_hours(24.0)
            .with_drivers_k(5)
            .with_max_wallets_per_market(Some(100));

        assert!((params.prior_strength - 10.0).abs() < f64::EPSILON);
        assert!((params.half_life_hours - 24.0).abs() < f64::EPSILON);
        assert_eq!(params.drivers_k, 5);
        assert_eq!(params.max_wallets_per_market, Some(100));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let params: EngineParams = serde_json::from_str(r#"{"prior_strength": 20.0}"#).unwrap();

        assert!((params.prior_strength - 20.0).abs() < f64::EPSILON);
        assert_eq!(params.drivers_k, 10);
        assert!((params.half_life_hours - 48.0).abs() < f64::EPSILON);
    }
}
