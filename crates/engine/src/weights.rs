//! Weight engine: metric rows → bounded trust weights.
//!
//! The edge proxy is `0.25 − brier` (0.25 being the Brier score of a
//! maximally uninformed predictor on a balanced binary outcome), shrunk
//! toward the wallet's own global edge in proportion to the bucket's
//! sample, then scaled and adjusted by behavioral multipliers. A wallet
//! with no demonstrated edge carries weight zero into the aggregation; a
//! wallet cannot carry more than 4x baseline no matter how good its
//! numbers look.

use std::collections::HashMap;

use tracing::debug;

use crowdcast_core::{EngineParams, WalletMetric, WalletWeight};

/// Brier score of an uninformed forecaster on a balanced binary outcome.
const UNINFORMED_BRIER: f64 = 0.25;

/// Scale from shrunk edge to base weight: brier 0 maps to base 1.
const EDGE_SCALE: f64 = 4.0;

/// Hard cap on any trust weight.
const MAX_WEIGHT: f64 = 4.0;

/// Derives a trust weight and uncertainty from every metric row.
///
/// Input ordering is preserved (the feature engine already sorts by wallet
/// then bucket), so two runs over identical metrics produce identical rows.
#[must_use]
pub fn compute_wallet_weights(
    metrics: &[WalletMetric],
    params: &EngineParams,
) -> Vec<WalletWeight> {
    // The wallet's pooled edge is the shrinkage prior for its other rows.
    let global_edges: HashMap<&str, f64> = metrics
        .iter()
        .filter(|m| m.bucket.is_global())
        .map(|m| (m.wallet.as_str(), UNINFORMED_BRIER - m.brier))
        .collect();

    let mut rows = Vec::with_capacity(metrics.len());
    for metric in metrics {
        if metric.sample_size == 0 {
            continue;
        }
        let n = metric.sample_size as f64;
        let raw_edge = UNINFORMED_BRIER - metric.brier;
        let prior_edge = global_edges.get(metric.wallet.as_str()).copied().unwrap_or(0.0);

        let alpha = n / (n + params.prior_strength);
        let shrunk_edge = alpha * raw_edge + (1.0 - alpha) * prior_edge;

        let base = (shrunk_edge * EDGE_SCALE).max(0.0);

        let churn_penalty = (1.0 - metric.churn).clamp(0.25, 1.0);
        let calibration_penalty = (1.0 - 2.0 * metric.calibration_error).clamp(0.25, 1.0);
        let specialization_boost = if metric.bucket.category.is_concrete() {
            (1.0 + 0.5 * metric.specialization).clamp(1.0, 2.0)
        } else {
            1.0
        };
        let timing_boost = (1.0 + 2.0 * metric.timing_edge.max(0.0)).clamp(1.0, 2.0);

        let weight = (base * churn_penalty * calibration_penalty * specialization_boost
            * timing_boost)
            .clamp(0.0, MAX_WEIGHT);
        let uncertainty = (metric.calibration_error + 1.0 / (n + 1.0).sqrt()).clamp(0.0, 1.0);

        rows.push(WalletWeight {
            wallet: metric.wallet.clone(),
            bucket: metric.bucket.clone(),
            weight,
            uncertainty,
            raw_edge,
            shrunk_edge,
            support: metric.sample_size,
        });
    }

    debug!(rows = rows.len(), "weight engine emitted trust weights");
    rows
}
