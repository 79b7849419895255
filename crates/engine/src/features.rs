//! Feature engine: resolved observations → per-wallet metric rows.
//!
//! Each resolved observation feeds four bucket rows — global, (cat, *),
//! (*, hz), (cat, hz) — and every statistic is recomputed from scratch on
//! each run. The engine is a pure function of the working set: no
//! randomness, ties broken by wallet id then bucket id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crowdcast_core::{
    stats, stats::CALIBRATION_DECILES, BucketKey, EngineParams, WalletMetric,
};

use crate::observation::Observation;
use crate::working_set::WorkingSet;

/// Per-bucket accumulator over resolved observations.
#[derive(Debug, Default)]
struct BucketAccum {
    n: u64,
    sum_brier: f64,
    sum_log_loss: f64,
    sum_size: f64,
    sum_roi_numerator: f64,
    sum_timing: f64,
    decile_n: [u64; CALIBRATION_DECILES],
    decile_belief: [f64; CALIBRATION_DECILES],
    decile_outcome: [f64; CALIBRATION_DECILES],
    /// (instant, bullish) pairs for churn; sorted once at finalization.
    timeline: Vec<(DateTime<Utc>, bool)>,
}

impl BucketAccum {
    fn push(&mut self, obs: &Observation, epsilon: f64) {
        self.n += 1;
        self.sum_brier += obs.brier();
        self.sum_log_loss += obs.log_loss(epsilon);
        self.sum_size += obs.size;
        self.sum_roi_numerator += obs.roi_numerator();
        self.sum_timing += obs.timing_signal();

        let decile = stats::decile_index(obs.yes_belief);
        self.decile_n[decile] += 1;
        self.decile_belief[decile] += obs.yes_belief;
        self.decile_outcome[decile] += obs.outcome;

        self.timeline.push((obs.ts, obs.is_bullish()));
    }

    /// Sample-weighted mean of per-decile |mean belief − mean outcome|.
    fn calibration_error(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let mut weighted = 0.0;
        for d in 0..CALIBRATION_DECILES {
            if self.decile_n[d] == 0 {
                continue;
            }
            let count = self.decile_n[d] as f64;
            let gap = (self.decile_belief[d] / count - self.decile_outcome[d] / count).abs();
            weighted += gap * count;
        }
        weighted / self.n as f64
    }

    /// Fraction of adjacent chronological observations whose belief side
    /// of 0.5 flips.
    fn churn(&mut self) -> f64 {
        if self.timeline.len() < 2 {
            return 0.0;
        }
        self.timeline.sort_by_key(|(ts, _)| *ts);
        let flips = self
            .timeline
            .windows(2)
            .filter(|pair| pair[0].1 != pair[1].1)
            .count();
        flips as f64 / (self.timeline.len() - 1) as f64
    }
}

/// Computes every wallet metric row from the working set's resolved
/// markets.
///
/// Buckets with no observations emit no row. Output is sorted by wallet id
/// then bucket id.
#[must_use]
pub fn compute_wallet_metrics(ws: &WorkingSet, params: &EngineParams) -> Vec<WalletMetric> {
    let mut accums: BTreeMap<(String, BucketKey), BucketAccum> = BTreeMap::new();
    let mut category_counts: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();

    for (market, outcome) in ws.resolved_markets() {
        for trade in ws.trades_for(&market.id) {
            let obs = Observation::from_trade(trade, market, outcome, params);
            *category_counts
                .entry(obs.wallet.clone())
                .or_default()
                .entry(obs.category.as_str().to_string())
                .or_default() += 1;
            for key in BucketKey::expansion(&obs.category, obs.horizon) {
                accums
                    .entry((obs.wallet.clone(), key))
                    .or_default()
                    .push(&obs, params.belief_epsilon);
            }
        }
    }

    let specialization: BTreeMap<&String, f64> = category_counts
        .iter()
        .map(|(wallet, counts)| {
            let values: Vec<u64> = counts.values().copied().collect();
            (wallet, stats::entropy_specialization(&values))
        })
        .collect();

    let mut rows = Vec::with_capacity(accums.len());
    for ((wallet, bucket), mut accum) in accums {
        if accum.n == 0 {
            continue;
        }
        let n = accum.n as f64;
        let churn = accum.churn();
        let roi = if accum.sum_size > 0.0 {
            (accum.sum_roi_numerator / accum.sum_size).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        rows.push(WalletMetric {
            specialization: specialization.get(&wallet).copied().unwrap_or(1.0),
            wallet,
            bucket,
            sample_size: accum.n,
            brier: accum.sum_brier / n,
            log_loss: accum.sum_log_loss / n,
            calibration_error: accum.calibration_error(),
            roi_proxy: roi,
            avg_size: accum.sum_size / n,
            churn,
            persistence: 1.0 - churn,
            timing_edge: accum.sum_timing / n,
        });
    }

    debug!(rows = rows.len(), "feature engine emitted metric rows");
    rows
}
