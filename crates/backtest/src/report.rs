//! Backtest report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crowdcast_core::stats::{self, CALIBRATION_DECILES};

/// One resolved market scored at its cutoff instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvaluation {
    pub market_id: String,
    pub cutoff_time: DateTime<Utc>,
    pub market_prob: f64,
    pub crowd_prob: f64,
    /// Realized outcome indicator, 0 or 1.
    pub realized: f64,
    pub brier_market: f64,
    pub brier_crowd: f64,
    pub divergence: f64,
    pub confidence: f64,
}

impl MarketEvaluation {
    /// Signed PnL proxy of betting the divergence direction.
    #[must_use]
    pub fn pnl_proxy(&self) -> f64 {
        self.divergence * (2.0 * self.realized - 1.0)
    }

    /// True when the divergence pointed toward the realized outcome.
    #[must_use]
    pub fn divergence_won(&self) -> bool {
        (self.divergence > 0.0 && self.realized > 0.5)
            || (self.divergence < 0.0 && self.realized < 0.5)
    }
}

/// Aggregate statistics over evaluations in one |divergence| band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeBucket {
    /// Human-readable band label, e.g. `"2-5%"`.
    pub label: String,
    /// Inclusive lower |divergence| bound.
    pub lo: f64,
    /// Exclusive upper bound (inclusive for the last band).
    pub hi: f64,
    pub count: u64,
    pub mean_edge: f64,
    pub mean_pnl: f64,
    pub win_rate: f64,
}

impl EdgeBucket {
    /// Partitions evaluations into bands by |divergence|.
    ///
    /// `boundaries` are the interior band edges; the outer bounds are 0
    /// and 1. Empty bands are reported with zero statistics so counts
    /// always sum to the number of evaluations.
    #[must_use]
    pub fn partition(evaluations: &[MarketEvaluation], boundaries: &[f64; 3]) -> Vec<Self> {
        let edges = [0.0, boundaries[0], boundaries[1], boundaries[2], 1.0];
        let mut buckets = Vec::with_capacity(edges.len() - 1);
        for (i, window) in edges.windows(2).enumerate() {
            let (lo, hi) = (window[0], window[1]);
            let last = i == edges.len() - 2;
            let members: Vec<&MarketEvaluation> = evaluations
                .iter()
                .filter(|e| {
                    let d = e.divergence.abs();
                    d >= lo && (d < hi || (last && d <= hi))
                })
                .collect();

            let count = members.len() as u64;
            let (mean_edge, mean_pnl, win_rate) = if members.is_empty() {
                (0.0, 0.0, 0.0)
            } else {
                let n = members.len() as f64;
                (
                    members.iter().map(|e| e.divergence.abs()).sum::<f64>() / n,
                    members.iter().map(|e| e.pnl_proxy()).sum::<f64>() / n,
                    members.iter().filter(|e| e.divergence_won()).count() as f64 / n,
                )
            };

            buckets.push(Self {
                label: Self::label(lo, hi, last),
                lo,
                hi,
                count,
                mean_edge,
                mean_pnl,
                win_rate,
            });
        }
        buckets
    }

    fn label(lo: f64, hi: f64, last: bool) -> String {
        if last {
            format!("{}%+", (lo * 100.0).round() as i64)
        } else {
            format!(
                "{}-{}%",
                (lo * 100.0).round() as i64,
                (hi * 100.0).round() as i64
            )
        }
    }
}

/// One probability decile of a calibration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bin: usize,
    pub count: u64,
    /// Mean forecast probability in the bin; `None` when empty.
    pub avg_prob: Option<f64>,
    /// Empirical outcome rate in the bin; `None` when empty.
    pub empirical: Option<f64>,
}

impl CalibrationBin {
    /// Ten-bin calibration table of forecasts against outcomes.
    #[must_use]
    pub fn table(probs: &[f64], outcomes: &[f64]) -> Vec<Self> {
        let mut count = [0u64; CALIBRATION_DECILES];
        let mut prob_sum = [0.0; CALIBRATION_DECILES];
        let mut outcome_sum = [0.0; CALIBRATION_DECILES];
        for (p, y) in probs.iter().zip(outcomes) {
            let bin = stats::decile_index(*p);
            count[bin] += 1;
            prob_sum[bin] += p;
            outcome_sum[bin] += y;
        }
        (0..CALIBRATION_DECILES)
            .map(|bin| {
                if count[bin] == 0 {
                    Self {
                        bin,
                        count: 0,
                        avg_prob: None,
                        empirical: None,
                    }
                } else {
                    let n = count[bin] as f64;
                    Self {
                        bin,
                        count: count[bin],
                        avg_prob: Some(prob_sum[bin] / n),
                        empirical: Some(outcome_sum[bin] / n),
                    }
                }
            })
            .collect()
    }
}

/// Full report of one backtest at one cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub cutoff_hours: f64,
    pub total_markets: u64,
    pub brier_market: f64,
    pub brier_crowd: f64,
    pub log_loss_market: f64,
    pub log_loss_crowd: f64,
    /// `1 − brier_crowd / brier_market`; `None` when the market Brier
    /// is zero.
    pub brier_improvement: Option<f64>,
    pub edge_buckets: Vec<EdgeBucket>,
    pub calibration_market: Vec<CalibrationBin>,
    pub calibration_crowd: Vec<CalibrationBin>,
    /// Largest-|divergence| evaluations, for inspection.
    pub top_divergence_cases: Vec<MarketEvaluation>,
    pub evaluations: Vec<MarketEvaluation>,
}

impl BacktestReport {
    /// An empty report for a cutoff with no eligible markets.
    #[must_use]
    pub fn empty(run_id: Uuid, cutoff_hours: f64, boundaries: &[f64; 3]) -> Self {
        Self {
            run_id,
            cutoff_hours,
            total_markets: 0,
            brier_market: 0.0,
            brier_crowd: 0.0,
            log_loss_market: 0.0,
            log_loss_crowd: 0.0,
            brier_improvement: None,
            edge_buckets: EdgeBucket::partition(&[], boundaries),
            calibration_market: CalibrationBin::table(&[], &[]),
            calibration_crowd: CalibrationBin::table(&[], &[]),
            top_divergence_cases: Vec::new(),
            evaluations: Vec::new(),
        }
    }

    /// The point this report contributes to a sweep curve.
    #[must_use]
    pub fn sweep_point(&self) -> SweepPoint {
        SweepPoint {
            cutoff_hours: self.cutoff_hours,
            total_markets: self.total_markets,
            brier_market: self.brier_market,
            brier_crowd: self.brier_crowd,
            brier_improvement: self.brier_improvement,
        }
    }
}

/// One cutoff of a sweep, reduced to the curve fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub cutoff_hours: f64,
    pub total_markets: u64,
    pub brier_market: f64,
    pub brier_crowd: f64,
    pub brier_improvement: Option<f64>,
}

/// A full sweep: one report per cutoff plus the aggregate curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub max_hours: u32,
    pub reports: Vec<BacktestReport>,
    pub curve: Vec<SweepPoint>,
}
