//! Backtest driver: replay the aggregator before resolution and score it.
//!
//! Nothing here persists anything: the driver borrows a frozen working
//! set and weight table and produces report values. Leakage control is
//! structural — the snapshot builder only ever sees trades at or before
//! the cutoff instant.

use std::collections::BTreeSet;

use chrono::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crowdcast_core::{stats, EngineParams, RunCounters};
use crowdcast_engine::{SnapshotBuilder, WeightTable, WorkingSet};

use crate::report::{
    BacktestReport, CalibrationBin, EdgeBucket, MarketEvaluation, SweepReport,
};

/// How many top-divergence evaluations a report retains for inspection.
const TOP_CASES: usize = 8;

/// Replays snapshots at `resolution − cutoff` for resolved markets.
pub struct BacktestDriver<'a> {
    ws: &'a WorkingSet,
    weights: &'a WeightTable,
    params: &'a EngineParams,
}

impl<'a> BacktestDriver<'a> {
    #[must_use]
    pub fn new(ws: &'a WorkingSet, weights: &'a WeightTable, params: &'a EngineParams) -> Self {
        Self { ws, weights, params }
    }

    /// Runs one backtest at `cutoff_hours` before each resolution.
    ///
    /// When `markets` is given, only those ids are evaluated; otherwise
    /// every resolved market whose earliest trade precedes the cutoff
    /// instant participates. Markets without enough pre-cutoff history
    /// are counted as ineligible, never silently dropped.
    #[must_use]
    pub fn run(
        &self,
        cutoff_hours: f64,
        markets: Option<&BTreeSet<String>>,
        run_id: Uuid,
        counters: &mut RunCounters,
    ) -> BacktestReport {
        let cutoff = Duration::seconds((cutoff_hours * 3600.0) as i64);
        let builder = SnapshotBuilder::new(self.ws, self.weights, self.params);

        let mut evaluations = Vec::new();
        for (market, outcome) in self.ws.resolved_markets() {
            if let Some(selected) = markets {
                if !selected.contains(&market.id) {
                    continue;
                }
            }
            let cutoff_time = outcome.resolution_time - cutoff;
            let eligible = self
                .ws
                .earliest_trade(&market.id)
                .map_or(false, |first| first < cutoff_time);
            if !eligible {
                counters.ineligible_markets += 1;
                debug!(market_id = %market.id, cutoff_hours, "ineligible: no pre-cutoff history");
                continue;
            }

            let snapshot = match builder.build(&market.id, cutoff_time, counters) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    debug!(market_id = %market.id, error = %err, "evaluation failed");
                    counters.failed_markets += 1;
                    continue;
                }
            };

            let realized = outcome.resolved.indicator();
            evaluations.push(MarketEvaluation {
                market_id: market.id.clone(),
                cutoff_time,
                market_prob: snapshot.market_prob,
                crowd_prob: snapshot.crowd_prob,
                realized,
                brier_market: (snapshot.market_prob - realized).powi(2),
                brier_crowd: (snapshot.crowd_prob - realized).powi(2),
                divergence: snapshot.divergence,
                confidence: snapshot.confidence,
            });
        }

        info!(
            cutoff_hours,
            evaluated = evaluations.len(),
            ineligible = counters.ineligible_markets,
            "backtest cutoff complete"
        );
        self.summarize(run_id, cutoff_hours, evaluations)
    }

    /// Runs the backtest at every cutoff in `1..=max_hours`.
    ///
    /// Eligibility shrinks as the cutoff grows, so the sweep stops at the
    /// first cutoff with no eligible markets.
    #[must_use]
    pub fn sweep(&self, max_hours: u32, run_id: Uuid, counters: &mut RunCounters) -> SweepReport {
        let mut reports = Vec::new();
        for hour in 1..=max_hours {
            let report = self.run(f64::from(hour), None, run_id, counters);
            let empty = report.total_markets == 0;
            reports.push(report);
            if empty {
                break;
            }
        }
        let curve = reports.iter().map(BacktestReport::sweep_point).collect();
        SweepReport {
            run_id,
            max_hours,
            reports,
            curve,
        }
    }

    fn summarize(
        &self,
        run_id: Uuid,
        cutoff_hours: f64,
        evaluations: Vec<MarketEvaluation>,
    ) -> BacktestReport {
        if evaluations.is_empty() {
            return BacktestReport::empty(run_id, cutoff_hours, &self.params.edge_bucket_boundaries);
        }

        let n = evaluations.len() as f64;
        let market_probs: Vec<f64> = evaluations.iter().map(|e| e.market_prob).collect();
        let crowd_probs: Vec<f64> = evaluations.iter().map(|e| e.crowd_prob).collect();
        let outcomes: Vec<f64> = evaluations.iter().map(|e| e.realized).collect();

        let brier_market = evaluations.iter().map(|e| e.brier_market).sum::<f64>() / n;
        let brier_crowd = evaluations.iter().map(|e| e.brier_crowd).sum::<f64>() / n;
        let epsilon = self.params.belief_epsilon;
        let log_loss_market = market_probs
            .iter()
            .zip(&outcomes)
            .map(|(p, y)| stats::safe_log_loss(*p, *y, epsilon))
            .sum::<f64>()
            / n;
        let log_loss_crowd = crowd_probs
            .iter()
            .zip(&outcomes)
            .map(|(p, y)| stats::safe_log_loss(*p, *y, epsilon))
            .sum::<f64>()
            / n;

        let brier_improvement = if brier_market > 0.0 {
            Some(1.0 - brier_crowd / brier_market)
        } else {
            None
        };

        let edge_buckets = EdgeBucket::partition(&evaluations, &self.params.edge_bucket_boundaries);
        let calibration_market = CalibrationBin::table(&market_probs, &outcomes);
        let calibration_crowd = CalibrationBin::table(&crowd_probs, &outcomes);

        let mut top = evaluations.clone();
        top.sort_by(|a, b| {
            b.divergence
                .abs()
                .partial_cmp(&a.divergence.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        top.truncate(TOP_CASES);

        BacktestReport {
            run_id,
            cutoff_hours,
            total_markets: evaluations.len() as u64,
            brier_market,
            brier_crowd,
            log_loss_market,
            log_loss_crowd,
            brier_improvement,
            edge_buckets,
            calibration_market,
            calibration_crowd,
            top_divergence_cases: top,
            evaluations,
        }
    }
}
