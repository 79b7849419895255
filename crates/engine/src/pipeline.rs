//! Pipeline orchestration: one run over a frozen working set.
//!
//! Three explicit phases — the working set is assembled by the caller
//! (phase 1), wallet metrics and trust weights are derived (phase 2), and
//! a snapshot is produced per market (phase 3). Each phase is a pure
//! function of its predecessor's output; nothing here touches a store.
//! Markets fail independently: an invariant violation in one snapshot is
//! counted and the sweep continues.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crowdcast_core::{EngineParams, RunCounters, Snapshot, WalletMetric, WalletWeight};

use crate::aggregate::{SnapshotBuilder, WeightTable};
use crate::features::compute_wallet_metrics;
use crate::weights::compute_wallet_weights;
use crate::working_set::WorkingSet;

/// Options of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Snapshot instant, shared by every market in the run.
    pub at: DateTime<Utc>,
    /// Restrict the snapshot sweep to unresolved markets.
    pub unresolved_only: bool,
    /// Additional evenly spaced historical snapshot instants per market,
    /// between the market's first trade and `at`.
    pub backfill_points: usize,
}

impl PipelineOptions {
    /// A run snapshotting every market at `at`, with no backfill.
    #[must_use]
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at,
            unresolved_only: false,
            backfill_points: 0,
        }
    }

    /// Restricts the sweep to unresolved markets.
    #[must_use]
    pub fn unresolved_only(mut self, value: bool) -> Self {
        self.unresolved_only = value;
        self
    }

    /// Sets the number of backfill instants per market.
    #[must_use]
    pub fn with_backfill(mut self, points: usize) -> Self {
        self.backfill_points = points;
        self
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub metrics: Vec<WalletMetric>,
    pub weights: Vec<WalletWeight>,
    pub snapshots: Vec<Snapshot>,
    /// Markets skipped by the per-market wallet budget.
    pub skipped_markets: Vec<String>,
    pub counters: RunCounters,
}

/// Executes the F → W → snapshot phases over an assembled working set.
///
/// `counters` carries the assembly-phase counts forward so the outcome
/// reports the whole run. Snapshot instants are emitted in ascending order
/// per market (backfill instants first, then `at`).
#[must_use]
pub fn run_pipeline(
    ws: &WorkingSet,
    params: &EngineParams,
    options: &PipelineOptions,
    counters: RunCounters,
) -> PipelineOutcome {
    let mut counters = counters;

    let metrics = compute_wallet_metrics(ws, params);
    let weights = compute_wallet_weights(&metrics, params);
    let table = WeightTable::from_rows(&weights);
    info!(
        metric_rows = metrics.len(),
        weight_rows = weights.len(),
        "derived wallet metrics and trust weights"
    );

    let builder = SnapshotBuilder::new(ws, &table, params);
    let mut snapshots = Vec::new();
    let mut skipped_markets = Vec::new();

    for market in ws.markets() {
        if options.unresolved_only && ws.outcome(&market.id).is_some() {
            continue;
        }

        if let Some(budget) = params.max_wallets_per_market {
            let wallet_count = ws.wallets_in(&market.id, options.at, None).len();
            if wallet_count > budget {
                warn!(
                    market_id = %market.id,
                    wallet_count,
                    budget,
                    "market exceeds wallet budget, skipping"
                );
                counters.skipped_markets += 1;
                skipped_markets.push(market.id.clone());
                continue;
            }
        }

        for instant in snapshot_instants(ws, &market.id, options) {
            match builder.build(&market.id, instant, &mut counters) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    warn!(market_id = %market.id, error = %err, "market snapshot failed");
                    counters.failed_markets += 1;
                    break;
                }
            }
        }
    }

    info!(
        snapshots = snapshots.len(),
        skipped = skipped_markets.len(),
        degenerate = counters.degenerate_markets,
        "pipeline run complete"
    );

    PipelineOutcome {
        metrics,
        weights,
        snapshots,
        skipped_markets,
        counters,
    }
}

/// The ascending snapshot instants for one market: optional backfill
/// points strictly between the first trade and `at`, then `at` itself.
fn snapshot_instants(ws: &WorkingSet, market_id: &str, options: &PipelineOptions) -> Vec<DateTime<Utc>> {
    let mut instants = Vec::with_capacity(options.backfill_points + 1);
    if options.backfill_points > 0 {
        if let Some(first) = ws.earliest_trade(market_id) {
            let span = options.at - first;
            if span > Duration::zero() {
                let steps = (options.backfill_points + 1) as i32;
                for i in 1..=options.backfill_points as i32 {
                    instants.push(first + span * i / steps);
                }
            }
        }
    }
    instants.push(options.at);
    instants
}
