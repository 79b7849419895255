//! The abstract store contract consumed by the analytics core.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crowdcast_backtest::BacktestReport;
use crowdcast_core::{
    Horizon, Market, Outcome, RunCounters, Snapshot, Trade, WalletMetric, WalletWeight,
};

/// Terminal status of a pipeline run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineRunStatus {
    Succeeded,
    Failed,
}

impl PipelineRunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Queries and writes the core depends on.
///
/// Trades and outcomes are owned by ingestion; metric, weight, snapshot,
/// and report tables are owned by the core and may be dropped and rebuilt
/// from the input tables at any time. The core assumes at most one writer
/// of its own tables at a time — enforced by the runner lock, not here.
#[async_trait]
pub trait Store: Send + Sync {
    /// All known markets.
    async fn list_markets(&self) -> Result<Vec<Market>>;

    /// A market's trades, chronological, inclusive of both endpoints.
    async fn list_trades(
        &self,
        market_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>>;

    /// A wallet's trades on resolved markets, joined with the outcome,
    /// optionally restricted to a category and/or horizon class.
    async fn list_resolved_trades_for_wallet(
        &self,
        wallet: &str,
        category: Option<&str>,
        horizon: Option<Horizon>,
    ) -> Result<Vec<(Trade, Outcome)>>;

    /// A market's committed resolution, if any.
    async fn get_outcome(&self, market_id: &str) -> Result<Option<Outcome>>;

    /// Every committed resolution.
    async fn list_outcomes(&self) -> Result<Vec<Outcome>>;

    /// Replaces the wallet-metric table with this run's rows.
    async fn upsert_wallet_metrics(&self, rows: &[WalletMetric]) -> Result<()>;

    /// Replaces the wallet-weight table with this run's rows.
    async fn upsert_wallet_weights(&self, rows: &[WalletWeight]) -> Result<()>;

    /// Appends one snapshot row; identity is (market, instant).
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Stores one backtest report keyed by (run, cutoff).
    async fn insert_backtest_report(&self, report: &BacktestReport) -> Result<()>;

    /// Opens a pipeline run record and returns its id.
    async fn pipeline_run_begin(&self, kind: &str) -> Result<Uuid>;

    /// Closes a pipeline run record with its status and counter report.
    async fn pipeline_run_end(
        &self,
        run_id: Uuid,
        status: PipelineRunStatus,
        counters: &RunCounters,
    ) -> Result<()>;

    /// Latest snapshot per market with at least `min_confidence`, ordered
    /// by absolute divergence descending — the screener feed.
    async fn latest_snapshots(&self, limit: usize, min_confidence: f64) -> Result<Vec<Snapshot>>;
}
