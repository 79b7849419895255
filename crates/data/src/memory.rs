//! In-memory store for tests and dry runs.
//!
//! Mirrors the PostgreSQL adapter's semantics — chronological trade
//! listings, rebuild-from-scratch metric tables, append-only snapshots —
//! behind plain maps, so the whole pipeline can be exercised without a
//! database.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crowdcast_backtest::BacktestReport;
use crowdcast_core::{
    Horizon, Market, Outcome, RunCounters, Snapshot, Trade, WalletMetric, WalletWeight,
};

use crate::store::{PipelineRunStatus, Store};

#[derive(Debug, Clone)]
struct RunRecord {
    kind: String,
    status: Option<PipelineRunStatus>,
    counters: Option<RunCounters>,
}

#[derive(Debug, Default)]
struct Inner {
    markets: BTreeMap<String, Market>,
    trades: Vec<Trade>,
    outcomes: BTreeMap<String, Outcome>,
    metrics: Vec<WalletMetric>,
    weights: Vec<WalletWeight>,
    snapshots: Vec<Snapshot>,
    reports: Vec<BacktestReport>,
    runs: BTreeMap<Uuid, RunRecord>,
}

/// A [`Store`] held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds ingestion-owned tables (markets, trades, outcomes).
    pub fn seed(&self, markets: Vec<Market>, trades: Vec<Trade>, outcomes: Vec<Outcome>) {
        let mut inner = self.inner.write();
        for market in markets {
            inner.markets.insert(market.id.clone(), market);
        }
        inner.trades.extend(trades);
        for outcome in outcomes {
            inner.outcomes.insert(outcome.market_id.clone(), outcome);
        }
    }

    /// Rows currently in the metric table.
    #[must_use]
    pub fn metric_rows(&self) -> Vec<WalletMetric> {
        self.inner.read().metrics.clone()
    }

    /// Rows currently in the weight table.
    #[must_use]
    pub fn weight_rows(&self) -> Vec<WalletWeight> {
        self.inner.read().weights.clone()
    }

    /// All appended snapshots, in insertion order.
    #[must_use]
    pub fn snapshot_rows(&self) -> Vec<Snapshot> {
        self.inner.read().snapshots.clone()
    }

    /// All stored backtest reports.
    #[must_use]
    pub fn report_rows(&self) -> Vec<BacktestReport> {
        self.inner.read().reports.clone()
    }

    /// Counter report of a finished run, if the run exists and ended.
    #[must_use]
    pub fn run_counters(&self, run_id: Uuid) -> Option<RunCounters> {
        self.inner.read().runs.get(&run_id).and_then(|r| r.counters)
    }

    /// Kind and status of a run record.
    #[must_use]
    pub fn run_state(&self, run_id: Uuid) -> Option<(String, Option<PipelineRunStatus>)> {
        self.inner
            .read()
            .runs
            .get(&run_id)
            .map(|r| (r.kind.clone(), r.status))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_markets(&self) -> Result<Vec<Market>> {
        Ok(self.inner.read().markets.values().cloned().collect())
    }

    async fn list_trades(
        &self,
        market_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>> {
        let inner = self.inner.read();
        let mut rows: Vec<Trade> = inner
            .trades
            .iter()
            .filter(|t| {
                t.market_id == market_id
                    && from.map_or(true, |f| t.ts >= f)
                    && to.map_or(true, |u| t.ts <= u)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.external_id.cmp(&b.external_id)));
        Ok(rows)
    }

    async fn list_resolved_trades_for_wallet(
        &self,
        wallet: &str,
        category: Option<&str>,
        horizon: Option<Horizon>,
    ) -> Result<Vec<(Trade, Outcome)>> {
        let inner = self.inner.read();
        let mut rows = Vec::new();
        for trade in inner.trades.iter().filter(|t| t.wallet == wallet) {
            let Some(outcome) = inner.outcomes.get(&trade.market_id) else {
                continue;
            };
            if let Some(cat) = category {
                let market_cat = inner
                    .markets
                    .get(&trade.market_id)
                    .map(|m| m.category_bucket());
                if market_cat.map_or(true, |c| c.as_str() != cat) {
                    continue;
                }
            }
            if let Some(hz) = horizon {
                let gap = outcome.resolution_time - trade.ts;
                let thresholds = crowdcast_core::HorizonThresholds::default();
                if Horizon::from_gap(gap, &thresholds) != hz {
                    continue;
                }
            }
            rows.push((trade.clone(), outcome.clone()));
        }
        rows.sort_by(|a, b| a.0.ts.cmp(&b.0.ts).then_with(|| a.0.external_id.cmp(&b.0.external_id)));
        Ok(rows)
    }

    async fn get_outcome(&self, market_id: &str) -> Result<Option<Outcome>> {
        Ok(self.inner.read().outcomes.get(market_id).cloned())
    }

    async fn list_outcomes(&self) -> Result<Vec<Outcome>> {
        Ok(self.inner.read().outcomes.values().cloned().collect())
    }

    async fn upsert_wallet_metrics(&self, rows: &[WalletMetric]) -> Result<()> {
        self.inner.write().metrics = rows.to_vec();
        Ok(())
    }

    async fn upsert_wallet_weights(&self, rows: &[WalletWeight]) -> Result<()> {
        self.inner.write().weights = rows.to_vec();
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.inner.write().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn insert_backtest_report(&self, report: &BacktestReport) -> Result<()> {
        self.inner.write().reports.push(report.clone());
        Ok(())
    }

    async fn pipeline_run_begin(&self, kind: &str) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        self.inner.write().runs.insert(
            run_id,
            RunRecord {
                kind: kind.to_string(),
                status: None,
                counters: None,
            },
        );
        Ok(run_id)
    }

    async fn pipeline_run_end(
        &self,
        run_id: Uuid,
        status: PipelineRunStatus,
        counters: &RunCounters,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let record = inner
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| anyhow::anyhow!("unknown pipeline run: {run_id}"))?;
        record.status = Some(status);
        record.counters = Some(*counters);
        Ok(())
    }

    async fn latest_snapshots(&self, limit: usize, min_confidence: f64) -> Result<Vec<Snapshot>> {
        let inner = self.inner.read();
        let mut latest: BTreeMap<&str, &Snapshot> = BTreeMap::new();
        for snapshot in &inner.snapshots {
            match latest.get(snapshot.market_id.as_str()) {
                Some(existing) if existing.at >= snapshot.at => {}
                _ => {
                    latest.insert(snapshot.market_id.as_str(), snapshot);
                }
            }
        }
        let mut rows: Vec<Snapshot> = latest
            .into_values()
            .filter(|s| s.confidence >= min_confidence)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.divergence
                .abs()
                .partial_cmp(&a.divergence.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crowdcast_core::{Action, ResolvedOutcome, Side};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn trade(id: &str, market: &str, wallet: &str, at: DateTime<Utc>) -> Trade {
        Trade::try_new(id, market, wallet, at, Side::Yes, Action::Buy, dec!(0.5), dec!(1)).unwrap()
    }

    fn snapshot(market: &str, at: DateTime<Utc>, divergence: f64, confidence: f64) -> Snapshot {
        Snapshot {
            market_id: market.to_string(),
            at,
            market_prob: 0.5,
            crowd_prob: 0.5 + divergence,
            divergence,
            confidence,
            disagreement: 0.0,
            participation_quality: 0.5,
            integrity_risk: 0.0,
            active_wallets: 3,
            degenerate: false,
            drivers: Vec::new(),
            flow: crowdcast_core::FlowSummary {
                net_yes_size: 0.0,
                trade_count: 0,
                window_hours: 6,
            },
            cohorts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn list_trades_is_chronological_and_windowed() {
        let store = MemoryStore::new();
        store.seed(
            vec![Market::new("m-1", "q", t0() + chrono::Duration::days(1), "crypto")],
            vec![
                trade("t-2", "m-1", "w-1", t0() + chrono::Duration::hours(2)),
                trade("t-1", "m-1", "w-1", t0()),
                trade("t-3", "m-1", "w-1", t0() + chrono::Duration::hours(4)),
            ],
            vec![],
        );

        let all = store.list_trades("m-1", None, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].external_id, "t-1");

        let windowed = store
            .list_trades("m-1", Some(t0()), Some(t0() + chrono::Duration::hours(2)))
            .await
            .unwrap();
        assert_eq!(windowed.len(), 2);
    }

    #[tokio::test]
    async fn resolved_trades_join_outcomes_and_filter() {
        let store = MemoryStore::new();
        let resolution = t0() + chrono::Duration::hours(10);
        store.seed(
            vec![
                Market::new("m-res", "q", resolution, "crypto"),
                Market::new("m-open", "q", resolution, "crypto"),
            ],
            vec![
                trade("t-1", "m-res", "w-1", t0()),
                trade("t-2", "m-open", "w-1", t0()),
            ],
            vec![Outcome::new("m-res", ResolvedOutcome::Yes, resolution)],
        );

        let rows = store
            .list_resolved_trades_for_wallet("w-1", None, None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.market_id, "m-res");

        let filtered = store
            .list_resolved_trades_for_wallet("w-1", Some("politics"), None)
            .await
            .unwrap();
        assert!(filtered.is_empty());

        let short = store
            .list_resolved_trades_for_wallet("w-1", Some("crypto"), Some(Horizon::Short))
            .await
            .unwrap();
        assert_eq!(short.len(), 1);
    }

    #[tokio::test]
    async fn metric_tables_are_rebuilt_not_appended() {
        let store = MemoryStore::new();
        let row = WalletMetric {
            wallet: "w-1".to_string(),
            bucket: crowdcast_core::BucketKey::global(),
            sample_size: 1,
            brier: 0.2,
            log_loss: 0.5,
            calibration_error: 0.1,
            roi_proxy: 0.0,
            avg_size: 1.0,
            churn: 0.0,
            persistence: 1.0,
            specialization: 1.0,
            timing_edge: 0.0,
        };

        store.upsert_wallet_metrics(&[row.clone(), row.clone()]).await.unwrap();
        assert_eq!(store.metric_rows().len(), 2);
        store.upsert_wallet_metrics(&[row]).await.unwrap();
        assert_eq!(store.metric_rows().len(), 1);
    }

    #[tokio::test]
    async fn snapshots_append() {
        let store = MemoryStore::new();
        store.append_snapshot(&snapshot("m-1", t0(), 0.1, 0.5)).await.unwrap();
        store
            .append_snapshot(&snapshot("m-1", t0() + chrono::Duration::hours(1), 0.2, 0.5))
            .await
            .unwrap();

        assert_eq!(store.snapshot_rows().len(), 2);
    }

    #[tokio::test]
    async fn screener_returns_latest_per_market_by_divergence() {
        let store = MemoryStore::new();
        store.append_snapshot(&snapshot("m-1", t0(), 0.30, 0.5)).await.unwrap();
        store
            .append_snapshot(&snapshot("m-1", t0() + chrono::Duration::hours(1), 0.05, 0.5))
            .await
            .unwrap();
        store.append_snapshot(&snapshot("m-2", t0(), -0.20, 0.5)).await.unwrap();
        store.append_snapshot(&snapshot("m-3", t0(), 0.10, 0.01)).await.unwrap();

        let rows = store.latest_snapshots(10, 0.1).await.unwrap();

        // m-1 contributes its latest (0.05), m-3 is filtered by confidence
        let ids: Vec<&str> = rows.iter().map(|s| s.market_id.as_str()).collect();
        assert_eq!(ids, vec!["m-2", "m-1"]);
    }

    #[tokio::test]
    async fn run_records_close_with_counters() {
        let store = MemoryStore::new();
        let run_id = store.pipeline_run_begin("pipeline").await.unwrap();
        assert!(store.run_counters(run_id).is_none());

        let counters = RunCounters {
            malformed_records: 3,
            ..RunCounters::default()
        };
        store
            .pipeline_run_end(run_id, PipelineRunStatus::Succeeded, &counters)
            .await
            .unwrap();

        assert_eq!(store.run_counters(run_id).unwrap().malformed_records, 3);
        let (kind, status) = store.run_state(run_id).unwrap();
        assert_eq!(kind, "pipeline");
        assert_eq!(status, Some(PipelineRunStatus::Succeeded));
    }
}
