//! PostgreSQL store adapter.
//!
//! A thin sqlx layer around the pure core. Metric and weight tables are
//! rebuilt transactionally per run (delete + insert inside one
//! transaction, so readers never observe a half-built table); snapshots
//! and backtest reports are append-only.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crowdcast_backtest::BacktestReport;
use crowdcast_core::{
    Action, CategoryBucket, Horizon, LiquidityRole, Market, Outcome, ResolvedOutcome, RunCounters,
    Side, Snapshot, Trade, WalletMetric, WalletWeight,
};

use crate::store::{PipelineRunStatus, Store};

/// A [`Store`] backed by a PostgreSQL pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects to the database.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates every table the adapter uses.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS markets (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                end_time TIMESTAMPTZ NOT NULL,
                liquidity NUMERIC,
                resolution_source TEXT
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS trades (
                external_id TEXT PRIMARY KEY,
                market_id TEXT NOT NULL REFERENCES markets(id),
                wallet TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                side TEXT NOT NULL,
                action TEXT NOT NULL,
                price NUMERIC NOT NULL,
                size NUMERIC NOT NULL,
                aggressiveness DOUBLE PRECISION,
                role TEXT,
                raw JSONB
            )
            ",
            r"CREATE INDEX IF NOT EXISTS idx_trades_market_ts ON trades (market_id, ts)",
            r"CREATE INDEX IF NOT EXISTS idx_trades_wallet ON trades (wallet)",
            r"
            CREATE TABLE IF NOT EXISTS outcomes (
                market_id TEXT PRIMARY KEY REFERENCES markets(id),
                resolved_outcome SMALLINT NOT NULL,
                resolution_time TIMESTAMPTZ NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS wallet_metrics (
                wallet TEXT NOT NULL,
                category TEXT NOT NULL,
                horizon TEXT NOT NULL,
                sample_size BIGINT NOT NULL,
                brier DOUBLE PRECISION NOT NULL,
                log_loss DOUBLE PRECISION NOT NULL,
                calibration_error DOUBLE PRECISION NOT NULL,
                roi_proxy DOUBLE PRECISION NOT NULL,
                avg_size DOUBLE PRECISION NOT NULL,
                churn DOUBLE PRECISION NOT NULL,
                persistence DOUBLE PRECISION NOT NULL,
                specialization DOUBLE PRECISION NOT NULL,
                timing_edge DOUBLE PRECISION NOT NULL,
                PRIMARY KEY (wallet, category, horizon)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS wallet_weights (
                wallet TEXT NOT NULL,
                category TEXT NOT NULL,
                horizon TEXT NOT NULL,
                weight DOUBLE PRECISION NOT NULL,
                uncertainty DOUBLE PRECISION NOT NULL,
                raw_edge DOUBLE PRECISION NOT NULL,
                shrunk_edge DOUBLE PRECISION NOT NULL,
                support BIGINT NOT NULL,
                PRIMARY KEY (wallet, category, horizon)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS snapshots (
                market_id TEXT NOT NULL REFERENCES markets(id),
                snapshot_time TIMESTAMPTZ NOT NULL,
                market_prob DOUBLE PRECISION NOT NULL,
                crowd_prob DOUBLE PRECISION NOT NULL,
                divergence DOUBLE PRECISION NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                disagreement DOUBLE PRECISION NOT NULL,
                participation_quality DOUBLE PRECISION NOT NULL,
                integrity_risk DOUBLE PRECISION NOT NULL,
                active_wallets BIGINT NOT NULL,
                degenerate BOOLEAN NOT NULL,
                drivers JSONB NOT NULL,
                flow JSONB NOT NULL,
                cohorts JSONB NOT NULL,
                PRIMARY KEY (market_id, snapshot_time)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS backtest_reports (
                run_id UUID NOT NULL,
                cutoff_hours DOUBLE PRECISION NOT NULL,
                generated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                report JSONB NOT NULL,
                PRIMARY KEY (run_id, cutoff_hours)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                run_id UUID PRIMARY KEY,
                kind TEXT NOT NULL,
                started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                finished_at TIMESTAMPTZ,
                status TEXT,
                counters JSONB
            )
            ",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("schema initialized");
        Ok(())
    }
}

/// Database-shaped trade row.
#[derive(sqlx::FromRow)]
struct TradeRow {
    external_id: String,
    market_id: String,
    wallet: String,
    ts: DateTime<Utc>,
    side: String,
    action: String,
    price: Decimal,
    size: Decimal,
    aggressiveness: Option<f64>,
    role: Option<String>,
    raw: Option<serde_json::Value>,
}

impl TryFrom<TradeRow> for Trade {
    type Error = anyhow::Error;

    fn try_from(row: TradeRow) -> Result<Self> {
        let side = Side::parse(&row.side)
            .ok_or_else(|| anyhow!("trade {}: unknown side {}", row.external_id, row.side))?;
        let action = Action::parse(&row.action)
            .ok_or_else(|| anyhow!("trade {}: unknown action {}", row.external_id, row.action))?;
        let role = match row.role.as_deref() {
            None => None,
            Some(value) => Some(
                LiquidityRole::parse(value)
                    .ok_or_else(|| anyhow!("trade {}: unknown role {value}", row.external_id))?,
            ),
        };
        // Out-of-range numeric fields pass through here; the working-set
        // assembly filters and counts them so the run report reflects the
        // bad data instead of the load aborting.
        Ok(Trade {
            external_id: row.external_id,
            market_id: row.market_id,
            wallet: row.wallet,
            ts: row.ts,
            side,
            action,
            price: row.price,
            size: row.size,
            aggressiveness: row.aggressiveness,
            role,
            raw: row.raw,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MarketRow {
    id: String,
    question: String,
    category: String,
    end_time: DateTime<Utc>,
    liquidity: Option<Decimal>,
    resolution_source: Option<String>,
}

impl From<MarketRow> for Market {
    fn from(row: MarketRow) -> Self {
        Market {
            id: row.id,
            question: row.question,
            category: row.category,
            end_time: row.end_time,
            liquidity: row.liquidity,
            resolution_source: row.resolution_source,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OutcomeRow {
    market_id: String,
    resolved_outcome: i16,
    resolution_time: DateTime<Utc>,
}

impl TryFrom<OutcomeRow> for Outcome {
    type Error = anyhow::Error;

    fn try_from(row: OutcomeRow) -> Result<Self> {
        let resolved = ResolvedOutcome::from_indicator(row.resolved_outcome).ok_or_else(|| {
            anyhow!(
                "outcome for {}: indicator {} is not 0/1",
                row.market_id,
                row.resolved_outcome
            )
        })?;
        Ok(Outcome {
            market_id: row.market_id,
            resolved,
            resolution_time: row.resolution_time,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_markets(&self) -> Result<Vec<Market>> {
        let rows = sqlx::query_as::<_, MarketRow>(
            r"
            SELECT id, question, category, end_time, liquidity, resolution_source
            FROM markets
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Market::from).collect())
    }

    async fn list_trades(
        &self,
        market_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r"
            SELECT external_id, market_id, wallet, ts, side, action, price, size,
                   aggressiveness, role, raw
            FROM trades
            WHERE market_id = $1
              AND ($2::timestamptz IS NULL OR ts >= $2)
              AND ($3::timestamptz IS NULL OR ts <= $3)
            ORDER BY ts, external_id
            ",
        )
        .bind(market_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Trade::try_from).collect()
    }

    async fn list_resolved_trades_for_wallet(
        &self,
        wallet: &str,
        category: Option<&str>,
        horizon: Option<Horizon>,
    ) -> Result<Vec<(Trade, Outcome)>> {
        let rows = sqlx::query(
            r"
            SELECT t.external_id, t.market_id, t.wallet, t.ts, t.side, t.action,
                   t.price, t.size, t.aggressiveness, t.role, t.raw,
                   o.resolved_outcome, o.resolution_time,
                   m.category
            FROM trades t
            JOIN outcomes o ON o.market_id = t.market_id
            JOIN markets m ON m.id = t.market_id
            WHERE t.wallet = $1
            ORDER BY t.ts, t.external_id
            ",
        )
        .bind(wallet)
        .fetch_all(&self.pool)
        .await?;

        let thresholds = crowdcast_core::HorizonThresholds::default();
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let market_category: String = row.try_get("category")?;
            if let Some(cat) = category {
                if CategoryBucket::from_market_category(&market_category).as_str() != cat {
                    continue;
                }
            }

            let trade_row = TradeRow {
                external_id: row.try_get("external_id")?,
                market_id: row.try_get("market_id")?,
                wallet: row.try_get("wallet")?,
                ts: row.try_get("ts")?,
                side: row.try_get("side")?,
                action: row.try_get("action")?,
                price: row.try_get("price")?,
                size: row.try_get("size")?,
                aggressiveness: row.try_get("aggressiveness")?,
                role: row.try_get("role")?,
                raw: row.try_get("raw")?,
            };
            let outcome_row = OutcomeRow {
                market_id: trade_row.market_id.clone(),
                resolved_outcome: row.try_get("resolved_outcome")?,
                resolution_time: row.try_get("resolution_time")?,
            };
            let trade = Trade::try_from(trade_row)?;
            let outcome = Outcome::try_from(outcome_row)?;

            if let Some(hz) = horizon {
                let gap = outcome.resolution_time - trade.ts;
                if Horizon::from_gap(gap, &thresholds) != hz {
                    continue;
                }
            }
            pairs.push((trade, outcome));
        }
        Ok(pairs)
    }

    async fn get_outcome(&self, market_id: &str) -> Result<Option<Outcome>> {
        let row = sqlx::query_as::<_, OutcomeRow>(
            r"
            SELECT market_id, resolved_outcome, resolution_time
            FROM outcomes
            WHERE market_id = $1
            ",
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Outcome::try_from).transpose()
    }

    async fn list_outcomes(&self) -> Result<Vec<Outcome>> {
        let rows = sqlx::query_as::<_, OutcomeRow>(
            r"
            SELECT market_id, resolved_outcome, resolution_time
            FROM outcomes
            ORDER BY market_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Outcome::try_from).collect()
    }

    async fn upsert_wallet_metrics(&self, rows: &[WalletMetric]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM wallet_metrics").execute(&mut *tx).await?;
        for row in rows {
            sqlx::query(
                r"
                INSERT INTO wallet_metrics (
                    wallet, category, horizon, sample_size, brier, log_loss,
                    calibration_error, roi_proxy, avg_size, churn, persistence,
                    specialization, timing_edge
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ",
            )
            .bind(&row.wallet)
            .bind(row.bucket.category.as_str())
            .bind(row.bucket.horizon.as_str())
            .bind(row.sample_size as i64)
            .bind(row.brier)
            .bind(row.log_loss)
            .bind(row.calibration_error)
            .bind(row.roi_proxy)
            .bind(row.avg_size)
            .bind(row.churn)
            .bind(row.persistence)
            .bind(row.specialization)
            .bind(row.timing_edge)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_wallet_weights(&self, rows: &[WalletWeight]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM wallet_weights").execute(&mut *tx).await?;
        for row in rows {
            sqlx::query(
                r"
                INSERT INTO wallet_weights (
                    wallet, category, horizon, weight, uncertainty,
                    raw_edge, shrunk_edge, support
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(&row.wallet)
            .bind(row.bucket.category.as_str())
            .bind(row.bucket.horizon.as_str())
            .bind(row.weight)
            .bind(row.uncertainty)
            .bind(row.raw_edge)
            .bind(row.shrunk_edge)
            .bind(row.support as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO snapshots (
                market_id, snapshot_time, market_prob, crowd_prob, divergence,
                confidence, disagreement, participation_quality, integrity_risk,
                active_wallets, degenerate, drivers, flow, cohorts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (market_id, snapshot_time) DO NOTHING
            ",
        )
        .bind(&snapshot.market_id)
        .bind(snapshot.at)
        .bind(snapshot.market_prob)
        .bind(snapshot.crowd_prob)
        .bind(snapshot.divergence)
        .bind(snapshot.confidence)
        .bind(snapshot.disagreement)
        .bind(snapshot.participation_quality)
        .bind(snapshot.integrity_risk)
        .bind(snapshot.active_wallets as i64)
        .bind(snapshot.degenerate)
        .bind(serde_json::to_value(&snapshot.drivers)?)
        .bind(serde_json::to_value(snapshot.flow)?)
        .bind(serde_json::to_value(&snapshot.cohorts)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_backtest_report(&self, report: &BacktestReport) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO backtest_reports (run_id, cutoff_hours, report)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, cutoff_hours) DO UPDATE
            SET report = EXCLUDED.report,
                generated_at = now()
            ",
        )
        .bind(report.run_id)
        .bind(report.cutoff_hours)
        .bind(serde_json::to_value(report)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pipeline_run_begin(&self, kind: &str) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        sqlx::query(
            r"
            INSERT INTO pipeline_runs (run_id, kind)
            VALUES ($1, $2)
            ",
        )
        .bind(run_id)
        .bind(kind)
        .execute(&self.pool)
        .await?;
        Ok(run_id)
    }

    async fn pipeline_run_end(
        &self,
        run_id: Uuid,
        status: PipelineRunStatus,
        counters: &RunCounters,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE pipeline_runs
            SET finished_at = now(), status = $2, counters = $3
            WHERE run_id = $1
            ",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(serde_json::to_value(counters)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_snapshots(&self, limit: usize, min_confidence: f64) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            r"
            WITH latest AS (
                SELECT market_id, MAX(snapshot_time) AS snapshot_time
                FROM snapshots
                GROUP BY market_id
            )
            SELECT s.market_id, s.snapshot_time, s.market_prob, s.crowd_prob,
                   s.divergence, s.confidence, s.disagreement,
                   s.participation_quality, s.integrity_risk, s.active_wallets,
                   s.degenerate, s.drivers, s.flow, s.cohorts
            FROM snapshots s
            JOIN latest l
              ON l.market_id = s.market_id
             AND l.snapshot_time = s.snapshot_time
            WHERE s.confidence >= $1
            ORDER BY ABS(s.divergence) DESC, s.market_id
            LIMIT $2
            ",
        )
        .bind(min_confidence)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let active_wallets: i64 = row.try_get("active_wallets")?;
            snapshots.push(Snapshot {
                market_id: row.try_get("market_id")?,
                at: row.try_get("snapshot_time")?,
                market_prob: row.try_get("market_prob")?,
                crowd_prob: row.try_get("crowd_prob")?,
                divergence: row.try_get("divergence")?,
                confidence: row.try_get("confidence")?,
                disagreement: row.try_get("disagreement")?,
                participation_quality: row.try_get("participation_quality")?,
                integrity_risk: row.try_get("integrity_risk")?,
                active_wallets: active_wallets as u64,
                degenerate: row.try_get("degenerate")?,
                drivers: serde_json::from_value(row.try_get("drivers")?)?,
                flow: serde_json::from_value(row.try_get("flow")?)?,
                cohorts: serde_json::from_value(row.try_get("cohorts")?)?,
            });
        }
        Ok(snapshots)
    }
}
