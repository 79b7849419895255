//! Crowdcast runners.
//!
//! Offline commands around the analytics core: the pipeline run
//! (features → weights → snapshots), backtests and sweeps, schema
//! initialization, and a screener dump. Mutating commands take the
//! exclusive run lock and are bracketed by a pipeline-run record carrying
//! the counter report.

mod lock;

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crowdcast_backtest::BacktestDriver;
use crowdcast_core::{AppConfig, ConfigLoader, RunCounters};
use crowdcast_data::{PgStore, PipelineRunStatus, Store};
use crowdcast_engine::{
    run_pipeline, PipelineOptions, WeightTable, WorkingSet,
};

use lock::RunLock;

#[derive(Parser)]
#[command(name = "crowdcast")]
#[command(about = "Crowd-wisdom analytics over prediction-market trade flow", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml", global = true)]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Run the full pipeline: features, weights, and a snapshot per market
    Pipeline {
        /// Snapshot instant in RFC 3339 (default: now)
        #[arg(long)]
        at: Option<String>,
        /// Additional evenly spaced historical snapshots per market
        #[arg(long, default_value_t = 0)]
        backfill: usize,
        /// Snapshot only markets without a committed resolution
        #[arg(long, default_value_t = false)]
        unresolved_only: bool,
    },
    /// Score the crowd against the market at one cutoff before resolution
    Backtest {
        /// Hours before resolution (default: from config)
        #[arg(long)]
        cutoff_hours: Option<f64>,
        /// Restrict to specific market ids
        #[arg(long)]
        market: Vec<String>,
    },
    /// Backtest at every cutoff from 1 hour up to the maximum
    Sweep {
        /// Largest cutoff in hours (default: from config)
        #[arg(long)]
        max_hours: Option<u32>,
    },
    /// Print the latest snapshots ordered by absolute divergence
    Screener {
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;

    match cli.command {
        Commands::InitDb => init_db(&config).await,
        Commands::Pipeline {
            at,
            backfill,
            unresolved_only,
        } => run_pipeline_command(&config, at.as_deref(), backfill, unresolved_only).await,
        Commands::Backtest {
            cutoff_hours,
            market,
        } => run_backtest_command(&config, cutoff_hours, &market).await,
        Commands::Sweep { max_hours } => run_sweep_command(&config, max_hours).await,
        Commands::Screener {
            limit,
            min_confidence,
        } => run_screener_command(&config, limit, min_confidence).await,
    }
}

async fn connect(config: &AppConfig) -> Result<PgStore> {
    PgStore::connect(&config.database.url, config.database.max_connections).await
}

async fn init_db(config: &AppConfig) -> Result<()> {
    let store = connect(config).await?;
    store.init_schema().await?;
    println!("schema ready");
    Ok(())
}

/// Loads the consistent working set one pipeline run computes over.
async fn load_working_set(store: &dyn Store) -> Result<(WorkingSet, RunCounters)> {
    let markets = store.list_markets().await?;
    let mut trades = Vec::new();
    for market in &markets {
        trades.extend(store.list_trades(&market.id, None, None).await?);
    }
    let outcomes = store.list_outcomes().await?;

    let mut counters = RunCounters::default();
    let ws = WorkingSet::assemble(markets, trades, outcomes, &mut counters);
    tracing::info!(
        markets = ws.markets().count(),
        trades = ws.trade_count(),
        filtered = counters.filtered_records(),
        "working set assembled"
    );
    Ok((ws, counters))
}

fn parse_instant(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(Utc::now()),
        Some(value) => Ok(DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("parsing instant {value}"))?
            .with_timezone(&Utc)),
    }
}

async fn run_pipeline_command(
    config: &AppConfig,
    at: Option<&str>,
    backfill: usize,
    unresolved_only: bool,
) -> Result<()> {
    let _lock = RunLock::acquire(Path::new(&config.runner.lock_path))?;
    let store = connect(config).await?;
    let run_id = store.pipeline_run_begin("pipeline").await?;

    let result = async {
        let (ws, counters) = load_working_set(&store).await?;
        let options = PipelineOptions::at(parse_instant(at)?)
            .unresolved_only(unresolved_only)
            .with_backfill(backfill);
        let outcome = run_pipeline(&ws, &config.engine, &options, counters);

        store.upsert_wallet_metrics(&outcome.metrics).await?;
        store.upsert_wallet_weights(&outcome.weights).await?;
        for snapshot in &outcome.snapshots {
            store.append_snapshot(snapshot).await?;
        }
        Ok::<_, anyhow::Error>(outcome)
    }
    .await;

    match result {
        Ok(outcome) => {
            store
                .pipeline_run_end(run_id, PipelineRunStatus::Succeeded, &outcome.counters)
                .await?;
            println!(
                "run {run_id}: {} metric rows, {} weight rows, {} snapshots ({} degenerate, {} skipped, {} failed)",
                outcome.metrics.len(),
                outcome.weights.len(),
                outcome.snapshots.len(),
                outcome.counters.degenerate_markets,
                outcome.counters.skipped_markets,
                outcome.counters.failed_markets,
            );
            if !outcome.skipped_markets.is_empty() {
                println!("skipped markets: {}", outcome.skipped_markets.join(", "));
            }
            Ok(())
        }
        Err(err) => {
            store
                .pipeline_run_end(run_id, PipelineRunStatus::Failed, &RunCounters::default())
                .await
                .ok();
            Err(err)
        }
    }
}

async fn run_backtest_command(
    config: &AppConfig,
    cutoff_hours: Option<f64>,
    markets: &[String],
) -> Result<()> {
    let cutoff = cutoff_hours.unwrap_or(config.engine.backtest_cutoff_hours);
    let _lock = RunLock::acquire(Path::new(&config.runner.lock_path))?;
    let store = connect(config).await?;
    let run_id = store.pipeline_run_begin("backtest").await?;

    let result = async {
        let (ws, mut counters) = load_working_set(&store).await?;
        let metrics = crowdcast_engine::compute_wallet_metrics(&ws, &config.engine);
        let weights = crowdcast_engine::compute_wallet_weights(&metrics, &config.engine);
        let table = WeightTable::from_rows(&weights);
        let driver = BacktestDriver::new(&ws, &table, &config.engine);

        let selection: Option<BTreeSet<String>> = if markets.is_empty() {
            None
        } else {
            Some(markets.iter().cloned().collect())
        };
        let report = driver.run(cutoff, selection.as_ref(), run_id, &mut counters);
        store.insert_backtest_report(&report).await?;
        Ok::<_, anyhow::Error>((report, counters))
    }
    .await;

    match result {
        Ok((report, counters)) => {
            store
                .pipeline_run_end(run_id, PipelineRunStatus::Succeeded, &counters)
                .await?;
            println!(
                "backtest {run_id} @ {cutoff}h: {} markets, brier market {:.4} vs crowd {:.4}",
                report.total_markets, report.brier_market, report.brier_crowd,
            );
            match report.brier_improvement {
                Some(improvement) => println!("brier improvement: {:.2}%", improvement * 100.0),
                None => println!("brier improvement: undefined (market brier is 0)"),
            }
            for bucket in &report.edge_buckets {
                println!(
                    "  |divergence| {:>6}: n={:<4} edge={:.4} pnl={:+.4} win={:.0}%",
                    bucket.label,
                    bucket.count,
                    bucket.mean_edge,
                    bucket.mean_pnl,
                    bucket.win_rate * 100.0,
                );
            }
            Ok(())
        }
        Err(err) => {
            store
                .pipeline_run_end(run_id, PipelineRunStatus::Failed, &RunCounters::default())
                .await
                .ok();
            Err(err)
        }
    }
}

async fn run_sweep_command(config: &AppConfig, max_hours: Option<u32>) -> Result<()> {
    let max_hours = max_hours.unwrap_or(config.engine.backtest_max_hours);
    let _lock = RunLock::acquire(Path::new(&config.runner.lock_path))?;
    let store = connect(config).await?;
    let run_id = store.pipeline_run_begin("sweep").await?;

    let result = async {
        let (ws, mut counters) = load_working_set(&store).await?;
        let metrics = crowdcast_engine::compute_wallet_metrics(&ws, &config.engine);
        let weights = crowdcast_engine::compute_wallet_weights(&metrics, &config.engine);
        let table = WeightTable::from_rows(&weights);
        let driver = BacktestDriver::new(&ws, &table, &config.engine);

        let sweep = driver.sweep(max_hours, run_id, &mut counters);
        for report in &sweep.reports {
            store.insert_backtest_report(report).await?;
        }
        Ok::<_, anyhow::Error>((sweep, counters))
    }
    .await;

    match result {
        Ok((sweep, counters)) => {
            store
                .pipeline_run_end(run_id, PipelineRunStatus::Succeeded, &counters)
                .await?;
            println!("sweep {run_id}: {} cutoffs evaluated", sweep.curve.len());
            for point in &sweep.curve {
                let improvement = point
                    .brier_improvement
                    .map_or("n/a".to_string(), |v| format!("{:+.2}%", v * 100.0));
                println!(
                    "  {:>3}h: markets={:<4} market={:.4} crowd={:.4} improvement={improvement}",
                    point.cutoff_hours, point.total_markets, point.brier_market, point.brier_crowd,
                );
            }
            Ok(())
        }
        Err(err) => {
            store
                .pipeline_run_end(run_id, PipelineRunStatus::Failed, &RunCounters::default())
                .await
                .ok();
            Err(err)
        }
    }
}

async fn run_screener_command(config: &AppConfig, limit: usize, min_confidence: f64) -> Result<()> {
    let store = connect(config).await?;
    let snapshots = store.latest_snapshots(limit, min_confidence).await?;
    if snapshots.is_empty() {
        println!("no snapshots (run the pipeline first)");
        return Ok(());
    }
    for snapshot in snapshots {
        println!(
            "{:<24} {} crowd={:.3} market={:.3} div={:+.3} conf={:.2} wallets={}{}",
            snapshot.market_id,
            snapshot.at.format("%Y-%m-%d %H:%M"),
            snapshot.crowd_prob,
            snapshot.market_prob,
            snapshot.divergence,
            snapshot.confidence,
            snapshot.active_wallets,
            if snapshot.degenerate { " [degenerate]" } else { "" },
        );
    }
    Ok(())
}
