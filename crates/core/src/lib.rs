//! Core types for the crowdcast analytics engine.
//!
//! This crate defines the canonical records that flow through the pipeline
//! (markets, trades, outcomes, wallet metrics, trust weights, snapshots),
//! the bucketing scheme used to key per-wallet statistics, the tunable
//! engine parameters, application configuration, the error taxonomy, and a
//! handful of shared statistical helpers.

pub mod bucket;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod params;
pub mod records;
pub mod stats;

pub use bucket::{BucketKey, CategoryBucket, Horizon, HorizonBucket, ALL_BUCKET};
pub use config::{AppConfig, DatabaseConfig, RunnerConfig};
pub use config_loader::ConfigLoader;
pub use error::{EngineError, RecordError, RunCounters};
pub use params::{EngineParams, HorizonThresholds};
pub use records::{
    Action, CohortSummary, Driver, FlowSummary, LiquidityRole, Market, Outcome, ResolvedOutcome,
    Side, Snapshot, Trade, WalletMetric, WalletWeight,
};
