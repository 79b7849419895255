//! Error taxonomy and run counters.
//!
//! Record-level faults are filtered with a counter increment and never
//! abort a run; market-level faults fail only that market; run-level faults
//! (store unavailable, lock contention) surface as `anyhow::Error` at the
//! application edge and discard the run.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed input record. Always filtered, never raised past the
/// working-set assembly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("trade {external_id} on market {market_id}: price {price} outside [0, 1]")]
    PriceOutOfRange {
        external_id: String,
        market_id: String,
        price: Decimal,
    },
    #[error("trade {external_id} on market {market_id}: non-positive size {size}")]
    NonPositiveSize {
        external_id: String,
        market_id: String,
        size: Decimal,
    },
    #[error("trade {external_id} on market {market_id}: aggressiveness {value} outside [0, 1]")]
    AggressivenessOutOfRange {
        external_id: String,
        market_id: String,
        value: f64,
    },
    #[error("trade on market {market_id}: empty {field}")]
    EmptyField {
        market_id: String,
        field: &'static str,
    },
}

/// A fault scoped to a single market snapshot. Other markets proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("market {market_id} not present in the working set")]
    UnknownMarket { market_id: String },
    #[error("invariant violation for market {market_id}: {detail}")]
    InvariantViolation { market_id: String, detail: String },
}

/// Counters accumulated over a pipeline or backtest run.
///
/// Nothing is dropped silently: every filtered record, missed weight
/// lookup, degenerate snapshot, failed market, and budget skip shows up
/// here, and the full struct is attached to the run record at
/// `pipeline_run_end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Trades or outcomes rejected by record validation.
    pub malformed_records: u64,
    /// Trades dropped by the exactly-once guard on external id.
    pub duplicate_trades: u64,
    /// Weight lookups that fell through the full fallback chain.
    pub missing_weight_lookups: u64,
    /// Snapshots emitted with the degenerate flag (no trusted participants).
    pub degenerate_markets: u64,
    /// Markets whose snapshot failed an invariant check.
    pub failed_markets: u64,
    /// Markets skipped by the per-market wallet budget.
    pub skipped_markets: u64,
    /// Backtest evaluations skipped for insufficient pre-cutoff history.
    pub ineligible_markets: u64,
}

impl RunCounters {
    /// Folds another counter set into this one.
    pub fn merge(&mut self, other: &Self) {
        self.malformed_records += other.malformed_records;
        self.duplicate_trades += other.duplicate_trades;
        self.missing_weight_lookups += other.missing_weight_lookups;
        self.degenerate_markets += other.degenerate_markets;
        self.failed_markets += other.failed_markets;
        self.skipped_markets += other.skipped_markets;
        self.ineligible_markets += other.ineligible_markets;
    }

    /// Total records filtered before compute.
    #[must_use]
    pub fn filtered_records(&self) -> u64 {
        self.malformed_records + self.duplicate_trades
    }

    /// True when the run saw no anomalies at all.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}
