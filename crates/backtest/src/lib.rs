//! Historical backtest of the crowd-wisdom aggregator.
//!
//! Replays the snapshot computation a configurable number of hours before
//! each market's resolution and scores the crowd probability against both
//! the realized outcome and the market's own price. This is how the
//! system is tuned and judged: a crowd that does not beat the market's
//! Brier score is not worth publishing.

pub mod driver;
pub mod report;

pub use driver::BacktestDriver;
pub use report::{
    BacktestReport, CalibrationBin, EdgeBucket, MarketEvaluation, SweepPoint, SweepReport,
};
