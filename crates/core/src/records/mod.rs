//! Canonical records flowing through the pipeline.

pub mod market;
pub mod metric;
pub mod outcome;
pub mod snapshot;
pub mod trade;

pub use market::Market;
pub use metric::{WalletMetric, WalletWeight};
pub use outcome::{Outcome, ResolvedOutcome};
pub use snapshot::{CohortSummary, Driver, FlowSummary, Snapshot};
pub use trade::{Action, LiquidityRole, Side, Trade};
