//! Crowd-wisdom computation engines.
//!
//! Four pure components connected by the pipeline:
//!
//! 1. The **feature engine** turns resolved trade observations into
//!    per-wallet skill and style metrics, bucketed by category and
//!    time-horizon.
//! 2. The **weight engine** converts each metric row into a bounded,
//!    support-aware trust weight via shrinkage toward the wallet's global
//!    prior.
//! 3. The **belief engine** derives a (belief, confidence) pair from one
//!    wallet's trade sequence on one market.
//! 4. The **aggregator** combines trust-weighted beliefs into a crowd
//!    probability with divergence, confidence, disagreement,
//!    participation, and integrity diagnostics.
//!
//! Everything operates on an in-memory [`WorkingSet`] assembled once per
//! run; no component performs I/O.

pub mod aggregate;
pub mod beliefs;
pub mod features;
pub mod observation;
pub mod pipeline;
pub mod weights;
pub mod working_set;

pub use aggregate::{SnapshotBuilder, WeightTable};
pub use beliefs::{infer_belief, WalletBelief};
pub use features::compute_wallet_metrics;
pub use observation::Observation;
pub use pipeline::{run_pipeline, PipelineOptions, PipelineOutcome};
pub use weights::compute_wallet_weights;
pub use working_set::WorkingSet;
