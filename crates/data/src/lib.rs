//! Store contract and adapters.
//!
//! The analytics core depends on the abstract [`Store`] trait, never on a
//! storage technology. Two implementations ship here: [`PgStore`] backed
//! by a PostgreSQL pool, and [`MemoryStore`] for tests and dry runs.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{PipelineRunStatus, Store};
