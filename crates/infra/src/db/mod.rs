//! Database adapters.
//!
//! The in-memory database backs the engine; the Postgres adapter (feature
//! `postgres`) implements the ledger and cost-aggregate writes with row locks.

pub mod in_memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::{InMemoryDatabase, Tables, Transaction};
