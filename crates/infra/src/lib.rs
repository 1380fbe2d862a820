//! Infrastructure layer: transactional storage, the event journal, the
//! service-layer engine and configuration.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod journal;

pub use config::{ConfigError, EngineConfig};
pub use engine::InventoryEngine;
pub use error::{EngineError, EngineResult};

#[cfg(test)]
mod integration_tests;
