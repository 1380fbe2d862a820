//! Inventory domain module.
//!
//! Per-(store, variant) stock levels, the append-only transaction history they
//! produce, and the read-only allocation planner that advises how to cover a
//! shortage from the rest of the store fleet. Pure domain logic: no IO, no
//! storage.

pub mod history;
pub mod planner;
pub mod stock;
pub mod store;

pub use history::{HistoryFilter, HistoryScope, InventoryHistory, InventoryTransaction};
pub use planner::{
    AllocationPlanner, AvailabilityReport, MixedSolution, PurchaseSuggestion, RequestedLine,
    ShortageSuggestion, StockView, TransferOption,
};
pub use stock::{
    AdjustStock, StockCommand, StockEvent, StockKey, StockLevel, StockMovementReason, StockAdjusted,
};
pub use store::Store;
