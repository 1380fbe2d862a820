//! Purchasing domain module.
//!
//! Supplier purchases and landed-cost allocation: shipping is prorated across
//! purchase lines by quantity, and each line's landed cost feeds the variant's
//! weighted average cost when the purchase is received. Pure domain logic (no
//! IO, no storage).

pub mod cost;
pub mod purchase;

pub use cost::{CostAllocator, PurchaseLine};
pub use purchase::{
    CreatePurchase, Purchase, PurchaseCommand, PurchaseCreated, PurchaseEvent, PurchaseItem,
    PurchaseReceived, PurchaseStatus, ReceivePurchase,
};
