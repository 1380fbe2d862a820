//! `fleetstock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error taxonomy, minor-unit money with proration, and
//! the aggregate/entity traits the bounded-context crates build on.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, OrderAxis};
pub use id::{CustomerId, OrderId, PurchaseId, StoreId, TransferId, UserId, VariantId};
pub use money::{Money, div_round_half_up, prorate};
pub use value_object::ValueObject;
