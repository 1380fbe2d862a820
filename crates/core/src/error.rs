//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{StoreId, VariantId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// The two independent status axes of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAxis {
    Shipping,
    Payment,
}

impl core::fmt::Display for OrderAxis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OrderAxis::Shipping => f.write_str("shipping"),
            OrderAxis::Payment => f.write_str("payment"),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere. None of
/// these are retried by the core: retrying a money transition could apply it
/// twice.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A ledger mutation would drive a stock level below zero.
    #[error(
        "insufficient stock for variant {variant_id} at store {store_id} (available: {available}, requested: {requested})"
    )]
    InsufficientStock {
        store_id: StoreId,
        variant_id: VariantId,
        available: i64,
        requested: i64,
    },

    /// A payment exceeds the order's remaining balance (minor units).
    #[error("payment of {amount} exceeds remaining balance of {remaining}")]
    OverpaymentRejected { amount: i64, remaining: i64 },

    /// A transfer status change is not in the transfer state graph.
    #[error("invalid transfer transition from {from} to {to}")]
    InvalidTransferTransition { from: String, to: String },

    /// An order status change is not in the state graph of its axis.
    #[error("invalid {axis} transition from {from} to {to}")]
    InvalidOrderTransition {
        axis: OrderAxis,
        from: String,
        to: String,
    },

    /// A delete would leave dangling references behind.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A conflict occurred (duplicate key, stale version).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn foreign_key(msg: impl Into<String>) -> Self {
        Self::ForeignKeyViolation(msg.into())
    }

    pub fn invalid_transfer_transition(
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransferTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_order_transition(
        axis: OrderAxis,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidOrderTransition {
            axis,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable code for the caller layer.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => "validation_error",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::OverpaymentRejected { .. } => "overpayment_rejected",
            DomainError::InvalidTransferTransition { .. } => "invalid_transfer_transition",
            DomainError::InvalidOrderTransition { .. } => "invalid_order_transition",
            DomainError::ForeignKeyViolation(_) => "foreign_key_violation",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
        }
    }

    /// HTTP status the caller layer should answer with.
    ///
    /// Business-rule and validation failures are 422, missing resources 404,
    /// duplicate keys and stale versions 409.
    pub fn http_status(&self) -> u16 {
        match self {
            DomainError::NotFound(_) => 404,
            DomainError::Conflict(_) => 409,
            _ => 422,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_business_failures_to_unprocessable() {
        let err = DomainError::OverpaymentRejected {
            amount: 40_000,
            remaining: 30_000,
        };
        assert_eq!(err.http_status(), 422);
        assert_eq!(err.code(), "overpayment_rejected");
        assert_eq!(DomainError::not_found("order").http_status(), 404);
        assert_eq!(DomainError::conflict("sku").http_status(), 409);
    }

    #[test]
    fn transition_errors_render_both_states() {
        let err = DomainError::invalid_order_transition(OrderAxis::Shipping, "cancelled", "shipped");
        assert_eq!(
            err.to_string(),
            "invalid shipping transition from cancelled to shipped"
        );
    }
}
