//! Order status axes and their transition tables.

use core::fmt;

use serde::{Deserialize, Serialize};

use fleetstock_core::{DomainError, OrderAxis};

/// Shipping progress of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingStatus {
    Pending,
    Shipped,
    Completed,
    Cancelled,
}

/// Payment progress of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Refunded,
}

/// Status of a single order line; follows the order's shipping axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Pending,
    Shipped,
    Fulfilled,
    Cancelled,
}

const SHIPPING_TRANSITIONS: &[(ShippingStatus, ShippingStatus)] = &[
    (ShippingStatus::Pending, ShippingStatus::Shipped),
    (ShippingStatus::Shipped, ShippingStatus::Completed),
    (ShippingStatus::Pending, ShippingStatus::Cancelled),
    (ShippingStatus::Shipped, ShippingStatus::Cancelled),
];

const PAYMENT_TRANSITIONS: &[(PaymentStatus, PaymentStatus)] = &[
    (PaymentStatus::Pending, PaymentStatus::Partial),
    (PaymentStatus::Pending, PaymentStatus::Paid),
    (PaymentStatus::Partial, PaymentStatus::Paid),
    (PaymentStatus::Partial, PaymentStatus::Refunded),
    (PaymentStatus::Paid, PaymentStatus::Refunded),
];

/// One state axis of an order, backed by a static transition table.
pub trait StatusAxis: Copy + Eq + fmt::Display + 'static {
    const AXIS: OrderAxis;

    fn transitions() -> &'static [(Self, Self)];

    fn can_transition_to(self, to: Self) -> bool {
        Self::transitions().contains(&(self, to))
    }

    fn transition_to(self, to: Self) -> Result<Self, DomainError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(DomainError::invalid_order_transition(Self::AXIS, self, to))
        }
    }
}

impl StatusAxis for ShippingStatus {
    const AXIS: OrderAxis = OrderAxis::Shipping;

    fn transitions() -> &'static [(Self, Self)] {
        SHIPPING_TRANSITIONS
    }
}

impl StatusAxis for PaymentStatus {
    const AXIS: OrderAxis = OrderAxis::Payment;

    fn transitions() -> &'static [(Self, Self)] {
        PAYMENT_TRANSITIONS
    }
}

impl ShippingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingStatus::Pending => "pending",
            ShippingStatus::Shipped => "shipped",
            ShippingStatus::Completed => "completed",
            ShippingStatus::Cancelled => "cancelled",
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Whether the order can still take money.
    pub fn accepts_payments(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Partial)
    }
}

impl fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
