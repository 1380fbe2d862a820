//! Sales orders domain module (event-sourced).
//!
//! Orders carry two independent state machines, shipping and payment, each
//! with a central transition table, plus an append-only payment ledger and
//! status history. Pure domain logic (no IO, no storage).

pub mod order;
pub mod status;

pub use order::{
    AddPayment, CancelOrder, CompleteOrder, CreateOrder, Order, OrderCancelled, OrderCommand,
    OrderCompleted, OrderCreated, OrderEvent, OrderItem, OrderLineInput, OrderRefunded,
    OrderShipped, PaymentAdded, PaymentRecord, RefundOrder, RestockLine, ShipOrder, StatusChange,
};
pub use status::{LineStatus, PaymentStatus, ShippingStatus, StatusAxis};
