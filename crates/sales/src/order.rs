use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{
    Aggregate, AggregateRoot, CustomerId, DomainError, Money, OrderAxis, OrderId, StoreId, UserId,
    VariantId,
};
use fleetstock_events::Event;

use crate::status::{LineStatus, PaymentStatus, ShippingStatus, StatusAxis};

/// Order line as requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Unit price.
    pub price: Money,
    /// Sold from the order store's stock (debited at creation).
    #[serde(default)]
    pub is_stocked_sale: bool,
    /// Sold ahead of stock; never touches inventory.
    #[serde(default)]
    pub is_backorder: bool,
}

/// Committed order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub line_no: u32,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub price: Money,
    pub is_stocked_sale: bool,
    pub is_backorder: bool,
    pub status: LineStatus,
}

impl OrderItem {
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.price.checked_mul(self.quantity)
    }
}

/// Stock to hand back to the order store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockLine {
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// Append-only payment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub amount: Money,
    pub method: String,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Append-only status history row, one per transition on either axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status_type: OrderAxis,
    pub from_status: String,
    pub to_status: String,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: Order.
///
/// Two independent state machines (shipping, payment) plus the payment ledger.
/// `paid_amount` always equals the sum of the payment records and never
/// exceeds `grand_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    store_id: StoreId,
    customer_id: Option<CustomerId>,
    created_by: Option<UserId>,
    shipping_status: ShippingStatus,
    payment_status: PaymentStatus,
    items: Vec<OrderItem>,
    subtotal: Money,
    shipping_fee: Money,
    tax: Money,
    discount: Money,
    grand_total: Money,
    paid_amount: Money,
    paid_at: Option<DateTime<Utc>>,
    payments: Vec<PaymentRecord>,
    history: Vec<StatusChange>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            store_id: StoreId::default(),
            customer_id: None,
            created_by: None,
            shipping_status: ShippingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            items: Vec::new(),
            subtotal: Money::ZERO,
            shipping_fee: Money::ZERO,
            tax: Money::ZERO,
            discount: Money::ZERO,
            grand_total: Money::ZERO,
            paid_amount: Money::ZERO,
            paid_at: None,
            payments: Vec::new(),
            history: Vec::new(),
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn shipping_status(&self) -> ShippingStatus {
        self.shipping_status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn shipping_fee(&self) -> Money {
        self.shipping_fee
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn grand_total(&self) -> Money {
        self.grand_total
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn remaining_balance(&self) -> Money {
        Money::from_minor(self.grand_total.minor() - self.paid_amount.minor())
    }

    /// Stocked-sale quantities currently held by this order.
    pub fn stocked_lines(&self) -> Vec<RestockLine> {
        self.items
            .iter()
            .filter(|item| item.is_stocked_sale && item.status != LineStatus::Cancelled)
            .map(|item| RestockLine {
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect()
    }

    /// Quantities to restock on cancellation or deletion: only an order that
    /// never left the store gives its goods back.
    pub fn returnable_lines(&self) -> Vec<RestockLine> {
        if self.shipping_status == ShippingStatus::Pending {
            self.stocked_lines()
        } else {
            Vec::new()
        }
    }

    fn set_line_status(&mut self, status: LineStatus) {
        for item in &mut self.items {
            if item.status != LineStatus::Cancelled {
                item.status = status;
            }
        }
    }

    fn record_transition(
        &mut self,
        status_type: OrderAxis,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
        notes: Option<String>,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) {
        self.history.push(StatusChange {
            status_type,
            from_status: from.to_string(),
            to_status: to.to_string(),
            notes,
            actor,
            occurred_at,
        });
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub items: Vec<OrderLineInput>,
    pub shipping_fee: Money,
    pub tax: Money,
    pub discount: Money,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub order_id: OrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: OrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddPayment {
    pub order_id: OrderId,
    pub amount: Money,
    pub method: String,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RefundOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    ShipOrder(ShipOrder),
    CompleteOrder(CompleteOrder),
    CancelOrder(CancelOrder),
    AddPayment(AddPayment),
    RefundOrder(RefundOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub tax: Money,
    pub discount: Money,
    pub grand_total: Money,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub order_id: OrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub previous_status: ShippingStatus,
    pub reason: String,
    /// Stocked-sale quantities returned to the order store.
    pub restock: Vec<RestockLine>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAdded {
    pub order_id: OrderId,
    pub payment: PaymentRecord,
    pub previous_status: PaymentStatus,
    pub status: PaymentStatus,
    /// Paid amount after this payment.
    pub paid_amount: Money,
    pub paid_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRefunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRefunded {
    pub order_id: OrderId,
    pub previous_status: PaymentStatus,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderShipped(OrderShipped),
    OrderCompleted(OrderCompleted),
    OrderCancelled(OrderCancelled),
    PaymentAdded(PaymentAdded),
    OrderRefunded(OrderRefunded),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "sales.order.created",
            OrderEvent::OrderShipped(_) => "sales.order.shipped",
            OrderEvent::OrderCompleted(_) => "sales.order.completed",
            OrderEvent::OrderCancelled(_) => "sales.order.cancelled",
            OrderEvent::PaymentAdded(_) => "sales.order.payment_added",
            OrderEvent::OrderRefunded(_) => "sales.order.refunded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderShipped(e) => e.occurred_at,
            OrderEvent::OrderCompleted(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::PaymentAdded(e) => e.occurred_at,
            OrderEvent::OrderRefunded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.store_id = e.store_id;
                self.customer_id = e.customer_id;
                self.created_by = Some(e.actor);
                self.shipping_status = ShippingStatus::Pending;
                self.payment_status = PaymentStatus::Pending;
                self.items = e.items.clone();
                self.subtotal = e.subtotal;
                self.shipping_fee = e.shipping_fee;
                self.tax = e.tax;
                self.discount = e.discount;
                self.grand_total = e.grand_total;
                self.paid_amount = Money::ZERO;
                self.created_at = Some(e.occurred_at);
                self.created = true;
                // Nothing to collect: the order is settled on creation.
                if e.grand_total.is_zero() {
                    self.payment_status = PaymentStatus::Paid;
                    self.paid_at = Some(e.occurred_at);
                    self.record_transition(
                        OrderAxis::Payment,
                        PaymentStatus::Pending,
                        PaymentStatus::Paid,
                        Some("zero total".to_string()),
                        e.actor,
                        e.occurred_at,
                    );
                }
            }
            OrderEvent::OrderShipped(e) => {
                let from = self.shipping_status;
                self.shipping_status = ShippingStatus::Shipped;
                self.set_line_status(LineStatus::Shipped);
                self.record_transition(
                    OrderAxis::Shipping,
                    from,
                    ShippingStatus::Shipped,
                    None,
                    e.actor,
                    e.occurred_at,
                );
            }
            OrderEvent::OrderCompleted(e) => {
                let from = self.shipping_status;
                self.shipping_status = ShippingStatus::Completed;
                self.set_line_status(LineStatus::Fulfilled);
                self.record_transition(
                    OrderAxis::Shipping,
                    from,
                    ShippingStatus::Completed,
                    None,
                    e.actor,
                    e.occurred_at,
                );
            }
            OrderEvent::OrderCancelled(e) => {
                self.shipping_status = ShippingStatus::Cancelled;
                for item in &mut self.items {
                    item.status = LineStatus::Cancelled;
                }
                self.record_transition(
                    OrderAxis::Shipping,
                    e.previous_status,
                    ShippingStatus::Cancelled,
                    Some(e.reason.clone()),
                    e.actor,
                    e.occurred_at,
                );
            }
            OrderEvent::PaymentAdded(e) => {
                self.payments.push(e.payment.clone());
                self.paid_amount = e.paid_amount;
                self.payment_status = e.status;
                if e.paid_at.is_some() {
                    self.paid_at = e.paid_at;
                }
                if e.previous_status != e.status {
                    self.record_transition(
                        OrderAxis::Payment,
                        e.previous_status,
                        e.status,
                        e.payment.notes.clone(),
                        e.payment.created_by,
                        e.occurred_at,
                    );
                }
            }
            OrderEvent::OrderRefunded(e) => {
                self.payment_status = PaymentStatus::Refunded;
                self.record_transition(
                    OrderAxis::Payment,
                    e.previous_status,
                    PaymentStatus::Refunded,
                    Some(e.reason.clone()),
                    e.actor,
                    e.occurred_at,
                );
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::ShipOrder(cmd) => self.handle_ship(cmd),
            OrderCommand::CompleteOrder(cmd) => self.handle_complete(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::AddPayment(cmd) => self.handle_add_payment(cmd),
            OrderCommand::RefundOrder(cmd) => self.handle_refund(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("order"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must have at least one item"));
        }
        for (name, amount) in [
            ("shipping_fee", cmd.shipping_fee),
            ("tax", cmd.tax),
            ("discount", cmd.discount),
        ] {
            if amount.is_negative() {
                return Err(DomainError::validation(format!("{name} cannot be negative")));
            }
        }

        let mut items = Vec::with_capacity(cmd.items.len());
        let mut subtotal = Money::ZERO;
        for (idx, line) in cmd.items.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for variant {} must be positive",
                    line.variant_id
                )));
            }
            if line.price.is_negative() {
                return Err(DomainError::validation(format!(
                    "price for variant {} cannot be negative",
                    line.variant_id
                )));
            }
            if line.is_stocked_sale && line.is_backorder {
                return Err(DomainError::validation(format!(
                    "line for variant {} cannot be both a stocked sale and a backorder",
                    line.variant_id
                )));
            }

            let item = OrderItem {
                line_no: idx as u32 + 1,
                variant_id: line.variant_id,
                quantity: line.quantity,
                price: line.price,
                is_stocked_sale: line.is_stocked_sale,
                is_backorder: line.is_backorder,
                status: LineStatus::Pending,
            };
            subtotal = subtotal.checked_add(item.line_total()?)?;
            items.push(item);
        }

        let grand_total = subtotal
            .checked_add(cmd.shipping_fee)?
            .checked_add(cmd.tax)?
            .checked_sub(cmd.discount)?;
        if grand_total.is_negative() {
            return Err(DomainError::validation("discount exceeds order total"));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            store_id: cmd.store_id,
            customer_id: cmd.customer_id,
            items,
            subtotal,
            shipping_fee: cmd.shipping_fee,
            tax: cmd.tax,
            discount: cmd.discount,
            grand_total,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.shipping_status.transition_to(ShippingStatus::Shipped)?;

        Ok(vec![OrderEvent::OrderShipped(OrderShipped {
            order_id: self.id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.shipping_status
            .transition_to(ShippingStatus::Completed)?;

        Ok(vec![OrderEvent::OrderCompleted(OrderCompleted {
            order_id: self.id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.shipping_status
            .transition_to(ShippingStatus::Cancelled)?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: self.id,
            store_id: self.store_id,
            previous_status: self.shipping_status,
            reason: reason.to_string(),
            restock: self.returnable_lines(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_payment(&self, cmd: &AddPayment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if !self.payment_status.accepts_payments() {
            return Err(DomainError::invariant(format!(
                "order is already {} and accepts no payments",
                self.payment_status
            )));
        }
        let method = cmd.method.trim();
        if method.is_empty() {
            return Err(DomainError::validation("payment method cannot be empty"));
        }

        let remaining = self.remaining_balance();
        if cmd.amount > remaining {
            return Err(DomainError::OverpaymentRejected {
                amount: cmd.amount.minor(),
                remaining: remaining.minor(),
            });
        }

        let paid_amount = self.paid_amount.checked_add(cmd.amount)?;
        let status = if paid_amount == self.grand_total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };
        if status != self.payment_status {
            self.payment_status.transition_to(status)?;
        }

        Ok(vec![OrderEvent::PaymentAdded(PaymentAdded {
            order_id: self.id,
            payment: PaymentRecord {
                amount: cmd.amount,
                method: method.to_string(),
                notes: cmd.notes.clone(),
                created_by: cmd.actor,
                created_at: cmd.occurred_at,
            },
            previous_status: self.payment_status,
            status,
            paid_amount,
            paid_at: (status == PaymentStatus::Paid).then_some(cmd.occurred_at),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund(&self, cmd: &RefundOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.payment_status.transition_to(PaymentStatus::Refunded)?;

        Ok(vec![OrderEvent::OrderRefunded(OrderRefunded {
            order_id: self.id,
            previous_status: self.payment_status,
            reason: cmd.reason.trim().to_string(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
