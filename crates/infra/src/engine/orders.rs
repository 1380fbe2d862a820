use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use fleetstock_core::{CustomerId, Money, OrderId, StoreId, UserId};
use fleetstock_inventory::{AdjustStock, StockMovementReason};
use fleetstock_sales::{
    AddPayment, CancelOrder, CompleteOrder, CreateOrder, Order, OrderCommand, OrderEvent,
    OrderLineInput, RefundOrder, RestockLine, ShipOrder,
};

use super::transfers::detach_transfers_in_tx;
use super::{InventoryEngine, ORDER_AGGREGATE, adjust_stock, execute, metadata};
use crate::db::Transaction;
use crate::error::EngineResult;

/// Order placement request; money fields are minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub store_id: StoreId,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    pub items: Vec<OrderLineInput>,
    #[serde(default)]
    pub shipping_fee: Money,
    #[serde(default)]
    pub tax: Money,
    #[serde(default)]
    pub discount: Money,
}

impl InventoryEngine {
    /// Place an order; stocked-sale lines are taken from the order store.
    #[instrument(
        skip(self, request),
        fields(store_id = %request.store_id, lines = request.items.len(), actor = %actor),
        err
    )]
    pub fn create_order(&self, request: &CreateOrderRequest, actor: UserId) -> EngineResult<Order> {
        let order = self
            .db
            .transaction(|tx| {
                tx.tables().store(request.store_id)?;
                for line in &request.items {
                    tx.tables().variant(line.variant_id)?;
                }

                let order_id = OrderId::new();
                let mut order = Order::empty(order_id);
                let now = Utc::now();
                execute(
                    tx,
                    &mut order,
                    ORDER_AGGREGATE,
                    *order_id.as_uuid(),
                    &OrderCommand::CreateOrder(CreateOrder {
                        order_id,
                        store_id: request.store_id,
                        customer_id: request.customer_id,
                        items: request.items.clone(),
                        shipping_fee: request.shipping_fee,
                        tax: request.tax,
                        discount: request.discount,
                        actor,
                        occurred_at: now,
                    }),
                )?;

                let sold: Vec<RestockLine> = order
                    .stocked_lines()
                    .into_iter()
                    .map(|line| RestockLine {
                        quantity: -line.quantity,
                        ..line
                    })
                    .collect();
                move_order_stock(tx, &order, &sold, StockMovementReason::OrderSale, actor)?;

                tx.put_order(order_id, order.clone());
                Ok(order)
            })
            .inspect_err(|e| warn!(error = %e, "order rejected"))?;

        info!(
            order_id = %order.id_typed(),
            grand_total = order.grand_total().minor(),
            "order created"
        );
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id, actor = %actor), err)]
    pub fn ship_order(&self, order_id: OrderId, actor: UserId) -> EngineResult<Order> {
        let order = self
            .db
            .transaction(|tx| {
                run_order_command(
                    tx,
                    order_id,
                    OrderCommand::ShipOrder(ShipOrder {
                        order_id,
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )
            })
            .inspect_err(|e| warn!(error = %e, "order shipment rejected"))?;

        info!("order shipped");
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %order_id, actor = %actor), err)]
    pub fn complete_order(&self, order_id: OrderId, actor: UserId) -> EngineResult<Order> {
        let order = self
            .db
            .transaction(|tx| {
                run_order_command(
                    tx,
                    order_id,
                    OrderCommand::CompleteOrder(CompleteOrder {
                        order_id,
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )
            })
            .inspect_err(|e| warn!(error = %e, "order completion rejected"))?;

        info!("order completed");
        Ok(order)
    }

    /// Cancel an order and cascade to its transfers.
    ///
    /// Stocked lines go back to the store only while the order is unshipped.
    #[instrument(skip(self, reason), fields(order_id = %order_id, actor = %actor), err)]
    pub fn cancel_order(&self, order_id: OrderId, reason: &str, actor: UserId) -> EngineResult<Order> {
        let (order, detached) = self
            .db
            .transaction(|tx| {
                let order = run_order_command(
                    tx,
                    order_id,
                    OrderCommand::CancelOrder(CancelOrder {
                        order_id,
                        reason: reason.to_string(),
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )?;
                let detached = detach_transfers_in_tx(tx, order_id, "cancelled", actor)?;
                Ok((order, detached.len()))
            })
            .inspect_err(|e| warn!(error = %e, "order cancellation rejected"))?;

        info!(detached_transfers = detached, "order cancelled");
        Ok(order)
    }

    /// Delete an order after detaching its transfers.
    ///
    /// A still-pending order returns its stocked lines to the store. Deletion
    /// is refused while any transfer still references the order.
    #[instrument(skip(self), fields(order_id = %order_id, actor = %actor), err)]
    pub fn delete_order(&self, order_id: OrderId, actor: UserId) -> EngineResult<()> {
        let detached = self
            .db
            .transaction(|tx| {
                let order = tx.tables().order(order_id)?.clone();
                let detached = detach_transfers_in_tx(tx, order_id, "deleted", actor)?;

                move_order_stock(
                    tx,
                    &order,
                    &order.returnable_lines(),
                    StockMovementReason::OrderDeleted,
                    actor,
                )?;

                tx.remove_order(order_id)?;
                Ok(detached.len())
            })
            .inspect_err(|e| warn!(error = %e, "order deletion rejected"))?;

        info!(detached_transfers = detached, "order deleted");
        Ok(())
    }

    /// Record a payment; `amount` is in major units.
    #[instrument(
        skip(self, method, notes),
        fields(order_id = %order_id, amount = %amount, actor = %actor),
        err
    )]
    pub fn add_payment(
        &self,
        order_id: OrderId,
        amount: Decimal,
        method: &str,
        notes: Option<String>,
        actor: UserId,
    ) -> EngineResult<Order> {
        let amount = Money::from_major(amount)?;
        let order = self
            .db
            .transaction(|tx| {
                run_order_command(
                    tx,
                    order_id,
                    OrderCommand::AddPayment(AddPayment {
                        order_id,
                        amount,
                        method: method.to_string(),
                        notes,
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )
            })
            .inspect_err(|e| warn!(error = %e, "payment rejected"))?;

        info!(
            payment_status = %order.payment_status(),
            paid_amount = order.paid_amount().minor(),
            remaining = order.remaining_balance().minor(),
            "payment recorded"
        );
        Ok(order)
    }

    #[instrument(skip(self, reason), fields(order_id = %order_id, actor = %actor), err)]
    pub fn refund_order(&self, order_id: OrderId, reason: &str, actor: UserId) -> EngineResult<Order> {
        let order = self
            .db
            .transaction(|tx| {
                run_order_command(
                    tx,
                    order_id,
                    OrderCommand::RefundOrder(RefundOrder {
                        order_id,
                        reason: reason.to_string(),
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )
            })
            .inspect_err(|e| warn!(error = %e, "refund rejected"))?;

        info!(paid_amount = order.paid_amount().minor(), "order refunded");
        Ok(order)
    }

    pub fn order(&self, order_id: OrderId) -> EngineResult<Order> {
        Ok(self.db.read(|t| t.order(order_id).cloned())??)
    }
}

/// Execute an order command and perform the stock side effects of its events.
fn run_order_command(
    tx: &mut Transaction<'_>,
    order_id: OrderId,
    command: OrderCommand,
) -> EngineResult<Order> {
    let mut order = tx.tables().order(order_id)?.clone();
    let events = execute(tx, &mut order, ORDER_AGGREGATE, *order_id.as_uuid(), &command)?;

    for event in &events {
        if let OrderEvent::OrderCancelled(cancelled) = event {
            move_order_stock(
                tx,
                &order,
                &cancelled.restock,
                StockMovementReason::OrderCancelled,
                cancelled.actor,
            )?;
        }
    }

    tx.put_order(order_id, order.clone());
    Ok(order)
}

fn move_order_stock(
    tx: &mut Transaction<'_>,
    order: &Order,
    lines: &[RestockLine],
    reason: StockMovementReason,
    actor: UserId,
) -> EngineResult<()> {
    let now = Utc::now();
    for line in lines {
        adjust_stock(
            tx,
            AdjustStock {
                store_id: order.store_id(),
                variant_id: line.variant_id,
                delta: line.quantity,
                reason,
                notes: None,
                metadata: metadata(&[("order_id", order.id_typed().to_string())]),
                actor,
                occurred_at: now,
            },
        )?;
    }
    Ok(())
}
