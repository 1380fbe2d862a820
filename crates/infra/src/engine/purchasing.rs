use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use fleetstock_core::{Money, PurchaseId, StoreId, UserId, VariantId};
use fleetstock_inventory::{AdjustStock, StockMovementReason};
use fleetstock_purchasing::{
    CreatePurchase, Purchase, PurchaseCommand, PurchaseEvent, PurchaseLine, ReceivePurchase,
};

use super::{InventoryEngine, PURCHASE_AGGREGATE, adjust_stock, execute, metadata};
use crate::db::Transaction;
use crate::error::EngineResult;

/// Purchase line as submitted by a caller (unit cost in major units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPurchaseItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub cost_price: Decimal,
}

/// Record-and-receive request (shipping cost in major units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPurchase {
    pub store_id: StoreId,
    #[serde(default)]
    pub shipping_cost: Decimal,
    pub items: Vec<RecordPurchaseItem>,
}

impl RecordPurchase {
    fn lines(&self) -> EngineResult<Vec<PurchaseLine>> {
        self.items
            .iter()
            .map(|item| {
                Ok(PurchaseLine {
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    cost_price: Money::from_major(item.cost_price)?,
                })
            })
            .collect()
    }
}

impl InventoryEngine {
    /// Record a purchase and receive it in the same transaction.
    #[instrument(
        skip(self, request),
        fields(store_id = %request.store_id, lines = request.items.len(), actor = %actor),
        err
    )]
    pub fn record_purchase(&self, request: &RecordPurchase, actor: UserId) -> EngineResult<Purchase> {
        let shipping_cost = Money::from_major(request.shipping_cost)?;
        let lines = request.lines()?;

        let purchase = self
            .db
            .transaction(|tx| {
                let purchase_id = create_in_tx(tx, request.store_id, shipping_cost, lines, actor)?;
                receive_in_tx(tx, purchase_id, actor)
            })
            .inspect_err(|e| warn!(error = %e, "purchase rejected"))?;

        info!(
            purchase_id = %purchase.id_typed(),
            shipping_cost = shipping_cost.minor(),
            "purchase recorded and received"
        );
        Ok(purchase)
    }

    /// Record a pending purchase; no cost or stock effect until received.
    #[instrument(skip(self, lines), fields(store_id = %store_id, actor = %actor), err)]
    pub fn create_purchase(
        &self,
        store_id: StoreId,
        shipping_cost: Money,
        lines: Vec<PurchaseLine>,
        actor: UserId,
    ) -> EngineResult<Purchase> {
        let purchase = self
            .db
            .transaction(|tx| {
                let purchase_id = create_in_tx(tx, store_id, shipping_cost, lines, actor)?;
                Ok(tx.tables().purchase(purchase_id)?.clone())
            })
            .inspect_err(|e| warn!(error = %e, "purchase rejected"))?;

        info!(purchase_id = %purchase.id_typed(), "purchase created");
        Ok(purchase)
    }

    #[instrument(skip(self), fields(purchase_id = %purchase_id, actor = %actor), err)]
    pub fn receive_purchase(&self, purchase_id: PurchaseId, actor: UserId) -> EngineResult<Purchase> {
        let purchase = self
            .db
            .transaction(|tx| receive_in_tx(tx, purchase_id, actor))
            .inspect_err(|e| warn!(error = %e, "purchase receipt rejected"))?;

        info!(items = purchase.items().len(), "purchase received");
        Ok(purchase)
    }

    pub fn purchase(&self, purchase_id: PurchaseId) -> EngineResult<Purchase> {
        Ok(self.db.read(|t| t.purchase(purchase_id).cloned())??)
    }
}

fn create_in_tx(
    tx: &mut Transaction<'_>,
    store_id: StoreId,
    shipping_cost: Money,
    lines: Vec<PurchaseLine>,
    actor: UserId,
) -> EngineResult<PurchaseId> {
    tx.tables().store(store_id)?;
    for line in &lines {
        tx.tables().variant(line.variant_id)?;
    }

    let purchase_id = PurchaseId::new();
    let mut purchase = Purchase::empty(purchase_id);
    execute(
        tx,
        &mut purchase,
        PURCHASE_AGGREGATE,
        *purchase_id.as_uuid(),
        &PurchaseCommand::CreatePurchase(CreatePurchase {
            purchase_id,
            store_id,
            shipping_cost,
            lines,
            actor,
            occurred_at: Utc::now(),
        }),
    )?;
    tx.put_purchase(purchase_id, purchase);
    Ok(purchase_id)
}

/// Fold every line into its variant's cost aggregates and add the stock.
fn receive_in_tx(
    tx: &mut Transaction<'_>,
    purchase_id: PurchaseId,
    actor: UserId,
) -> EngineResult<Purchase> {
    let mut purchase = tx.tables().purchase(purchase_id)?.clone();
    let events = execute(
        tx,
        &mut purchase,
        PURCHASE_AGGREGATE,
        *purchase_id.as_uuid(),
        &PurchaseCommand::ReceivePurchase(ReceivePurchase {
            purchase_id,
            actor,
            occurred_at: Utc::now(),
        }),
    )?;

    for event in &events {
        let PurchaseEvent::PurchaseReceived(received) = event else {
            continue;
        };
        for item in &received.items {
            let update = tx
                .variant_mut(item.variant_id)?
                .record_purchase(item.quantity, item.total_cost_price)?;
            debug!(
                variant_id = %item.variant_id,
                previous_average_cost = update.previous_average_cost.minor(),
                average_cost = update.average_cost.minor(),
                "cost aggregates updated"
            );

            adjust_stock(
                tx,
                AdjustStock {
                    store_id: received.store_id,
                    variant_id: item.variant_id,
                    delta: item.quantity,
                    reason: StockMovementReason::PurchaseReceipt,
                    notes: None,
                    metadata: metadata(&[("purchase_id", purchase_id.to_string())]),
                    actor,
                    occurred_at: received.occurred_at,
                },
            )?;
        }
    }

    tx.put_purchase(purchase_id, purchase.clone());
    Ok(purchase)
}
