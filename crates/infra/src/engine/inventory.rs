use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use fleetstock_core::{DomainError, Money, StoreId, UserId, VariantId};
use fleetstock_inventory::{
    AdjustStock, AllocationPlanner, AvailabilityReport, HistoryFilter, HistoryScope,
    InventoryHistory, InventoryTransaction, RequestedLine, StockMovementReason, StockView,
};

use super::{InventoryEngine, adjust_stock, ensure_known};
use crate::error::EngineResult;

/// How `AdjustInventory` interprets its quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustAction {
    Add,
    Reduce,
    Set,
}

/// Manual stock correction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustInventory {
    pub variant_id: VariantId,
    pub store_id: StoreId,
    pub action: AdjustAction,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

/// Outcome of a manual correction; `transaction` is `None` for a no-op `set`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryAdjustment {
    pub quantity: i64,
    pub transaction: Option<InventoryTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationLine {
    pub variant_id: VariantId,
    pub sku: String,
    pub quantity: i64,
    pub average_cost: Money,
    pub value: Money,
}

/// Stock on hand at one store, valued at weighted average cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreValuation {
    pub store_id: StoreId,
    pub lines: Vec<ValuationLine>,
    pub total_value: Money,
}

impl InventoryEngine {
    /// Apply a signed quantity change; returns the new quantity.
    #[instrument(skip(self), fields(store_id = %store_id, variant_id = %variant_id), err)]
    pub fn adjust(
        &self,
        store_id: StoreId,
        variant_id: VariantId,
        delta: i64,
        reason: StockMovementReason,
        actor: UserId,
    ) -> EngineResult<i64> {
        let row = self
            .db
            .transaction(|tx| {
                adjust_stock(
                    tx,
                    AdjustStock {
                        store_id,
                        variant_id,
                        delta,
                        reason,
                        notes: None,
                        metadata: None,
                        actor,
                        occurred_at: Utc::now(),
                    },
                )
            })
            .inspect_err(|e| warn!(error = %e, delta, "stock adjustment rejected"))?;

        info!(
            delta,
            resulting_quantity = row.resulting_quantity,
            reason = %reason,
            "stock adjusted"
        );
        Ok(row.resulting_quantity)
    }

    /// Current quantity of a variant at a store (0 when never stocked).
    pub fn quantity(&self, store_id: StoreId, variant_id: VariantId) -> EngineResult<i64> {
        Ok(self.db.read(|t| t.quantity(store_id, variant_id))?)
    }

    /// Restartable history view, oldest first.
    pub fn history(
        &self,
        scope: HistoryScope,
        filter: HistoryFilter,
    ) -> EngineResult<InventoryHistory> {
        let rows = self.db.history_rows(|tx| match scope {
            HistoryScope::Store(id) => tx.store_id == id,
            HistoryScope::Variant(id) => tx.variant_id == id,
        })?;
        Ok(InventoryHistory::new(rows, scope, filter))
    }

    #[instrument(
        skip(self, request),
        fields(
            store_id = %request.store_id,
            variant_id = %request.variant_id,
            action = ?request.action,
            quantity = request.quantity
        ),
        err
    )]
    pub fn adjust_inventory(
        &self,
        request: &AdjustInventory,
        actor: UserId,
    ) -> EngineResult<InventoryAdjustment> {
        let outcome = self
            .db
            .transaction(|tx| {
                ensure_known(tx, request.store_id, request.variant_id)?;
                let current = tx.tables().quantity(request.store_id, request.variant_id);

                let delta = match request.action {
                    AdjustAction::Add | AdjustAction::Reduce if request.quantity <= 0 => {
                        return Err(DomainError::validation(
                            "adjustment quantity must be positive",
                        )
                        .into());
                    }
                    AdjustAction::Add => request.quantity,
                    AdjustAction::Reduce => -request.quantity,
                    AdjustAction::Set if request.quantity < 0 => {
                        return Err(
                            DomainError::validation("target quantity cannot be negative").into(),
                        );
                    }
                    AdjustAction::Set => request.quantity - current,
                };

                if delta == 0 {
                    return Ok(InventoryAdjustment {
                        quantity: current,
                        transaction: None,
                    });
                }

                let row = adjust_stock(
                    tx,
                    AdjustStock {
                        store_id: request.store_id,
                        variant_id: request.variant_id,
                        delta,
                        reason: StockMovementReason::ManualAdjustment,
                        notes: request.notes.clone(),
                        metadata: request.metadata.clone(),
                        actor,
                        occurred_at: Utc::now(),
                    },
                )?;
                Ok(InventoryAdjustment {
                    quantity: row.resulting_quantity,
                    transaction: Some(row),
                })
            })
            .inspect_err(|e| warn!(error = %e, "inventory adjustment rejected"))?;

        info!(
            resulting_quantity = outcome.quantity,
            changed = outcome.transaction.is_some(),
            "inventory adjusted"
        );
        Ok(outcome)
    }

    /// Shortage check for `items` at `store_id`, with transfer and purchase
    /// suggestions drawn from the rest of the fleet. Read-only.
    #[instrument(skip(self, items), fields(store_id = %store_id, lines = items.len()), err)]
    pub fn check_stock_availability(
        &self,
        store_id: StoreId,
        items: &[RequestedLine],
    ) -> EngineResult<AvailabilityReport> {
        let report = self.db.read(|tables| -> EngineResult<AvailabilityReport> {
            tables.store(store_id)?;
            for item in items {
                tables.variant(item.variant_id)?;
            }
            Ok(AllocationPlanner::new(tables).check(store_id, items)?)
        })??;

        debug!(
            has_shortage = report.has_shortage,
            suggestions = report.suggestions.len(),
            "availability checked"
        );
        Ok(report)
    }

    /// Σ quantity × average cost over the store's stock rows, by SKU.
    pub fn valuation(&self, store_id: StoreId) -> EngineResult<StoreValuation> {
        self.db.read(|tables| -> EngineResult<StoreValuation> {
            tables.store(store_id)?;

            let mut lines = Vec::new();
            let mut total_value = Money::ZERO;
            for level in tables.stock.values() {
                if level.store_id() != store_id || level.quantity() == 0 {
                    continue;
                }
                let variant = tables.variant(level.variant_id())?;
                let average_cost = variant.average_cost();
                let value = average_cost.checked_mul(level.quantity())?;
                total_value = total_value.checked_add(value)?;
                lines.push(ValuationLine {
                    variant_id: level.variant_id(),
                    sku: variant.sku().to_string(),
                    quantity: level.quantity(),
                    average_cost,
                    value,
                });
            }
            lines.sort_by(|a, b| a.sku.cmp(&b.sku));

            Ok(StoreValuation {
                store_id,
                lines,
                total_value,
            })
        })?
    }
}
