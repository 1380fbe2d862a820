use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use fleetstock_core::{DomainError, OrderId, StoreId, TransferId, UserId, VariantId};
use fleetstock_inventory::{AdjustStock, StockMovementReason, StockView};
use fleetstock_transfers::{
    CancelTransfer, CreateTransfer, DetachFromOrder, InventoryTransfer, TransferCommand,
    TransferEvent, TransferStatus, UpdateTransferStatus,
};

use super::{InventoryEngine, TRANSFER_AGGREGATE, adjust_stock, execute, metadata};
use crate::db::Transaction;
use crate::error::EngineResult;

/// One transfer in a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_store: StoreId,
    pub to_store: StoreId,
    pub variant_id: VariantId,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl InventoryEngine {
    /// Create several transfers atomically, optionally linked to an order.
    ///
    /// The source-stock check is advisory: it sums the requested quantity per
    /// (source, variant) across the batch, and the ledger validates again when
    /// a transfer goes in transit.
    #[instrument(skip(self, requests), fields(transfers = requests.len(), actor = %actor), err)]
    pub fn create_transfers_batch(
        &self,
        requests: &[TransferRequest],
        order_id: Option<OrderId>,
        actor: UserId,
    ) -> EngineResult<Vec<InventoryTransfer>> {
        let created = self
            .db
            .transaction(|tx| {
                if requests.is_empty() {
                    return Err(DomainError::validation("transfer batch cannot be empty").into());
                }
                if let Some(order_id) = order_id {
                    tx.tables().order(order_id)?;
                }

                let mut requested: HashMap<(StoreId, VariantId), i64> = HashMap::new();
                for request in requests {
                    tx.tables().store(request.from_store)?;
                    tx.tables().store(request.to_store)?;
                    tx.tables().variant(request.variant_id)?;

                    let total = requested
                        .entry((request.from_store, request.variant_id))
                        .or_default();
                    *total = total.saturating_add(request.quantity);
                    let available = tx.tables().quantity(request.from_store, request.variant_id);
                    if *total > available {
                        return Err(DomainError::InsufficientStock {
                            store_id: request.from_store,
                            variant_id: request.variant_id,
                            available,
                            requested: *total,
                        }
                        .into());
                    }
                }

                let now = Utc::now();
                let mut created = Vec::with_capacity(requests.len());
                for request in requests {
                    let transfer_id = TransferId::new();
                    let mut transfer = InventoryTransfer::empty(transfer_id);
                    execute(
                        tx,
                        &mut transfer,
                        TRANSFER_AGGREGATE,
                        *transfer_id.as_uuid(),
                        &TransferCommand::CreateTransfer(CreateTransfer {
                            transfer_id,
                            from_store: request.from_store,
                            to_store: request.to_store,
                            variant_id: request.variant_id,
                            quantity: request.quantity,
                            order_id,
                            notes: request.notes.clone(),
                            actor,
                            occurred_at: now,
                        }),
                    )?;
                    tx.put_transfer(transfer_id, transfer.clone());
                    created.push(transfer);
                }
                Ok(created)
            })
            .inspect_err(|e| warn!(error = %e, "transfer batch rejected"))?;

        info!(created = created.len(), order_id = ?order_id, "transfers created");
        Ok(created)
    }

    /// Move a transfer along its status graph, with the bound stock movement.
    #[instrument(
        skip(self, notes),
        fields(transfer_id = %transfer_id, status = %status, actor = %actor),
        err
    )]
    pub fn update_transfer_status(
        &self,
        transfer_id: TransferId,
        status: TransferStatus,
        notes: Option<String>,
        actor: UserId,
    ) -> EngineResult<InventoryTransfer> {
        let transfer = self
            .db
            .transaction(|tx| {
                run_transfer_command(
                    tx,
                    transfer_id,
                    TransferCommand::UpdateTransferStatus(UpdateTransferStatus {
                        transfer_id,
                        status,
                        notes,
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )
            })
            .inspect_err(|e| warn!(error = %e, "transfer status change rejected"))?;

        info!(status = %transfer.status(), "transfer status updated");
        Ok(transfer)
    }

    #[instrument(skip(self, reason), fields(transfer_id = %transfer_id, actor = %actor), err)]
    pub fn cancel_transfer(
        &self,
        transfer_id: TransferId,
        reason: &str,
        actor: UserId,
    ) -> EngineResult<InventoryTransfer> {
        let transfer = self
            .db
            .transaction(|tx| {
                run_transfer_command(
                    tx,
                    transfer_id,
                    TransferCommand::CancelTransfer(CancelTransfer {
                        transfer_id,
                        reason: reason.to_string(),
                        actor,
                        occurred_at: Utc::now(),
                    }),
                )
            })
            .inspect_err(|e| warn!(error = %e, "transfer cancellation rejected"))?;

        info!("transfer cancelled");
        Ok(transfer)
    }

    /// Cancel every active transfer of an order and unlink all of them.
    #[instrument(skip(self), fields(order_id = %order_id, actor = %actor), err)]
    pub fn cancel_transfers_for_order(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> EngineResult<Vec<InventoryTransfer>> {
        let detached = self
            .db
            .transaction(|tx| detach_transfers_in_tx(tx, order_id, "cancelled", actor))
            .inspect_err(|e| warn!(error = %e, "transfer cascade rejected"))?;

        info!(detached = detached.len(), "order transfers cancelled");
        Ok(detached)
    }

    pub fn transfer(&self, transfer_id: TransferId) -> EngineResult<InventoryTransfer> {
        Ok(self.db.read(|t| t.transfer(transfer_id).cloned())??)
    }

    /// Transfers still linked to `order_id`, ordered by id.
    pub fn transfers_for_order(&self, order_id: OrderId) -> EngineResult<Vec<InventoryTransfer>> {
        self.db.read(|t| {
            t.transfers_for_order(order_id)
                .into_iter()
                .cloned()
                .collect()
        })
    }
}

fn run_transfer_command(
    tx: &mut Transaction<'_>,
    transfer_id: TransferId,
    command: TransferCommand,
) -> EngineResult<InventoryTransfer> {
    let mut transfer = tx.tables().transfer(transfer_id)?.clone();
    let events = execute(
        tx,
        &mut transfer,
        TRANSFER_AGGREGATE,
        *transfer_id.as_uuid(),
        &command,
    )?;
    apply_transfer_movements(tx, &events)?;
    tx.put_transfer(transfer_id, transfer.clone());
    Ok(transfer)
}

/// Detach every transfer referencing `order_id`: active ones are cancelled
/// (stock returned to the source if already in transit), completed ones only
/// lose the link.
pub(crate) fn detach_transfers_in_tx(
    tx: &mut Transaction<'_>,
    order_id: OrderId,
    cause: &str,
    actor: UserId,
) -> EngineResult<Vec<InventoryTransfer>> {
    let ids: Vec<TransferId> = tx
        .tables()
        .transfers_for_order(order_id)
        .into_iter()
        .map(InventoryTransfer::id_typed)
        .collect();

    let now = Utc::now();
    let mut detached = Vec::with_capacity(ids.len());
    for transfer_id in ids {
        detached.push(run_transfer_command(
            tx,
            transfer_id,
            TransferCommand::DetachFromOrder(DetachFromOrder {
                transfer_id,
                order_id,
                cause: cause.to_string(),
                actor,
                occurred_at: now,
            }),
        )?);
    }
    Ok(detached)
}

fn apply_transfer_movements(
    tx: &mut Transaction<'_>,
    events: &[TransferEvent],
) -> EngineResult<()> {
    for event in events {
        let movement = match event {
            TransferEvent::TransferDispatched(e) => Some((
                e.transfer_id,
                e.from_store,
                e.variant_id,
                -e.quantity,
                StockMovementReason::TransferOut,
                e.actor,
                e.occurred_at,
            )),
            TransferEvent::TransferCompleted(e) => Some((
                e.transfer_id,
                e.to_store,
                e.variant_id,
                e.quantity,
                StockMovementReason::TransferIn,
                e.actor,
                e.occurred_at,
            )),
            TransferEvent::TransferCancelled(e) if e.previous_status == TransferStatus::InTransit => {
                Some((
                    e.transfer_id,
                    e.from_store,
                    e.variant_id,
                    e.quantity,
                    StockMovementReason::TransferCancelled,
                    e.actor,
                    e.occurred_at,
                ))
            }
            _ => None,
        };

        if let Some((transfer_id, store_id, variant_id, delta, reason, actor, occurred_at)) =
            movement
        {
            adjust_stock(
                tx,
                AdjustStock {
                    store_id,
                    variant_id,
                    delta,
                    reason,
                    notes: None,
                    metadata: metadata(&[("transfer_id", transfer_id.to_string())]),
                    actor,
                    occurred_at,
                },
            )?;
        }
    }
    Ok(())
}
