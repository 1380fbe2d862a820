//! Transactional service layer.
//!
//! `InventoryEngine` exposes every caller-facing operation. Each mutating
//! operation runs as one database transaction:
//!
//! ```text
//! load aggregate(s) -> handle command -> apply events -> side effects
//!   (ledger movements, cost aggregates, cascades) -> stage journal -> commit
//! ```
//!
//! Any error aborts the whole operation; nothing is retried.

mod inventory;
mod orders;
mod purchasing;
mod registry;
mod transfers;

pub use inventory::{AdjustAction, AdjustInventory, InventoryAdjustment, StoreValuation, ValuationLine};
pub use orders::CreateOrderRequest;
pub use purchasing::{RecordPurchase, RecordPurchaseItem};
pub use transfers::TransferRequest;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use fleetstock_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, StoreId, VariantId};
use fleetstock_events::{Event, EventEnvelope};
use fleetstock_inventory::{
    AdjustStock, InventoryTransaction, StockCommand, StockEvent, StockKey,
};

use crate::config::EngineConfig;
use crate::db::{InMemoryDatabase, Transaction};
use crate::error::{EngineError, EngineResult};

pub const STOCK_LEVEL_AGGREGATE: &str = "inventory.stock_level";
pub const PURCHASE_AGGREGATE: &str = "purchasing.purchase";
pub const ORDER_AGGREGATE: &str = "sales.order";
pub const TRANSFER_AGGREGATE: &str = "transfers.transfer";

/// Multi-store inventory engine over the in-memory database.
#[derive(Debug)]
pub struct InventoryEngine {
    db: InMemoryDatabase,
    config: EngineConfig,
}

impl Default for InventoryEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl InventoryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            db: InMemoryDatabase::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &InMemoryDatabase {
        &self.db
    }

    /// Journal entries of one aggregate stream.
    pub fn journal_stream(&self, aggregate_id: Uuid) -> EngineResult<Vec<EventEnvelope<JsonValue>>> {
        self.db.read_journal(|journal| journal.stream(aggregate_id))
    }

    /// Number of committed journal entries.
    pub fn journal_len(&self) -> EngineResult<usize> {
        self.db.read_journal(|journal| journal.len())
    }
}

/// Journal stream id of a stock row: name-based on (store, variant).
pub fn stock_stream_id(key: StockKey) -> Uuid {
    Uuid::new_v5(key.store_id.as_uuid(), key.variant_id.as_uuid().as_bytes())
}

/// Execute a command on `aggregate` and stage the resulting events.
pub(crate) fn execute<A>(
    tx: &mut Transaction<'_>,
    aggregate: &mut A,
    aggregate_type: &str,
    stream_id: Uuid,
    command: &A::Command,
) -> EngineResult<Vec<A::Event>>
where
    A: Aggregate<Error = DomainError>,
    A::Event: Event + Serialize,
{
    let expected = ExpectedVersion::Exact(aggregate.version());
    let events = aggregate.execute(command)?;
    tx.stage_events(aggregate_type, stream_id, expected, &events)?;
    Ok(events)
}

/// The single entry point for quantity writes.
///
/// Loads the stock row, applies the adjustment (rejecting anything that would
/// go below zero), stores the row and appends one history row.
pub(crate) fn adjust_stock(
    tx: &mut Transaction<'_>,
    command: AdjustStock,
) -> EngineResult<InventoryTransaction> {
    tx.tables().store(command.store_id)?;
    tx.tables().variant(command.variant_id)?;

    let key = StockKey::new(command.store_id, command.variant_id);
    let mut level = tx.tables().stock_level(key);
    let events = execute(
        tx,
        &mut level,
        STOCK_LEVEL_AGGREGATE,
        stock_stream_id(key),
        &StockCommand::AdjustStock(command),
    )?;
    tx.put_stock(key, level);

    let StockEvent::StockAdjusted(adjusted) = events
        .first()
        .ok_or_else(|| EngineError::Storage("stock adjustment produced no event".to_string()))?;
    Ok(tx.record_stock_movement(adjusted))
}

pub(crate) fn metadata(pairs: &[(&str, String)]) -> Option<JsonValue> {
    let map: serde_json::Map<String, JsonValue> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), JsonValue::String(v.clone())))
        .collect();
    Some(JsonValue::Object(map))
}

pub(crate) fn ensure_known(
    tx: &Transaction<'_>,
    store_id: StoreId,
    variant_id: VariantId,
) -> EngineResult<()> {
    tx.tables().store(store_id)?;
    tx.tables().variant(variant_id)?;
    Ok(())
}
