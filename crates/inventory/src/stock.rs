use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use fleetstock_core::{Aggregate, AggregateRoot, DomainError, StoreId, UserId, VariantId};
use fleetstock_events::Event;

/// Key of one inventory row: a variant held at a store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub store_id: StoreId,
    pub variant_id: VariantId,
}

impl StockKey {
    pub fn new(store_id: StoreId, variant_id: VariantId) -> Self {
        Self {
            store_id,
            variant_id,
        }
    }
}

/// Why a stock level moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementReason {
    PurchaseReceipt,
    OrderSale,
    OrderCancelled,
    OrderDeleted,
    TransferOut,
    TransferIn,
    TransferCancelled,
    ManualAdjustment,
}

impl StockMovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockMovementReason::PurchaseReceipt => "purchase receipt",
            StockMovementReason::OrderSale => "order sale",
            StockMovementReason::OrderCancelled => "order cancelled",
            StockMovementReason::OrderDeleted => "order deleted",
            StockMovementReason::TransferOut => "transfer out",
            StockMovementReason::TransferIn => "transfer in",
            StockMovementReason::TransferCancelled => "transfer cancelled",
            StockMovementReason::ManualAdjustment => "manual adjustment",
        }
    }
}

impl core::fmt::Display for StockMovementReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: StockLevel (one inventory row).
///
/// The quantity never goes below zero; every accepted adjustment emits exactly
/// one `StockAdjusted` event, which becomes one history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    key: StockKey,
    quantity: i64,
    version: u64,
}

impl StockLevel {
    /// A row that has never been stocked.
    pub fn empty(store_id: StoreId, variant_id: VariantId) -> Self {
        Self {
            key: StockKey::new(store_id, variant_id),
            quantity: 0,
            version: 0,
        }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn store_id(&self) -> StoreId {
        self.key.store_id
    }

    pub fn variant_id(&self) -> VariantId {
        self.key.variant_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }
}

impl AggregateRoot for StockLevel {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AdjustStock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub delta: i64,
    pub reason: StockMovementReason,
    pub notes: Option<String>,
    pub metadata: Option<JsonValue>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockCommand {
    AdjustStock(AdjustStock),
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub delta: i64,
    pub resulting_quantity: i64,
    pub reason: StockMovementReason,
    pub notes: Option<String>,
    pub metadata: Option<JsonValue>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockEvent {
    StockAdjusted(StockAdjusted),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockAdjusted(_) => "inventory.stock.adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLevel {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockAdjusted(e) => {
                self.quantity = e.resulting_quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl StockLevel {
    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockEvent>, DomainError> {
        if StockKey::new(cmd.store_id, cmd.variant_id) != self.key {
            return Err(DomainError::invariant("stock key mismatch"));
        }

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let resulting_quantity = self
            .quantity
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;

        if resulting_quantity < 0 {
            return Err(DomainError::InsufficientStock {
                store_id: cmd.store_id,
                variant_id: cmd.variant_id,
                available: self.quantity,
                requested: -cmd.delta,
            });
        }

        Ok(vec![StockEvent::StockAdjusted(StockAdjusted {
            store_id: cmd.store_id,
            variant_id: cmd.variant_id,
            delta: cmd.delta,
            resulting_quantity,
            reason: cmd.reason,
            notes: cmd.notes.clone(),
            metadata: cmd.metadata.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
