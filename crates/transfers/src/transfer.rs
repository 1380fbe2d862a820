use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{
    Aggregate, AggregateRoot, DomainError, OrderId, StoreId, TransferId, UserId, VariantId,
};
use fleetstock_events::Event;

use crate::status::TransferStatus;

/// Aggregate root: InventoryTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransfer {
    id: TransferId,
    from_store: StoreId,
    to_store: StoreId,
    variant_id: VariantId,
    quantity: i64,
    status: TransferStatus,
    order_id: Option<OrderId>,
    notes: Option<String>,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryTransfer {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            from_store: StoreId::default(),
            to_store: StoreId::default(),
            variant_id: VariantId::default(),
            quantity: 0,
            status: TransferStatus::Pending,
            order_id: None,
            notes: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn from_store(&self) -> StoreId {
        self.from_store
    }

    pub fn to_store(&self) -> StoreId {
        self.to_store
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn append_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        match &mut self.notes {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(note);
            }
            None => self.notes = Some(note.to_string()),
        }
    }
}

impl AggregateRoot for InventoryTransfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub transfer_id: TransferId,
    pub from_store: StoreId,
    pub to_store: StoreId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub order_id: Option<OrderId>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateTransferStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransferStatus {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub transfer_id: TransferId,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DetachFromOrder.
///
/// Issued for every transfer referencing an order that is being cancelled or
/// deleted. Active transfers are cancelled; every transfer loses its order link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachFromOrder {
    pub transfer_id: TransferId,
    pub order_id: OrderId,
    /// What happened to the order, e.g. "cancelled" or "deleted".
    pub cause: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    CreateTransfer(CreateTransfer),
    UpdateTransferStatus(UpdateTransferStatus),
    CancelTransfer(CancelTransfer),
    DetachFromOrder(DetachFromOrder),
}

/// Event: TransferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub transfer_id: TransferId,
    pub from_store: StoreId,
    pub to_store: StoreId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub order_id: Option<OrderId>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferDispatched (pending -> in_transit; source is debited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDispatched {
    pub transfer_id: TransferId,
    pub from_store: StoreId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCompleted (in_transit -> completed; destination is credited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub transfer_id: TransferId,
    pub to_store: StoreId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCancelled.
///
/// When `previous_status` is `in_transit` the goods already left the source
/// store and are credited back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub transfer_id: TransferId,
    pub previous_status: TransferStatus,
    pub from_store: StoreId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub reason: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferUnlinkedFromOrder (order reference nulled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUnlinkedFromOrder {
    pub transfer_id: TransferId,
    pub order_id: OrderId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferCreated(TransferCreated),
    TransferDispatched(TransferDispatched),
    TransferCompleted(TransferCompleted),
    TransferCancelled(TransferCancelled),
    TransferUnlinkedFromOrder(TransferUnlinkedFromOrder),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferCreated(_) => "transfers.transfer.created",
            TransferEvent::TransferDispatched(_) => "transfers.transfer.dispatched",
            TransferEvent::TransferCompleted(_) => "transfers.transfer.completed",
            TransferEvent::TransferCancelled(_) => "transfers.transfer.cancelled",
            TransferEvent::TransferUnlinkedFromOrder(_) => "transfers.transfer.unlinked_from_order",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferCreated(e) => e.occurred_at,
            TransferEvent::TransferDispatched(e) => e.occurred_at,
            TransferEvent::TransferCompleted(e) => e.occurred_at,
            TransferEvent::TransferCancelled(e) => e.occurred_at,
            TransferEvent::TransferUnlinkedFromOrder(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryTransfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferCreated(e) => {
                self.id = e.transfer_id;
                self.from_store = e.from_store;
                self.to_store = e.to_store;
                self.variant_id = e.variant_id;
                self.quantity = e.quantity;
                self.status = TransferStatus::Pending;
                self.order_id = e.order_id;
                self.notes = None;
                if let Some(notes) = &e.notes {
                    self.append_note(notes);
                }
                self.created_by = Some(e.actor);
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            TransferEvent::TransferDispatched(e) => {
                self.status = TransferStatus::InTransit;
                if let Some(notes) = &e.notes {
                    self.append_note(notes);
                }
                self.updated_at = Some(e.occurred_at);
            }
            TransferEvent::TransferCompleted(e) => {
                self.status = TransferStatus::Completed;
                if let Some(notes) = &e.notes {
                    self.append_note(notes);
                }
                self.updated_at = Some(e.occurred_at);
            }
            TransferEvent::TransferCancelled(e) => {
                self.status = TransferStatus::Cancelled;
                self.append_note(&format!("Cancelled: {}", e.reason));
                self.updated_at = Some(e.occurred_at);
            }
            TransferEvent::TransferUnlinkedFromOrder(e) => {
                self.order_id = None;
                self.append_note(&format!("Unlinked from order {}", e.order_id));
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::CreateTransfer(cmd) => self.handle_create(cmd),
            TransferCommand::UpdateTransferStatus(cmd) => self.handle_update_status(cmd),
            TransferCommand::CancelTransfer(cmd) => self.handle_cancel(cmd),
            TransferCommand::DetachFromOrder(cmd) => self.handle_detach(cmd),
        }
    }
}

impl InventoryTransfer {
    fn ensure_transfer_id(&self, transfer_id: TransferId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("transfer"));
        }
        if self.id != transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        if cmd.from_store == cmd.to_store {
            return Err(DomainError::validation(
                "source and destination store must differ",
            ));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }

        Ok(vec![TransferEvent::TransferCreated(TransferCreated {
            transfer_id: cmd.transfer_id,
            from_store: cmd.from_store,
            to_store: cmd.to_store,
            variant_id: cmd.variant_id,
            quantity: cmd.quantity,
            order_id: cmd.order_id,
            notes: cmd.notes.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_status(
        &self,
        cmd: &UpdateTransferStatus,
    ) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transfer_id(cmd.transfer_id)?;
        let to = self.status.transition_to(cmd.status)?;

        let event = match to {
            TransferStatus::InTransit => TransferEvent::TransferDispatched(TransferDispatched {
                transfer_id: self.id,
                from_store: self.from_store,
                variant_id: self.variant_id,
                quantity: self.quantity,
                notes: cmd.notes.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            TransferStatus::Completed => TransferEvent::TransferCompleted(TransferCompleted {
                transfer_id: self.id,
                to_store: self.to_store,
                variant_id: self.variant_id,
                quantity: self.quantity,
                notes: cmd.notes.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            }),
            TransferStatus::Cancelled => self.cancelled(
                cmd.notes.clone().unwrap_or_else(|| "status update".to_string()),
                cmd.actor,
                cmd.occurred_at,
            ),
            TransferStatus::Pending => {
                return Err(DomainError::invalid_transfer_transition(self.status, to));
            }
        };

        Ok(vec![event])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transfer_id(cmd.transfer_id)?;
        self.status.transition_to(TransferStatus::Cancelled)?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }

        Ok(vec![self.cancelled(
            reason.to_string(),
            cmd.actor,
            cmd.occurred_at,
        )])
    }

    fn handle_detach(&self, cmd: &DetachFromOrder) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_transfer_id(cmd.transfer_id)?;
        if self.order_id != Some(cmd.order_id) {
            return Err(DomainError::invariant(format!(
                "transfer is not linked to order {}",
                cmd.order_id
            )));
        }

        let mut events = Vec::with_capacity(2);
        if self.status.is_active() {
            events.push(self.cancelled(
                format!("order {} {}", cmd.order_id, cmd.cause),
                cmd.actor,
                cmd.occurred_at,
            ));
        }
        events.push(TransferEvent::TransferUnlinkedFromOrder(
            TransferUnlinkedFromOrder {
                transfer_id: self.id,
                order_id: cmd.order_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        ));
        Ok(events)
    }

    fn cancelled(&self, reason: String, actor: UserId, occurred_at: DateTime<Utc>) -> TransferEvent {
        TransferEvent::TransferCancelled(TransferCancelled {
            transfer_id: self.id,
            previous_status: self.status,
            from_store: self.from_store,
            variant_id: self.variant_id,
            quantity: self.quantity,
            reason,
            actor,
            occurred_at,
        })
    }
}
