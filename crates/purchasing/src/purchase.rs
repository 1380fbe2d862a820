use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, PurchaseId, StoreId, UserId,
    VariantId,
};
use fleetstock_events::Event;

use crate::cost::{CostAllocator, PurchaseLine};

/// Purchase status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Recorded, goods not yet received: no cost or stock effect.
    Pending,
    /// Goods received: costs folded into variants, stock added at the store.
    Received,
}

/// A committed purchase line. Immutable once the purchase exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub line_no: u32,
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Unit cost.
    pub cost_price: Money,
    pub allocated_shipping_cost: Money,
    /// `cost_price * quantity + allocated_shipping_cost`.
    pub total_cost_price: Money,
}

/// Aggregate root: Purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    id: PurchaseId,
    store_id: Option<StoreId>,
    shipping_cost: Money,
    status: PurchaseStatus,
    items: Vec<PurchaseItem>,
    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Purchase {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseId) -> Self {
        Self {
            id,
            store_id: None,
            shipping_cost: Money::ZERO,
            status: PurchaseStatus::Pending,
            items: Vec::new(),
            created_by: None,
            created_at: None,
            received_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseId {
        self.id
    }

    pub fn store_id(&self) -> Option<StoreId> {
        self.store_id
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn status(&self) -> PurchaseStatus {
        self.status
    }

    pub fn items(&self) -> &[PurchaseItem] {
        &self.items
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    /// Goods cost plus shipping (equals the sum of the items' landed costs).
    pub fn total_amount(&self) -> DomainResult<Money> {
        self.items
            .iter()
            .try_fold(Money::ZERO, |acc, item| acc.checked_add(item.total_cost_price))
    }
}

impl AggregateRoot for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchase {
    pub purchase_id: PurchaseId,
    pub store_id: StoreId,
    pub shipping_cost: Money,
    pub lines: Vec<PurchaseLine>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceivePurchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivePurchase {
    pub purchase_id: PurchaseId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseCommand {
    CreatePurchase(CreatePurchase),
    ReceivePurchase(ReceivePurchase),
}

/// Event: PurchaseCreated (items already carry their allocated shipping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCreated {
    pub purchase_id: PurchaseId,
    pub store_id: StoreId,
    pub shipping_cost: Money,
    pub items: Vec<PurchaseItem>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseReceived.
///
/// Carries everything the service layer needs to fold costs into variants and
/// add stock at the receiving store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceived {
    pub purchase_id: PurchaseId,
    pub store_id: StoreId,
    pub items: Vec<PurchaseItem>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseEvent {
    PurchaseCreated(PurchaseCreated),
    PurchaseReceived(PurchaseReceived),
}

impl Event for PurchaseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseEvent::PurchaseCreated(_) => "purchasing.purchase.created",
            PurchaseEvent::PurchaseReceived(_) => "purchasing.purchase.received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseEvent::PurchaseCreated(e) => e.occurred_at,
            PurchaseEvent::PurchaseReceived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Purchase {
    type Command = PurchaseCommand;
    type Event = PurchaseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseEvent::PurchaseCreated(e) => {
                self.id = e.purchase_id;
                self.store_id = Some(e.store_id);
                self.shipping_cost = e.shipping_cost;
                self.items = e.items.clone();
                self.status = PurchaseStatus::Pending;
                self.created_by = Some(e.actor);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PurchaseEvent::PurchaseReceived(e) => {
                self.status = PurchaseStatus::Received;
                self.received_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseCommand::CreatePurchase(cmd) => self.handle_create(cmd),
            PurchaseCommand::ReceivePurchase(cmd) => self.handle_receive(cmd),
        }
    }
}

impl Purchase {
    fn handle_create(&self, cmd: &CreatePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase already exists"));
        }

        let items = CostAllocator::allocate(cmd.shipping_cost, &cmd.lines)?;

        Ok(vec![PurchaseEvent::PurchaseCreated(PurchaseCreated {
            purchase_id: cmd.purchase_id,
            store_id: cmd.store_id,
            shipping_cost: cmd.shipping_cost,
            items,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceivePurchase) -> Result<Vec<PurchaseEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase"));
        }
        if self.id != cmd.purchase_id {
            return Err(DomainError::invariant("purchase_id mismatch"));
        }
        if self.status != PurchaseStatus::Pending {
            return Err(DomainError::invariant("purchase has already been received"));
        }
        let store_id = self
            .store_id
            .ok_or_else(|| DomainError::invariant("purchase has no store"))?;

        Ok(vec![PurchaseEvent::PurchaseReceived(PurchaseReceived {
            purchase_id: self.id,
            store_id,
            items: self.items.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
