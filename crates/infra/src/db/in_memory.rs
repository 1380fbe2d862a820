use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use uuid::Uuid;

use fleetstock_core::{
    DomainError, ExpectedVersion, OrderId, PurchaseId, StoreId, TransferId, VariantId,
};
use fleetstock_events::Event;
use fleetstock_inventory::{InventoryTransaction, StockAdjusted, StockKey, StockLevel, StockView, Store};
use fleetstock_products::ProductVariant;
use fleetstock_purchasing::Purchase;
use fleetstock_sales::Order;
use fleetstock_transfers::InventoryTransfer;

use crate::error::{EngineError, EngineResult};
use crate::journal::{EventJournal, StagedEvents};

/// Materialized rows, keyed like their relational tables.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub stores: HashMap<StoreId, Store>,
    pub variants: HashMap<VariantId, ProductVariant>,
    pub skus: HashMap<String, VariantId>,
    pub stock: HashMap<StockKey, StockLevel>,
    pub purchases: HashMap<PurchaseId, Purchase>,
    pub orders: HashMap<OrderId, Order>,
    pub transfers: HashMap<TransferId, InventoryTransfer>,
}

impl Tables {
    pub fn store(&self, id: StoreId) -> Result<&Store, DomainError> {
        self.stores
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("store {id}")))
    }

    pub fn variant(&self, id: VariantId) -> Result<&ProductVariant, DomainError> {
        self.variants
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("variant {id}")))
    }

    pub fn variant_mut(&mut self, id: VariantId) -> Result<&mut ProductVariant, DomainError> {
        self.variants
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("variant {id}")))
    }

    pub fn purchase(&self, id: PurchaseId) -> Result<&Purchase, DomainError> {
        self.purchases
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("purchase {id}")))
    }

    pub fn order(&self, id: OrderId) -> Result<&Order, DomainError> {
        self.orders
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("order {id}")))
    }

    pub fn transfer(&self, id: TransferId) -> Result<&InventoryTransfer, DomainError> {
        self.transfers
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("transfer {id}")))
    }

    /// The stock row for a key, or a fresh empty row.
    pub fn stock_level(&self, key: StockKey) -> StockLevel {
        self.stock
            .get(&key)
            .cloned()
            .unwrap_or_else(|| StockLevel::empty(key.store_id, key.variant_id))
    }

    /// Every transfer still referencing `order_id`, ordered by id.
    pub fn transfers_for_order(&self, order_id: OrderId) -> Vec<&InventoryTransfer> {
        let mut transfers: Vec<&InventoryTransfer> = self
            .transfers
            .values()
            .filter(|t| t.order_id() == Some(order_id))
            .collect();
        transfers.sort_by_key(|t| t.id_typed());
        transfers
    }
}

impl StockView for Tables {
    fn quantity(&self, store_id: StoreId, variant_id: VariantId) -> i64 {
        self.stock
            .get(&StockKey::new(store_id, variant_id))
            .map(StockLevel::quantity)
            .unwrap_or(0)
    }

    fn holdings(&self, variant_id: VariantId) -> Vec<(StoreId, i64)> {
        self.stock
            .values()
            .filter(|level| level.variant_id() == variant_id)
            .map(|level| (level.store_id(), level.quantity()))
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    history: Vec<InventoryTransaction>,
    journal: EventJournal,
}

/// Prior value of one row touched by an open transaction.
#[derive(Debug)]
enum Undo {
    Store(StoreId, Option<Store>),
    Variant(VariantId, Option<ProductVariant>),
    Sku(String, Option<VariantId>),
    Stock(StockKey, Option<StockLevel>),
    Purchase(PurchaseId, Option<Purchase>),
    Order(OrderId, Option<Order>),
    Transfer(TransferId, Option<InventoryTransfer>),
}

fn restore<K, V>(table: &mut HashMap<K, V>, key: K, prior: Option<V>)
where
    K: std::hash::Hash + Eq,
{
    match prior {
        Some(value) => {
            table.insert(key, value);
        }
        None => {
            table.remove(&key);
        }
    }
}

impl Undo {
    fn revert(self, tables: &mut Tables) {
        match self {
            Undo::Store(id, prior) => restore(&mut tables.stores, id, prior),
            Undo::Variant(id, prior) => restore(&mut tables.variants, id, prior),
            Undo::Sku(sku, prior) => restore(&mut tables.skus, sku, prior),
            Undo::Stock(key, prior) => restore(&mut tables.stock, key, prior),
            Undo::Purchase(id, prior) => restore(&mut tables.purchases, id, prior),
            Undo::Order(id, prior) => restore(&mut tables.orders, id, prior),
            Undo::Transfer(id, prior) => restore(&mut tables.transfers, id, prior),
        }
    }
}

/// In-memory transactional database.
///
/// A single `RwLock` serializes writers. A transaction writes the live tables
/// in place and keeps the prior value of every row it touches; when the
/// closure returns `Err` those rows are restored in reverse order. History
/// rows and journal events are staged and appended only on `Ok`, so a failed
/// operation leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    state: RwLock<State>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a consistent snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> EngineResult<T> {
        let state = self.state.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(f(&state.tables))
    }

    /// Snapshot of the history rows matching `predicate`.
    pub fn history_rows(
        &self,
        predicate: impl Fn(&InventoryTransaction) -> bool,
    ) -> EngineResult<Vec<InventoryTransaction>> {
        let state = self.state.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(state
            .history
            .iter()
            .filter(|tx| predicate(tx))
            .cloned()
            .collect())
    }

    pub fn read_journal<T>(&self, f: impl FnOnce(&EventJournal) -> T) -> EngineResult<T> {
        let state = self.state.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(f(&state.journal))
    }

    /// Run `f` as one atomic unit.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut guard = self.state.write().map_err(|_| EngineError::LockPoisoned)?;
        let state = &mut *guard;

        let mut tx = Transaction {
            tables: &mut state.tables,
            undo: Vec::new(),
            history_base: state.history.len() as u64,
            history: Vec::new(),
            journal: &state.journal,
            events: StagedEvents::default(),
        };
        let out = f(&mut tx);
        let Transaction {
            undo,
            history,
            events,
            ..
        } = tx;

        match out {
            Ok(out) => {
                state.history.extend(history);
                state.journal.commit(events);
                Ok(out)
            }
            Err(err) => {
                for entry in undo.into_iter().rev() {
                    entry.revert(&mut state.tables);
                }
                Err(err)
            }
        }
    }
}

/// An open transaction: live tables, an undo log and staged appends.
pub struct Transaction<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
    history_base: u64,
    history: Vec<InventoryTransaction>,
    journal: &'a EventJournal,
    events: StagedEvents,
}

impl Transaction<'_> {
    pub fn tables(&self) -> &Tables {
        self.tables
    }

    pub fn put_store(&mut self, store: Store) {
        let prior = self.tables.stores.insert(store.id, store.clone());
        self.undo.push(Undo::Store(store.id, prior));
    }

    /// Insert a variant and index its SKU.
    pub fn put_variant(&mut self, variant: ProductVariant) {
        let id = variant.id_typed();
        let prior_sku = self.tables.skus.insert(variant.sku().to_string(), id);
        self.undo.push(Undo::Sku(variant.sku().to_string(), prior_sku));
        let prior = self.tables.variants.insert(id, variant);
        self.undo.push(Undo::Variant(id, prior));
    }

    pub fn variant_mut(&mut self, id: VariantId) -> Result<&mut ProductVariant, DomainError> {
        let prior = self.tables.variant(id)?.clone();
        self.undo.push(Undo::Variant(id, Some(prior)));
        self.tables.variant_mut(id)
    }

    pub fn put_stock(&mut self, key: StockKey, level: StockLevel) {
        let prior = self.tables.stock.insert(key, level);
        self.undo.push(Undo::Stock(key, prior));
    }

    pub fn put_purchase(&mut self, purchase_id: PurchaseId, purchase: Purchase) {
        let prior = self.tables.purchases.insert(purchase_id, purchase);
        self.undo.push(Undo::Purchase(purchase_id, prior));
    }

    pub fn put_order(&mut self, order_id: OrderId, order: Order) {
        let prior = self.tables.orders.insert(order_id, order);
        self.undo.push(Undo::Order(order_id, prior));
    }

    /// Remove an order row; refused while any transfer still references it.
    pub fn remove_order(&mut self, order_id: OrderId) -> Result<Order, DomainError> {
        let still_linked = self.tables.transfers_for_order(order_id).len();
        if still_linked > 0 {
            return Err(DomainError::foreign_key(format!(
                "order {order_id} is still referenced by {still_linked} transfer(s)"
            )));
        }
        let order = self
            .tables
            .orders
            .remove(&order_id)
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
        self.undo.push(Undo::Order(order_id, Some(order.clone())));
        Ok(order)
    }

    pub fn put_transfer(&mut self, transfer_id: TransferId, transfer: InventoryTransfer) {
        let prior = self.tables.transfers.insert(transfer_id, transfer);
        self.undo.push(Undo::Transfer(transfer_id, prior));
    }

    /// Append one history row for an accepted stock adjustment.
    pub fn record_stock_movement(&mut self, event: &StockAdjusted) -> InventoryTransaction {
        let sequence = self.history_base + self.history.len() as u64 + 1;
        let row = InventoryTransaction::from_event(sequence, event);
        self.history.push(row.clone());
        row
    }

    /// Stage aggregate events for the journal.
    pub fn stage_events<E>(
        &mut self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected: ExpectedVersion,
        events: &[E],
    ) -> EngineResult<()>
    where
        E: Event + Serialize,
    {
        self.events
            .stage(self.journal, aggregate_type, aggregate_id, expected, events)
    }
}
