//! Append-only inventory transaction history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use fleetstock_core::{StoreId, UserId, VariantId};

use crate::stock::{StockAdjusted, StockMovementReason};

/// One history row, written for every accepted stock adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    /// Position in the global ledger (1-based, strictly increasing).
    pub sequence: u64,
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

impl InventoryTransaction {
    pub fn from_event(sequence: u64, event: &StockAdjusted) -> Self {
        Self {
            sequence,
            store_id: event.store_id,
            variant_id: event.variant_id,
            delta: event.delta,
            resulting_quantity: event.resulting_quantity,
            reason: event.reason,
            notes: event.notes.clone(),
            metadata: event.metadata.clone(),
            actor: event.actor,
            occurred_at: event.occurred_at,
        }
    }
}

/// Which rows a history query is about.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum HistoryScope {
    Store(StoreId),
    Variant(VariantId),
}

/// Optional narrowing of a history query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    /// Further restrict a store scope to one variant, or a variant scope to one store.
    pub store_id: Option<StoreId>,
    pub variant_id: Option<VariantId>,
    pub reason: Option<StockMovementReason>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn matches(&self, scope: HistoryScope, tx: &InventoryTransaction) -> bool {
        let in_scope = match scope {
            HistoryScope::Store(id) => tx.store_id == id,
            HistoryScope::Variant(id) => tx.variant_id == id,
        };

        in_scope
            && self.store_id.is_none_or(|id| tx.store_id == id)
            && self.variant_id.is_none_or(|id| tx.variant_id == id)
            && self.reason.is_none_or(|r| tx.reason == r)
            && self.since.is_none_or(|t| tx.occurred_at >= t)
            && self.until.is_none_or(|t| tx.occurred_at < t)
    }
}

/// A finite, restartable view over a history snapshot.
///
/// Filtering happens lazily while iterating; calling [`InventoryHistory::iter`]
/// again starts over from the oldest row.
#[derive(Debug, Clone)]
pub struct InventoryHistory {
    rows: Arc<[InventoryTransaction]>,
    scope: HistoryScope,
    filter: HistoryFilter,
}

impl InventoryHistory {
    /// Build a view; `rows` is re-ordered by (timestamp, sequence) ascending.
    pub fn new(
        rows: impl Into<Vec<InventoryTransaction>>,
        scope: HistoryScope,
        filter: HistoryFilter,
    ) -> Self {
        let mut rows = rows.into();
        rows.sort_by_key(|tx| (tx.occurred_at, tx.sequence));
        Self {
            rows: rows.into(),
            scope,
            filter,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryTransaction> + '_ {
        self.rows
            .iter()
            .filter(move |tx| self.filter.matches(self.scope, tx))
    }

    pub fn scope(&self) -> HistoryScope {
        self.scope
    }
}

impl<'a> IntoIterator for &'a InventoryHistory {
    type Item = &'a InventoryTransaction;
    type IntoIter = Box<dyn Iterator<Item = &'a InventoryTransaction> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
