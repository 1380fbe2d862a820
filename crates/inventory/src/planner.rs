//! Allocation planner: shortage detection and transfer/purchase suggestions.
//!
//! The planner is advisory. It reads a stock snapshot, never writes, and holds
//! no reservation: by the time a caller acts on a suggestion the numbers may
//! have moved, and the ledger re-validates at write time.

use serde::{Deserialize, Serialize};

use fleetstock_core::{DomainError, DomainResult, StoreId, VariantId};

/// Read access to stock levels.
pub trait StockView {
    /// Quantity of `variant_id` held at `store_id` (0 when the row is absent).
    fn quantity(&self, store_id: StoreId, variant_id: VariantId) -> i64;

    /// Every (store, quantity) row recorded for `variant_id`, in any order.
    fn holdings(&self, variant_id: VariantId) -> Vec<(StoreId, i64)>;
}

/// One requested line: a variant and how many units the caller needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub variant_id: VariantId,
    pub quantity: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOption {
    pub store_id: StoreId,
    pub available_quantity: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSuggestion {
    pub suggested_quantity: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedSolution {
    pub transfer_quantity: i64,
    pub purchase_quantity: i64,
}

/// Advice for one line that the requesting store cannot cover alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortageSuggestion {
    pub variant_id: VariantId,
    pub requested_quantity: i64,
    pub available_quantity: i64,
    pub shortage_quantity: i64,
    /// Other stores holding the variant, most stock first, ties by store id.
    pub transfer_options: Vec<TransferOption>,
    pub purchase_suggestion: Option<PurchaseSuggestion>,
    pub mixed_solution: Option<MixedSolution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub has_shortage: bool,
    pub suggestions: Vec<ShortageSuggestion>,
}

/// Computes shortages for a requesting store against a stock snapshot.
pub struct AllocationPlanner<'a, V: StockView + ?Sized> {
    view: &'a V,
}

impl<'a, V: StockView + ?Sized> AllocationPlanner<'a, V> {
    pub fn new(view: &'a V) -> Self {
        Self { view }
    }

    /// Check every line against `store_id`; lines without a shortage produce
    /// no suggestion.
    pub fn check(
        &self,
        store_id: StoreId,
        lines: &[RequestedLine],
    ) -> DomainResult<AvailabilityReport> {
        let mut suggestions = Vec::new();
        for line in lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "requested quantity for variant {} must be positive",
                    line.variant_id
                )));
            }
            if let Some(suggestion) = self.suggest(store_id, line) {
                suggestions.push(suggestion);
            }
        }

        Ok(AvailabilityReport {
            has_shortage: !suggestions.is_empty(),
            suggestions,
        })
    }

    fn suggest(&self, store_id: StoreId, line: &RequestedLine) -> Option<ShortageSuggestion> {
        let available = self.view.quantity(store_id, line.variant_id).max(0);
        let shortage = (line.quantity - available).max(0);
        if shortage == 0 {
            return None;
        }

        let transfer_options = self.transfer_options(store_id, line.variant_id);
        let transferable: i64 = transfer_options.iter().map(|o| o.available_quantity).sum();
        let transfer_quantity = shortage.min(transferable);
        let purchase_quantity = shortage - transfer_quantity;

        let purchase_suggestion = (purchase_quantity > 0).then_some(PurchaseSuggestion {
            suggested_quantity: purchase_quantity,
        });

        // A plan is mixed when the transfer is one of several sources: local
        // stock still covers part of the request, or a purchase covers the rest.
        let mixed_solution = (transfer_quantity > 0 && (available > 0 || purchase_quantity > 0))
            .then_some(MixedSolution {
                transfer_quantity,
                purchase_quantity,
            });

        Some(ShortageSuggestion {
            variant_id: line.variant_id,
            requested_quantity: line.quantity,
            available_quantity: available,
            shortage_quantity: shortage,
            transfer_options,
            purchase_suggestion,
            mixed_solution,
        })
    }

    fn transfer_options(&self, store_id: StoreId, variant_id: VariantId) -> Vec<TransferOption> {
        let mut options: Vec<TransferOption> = self
            .view
            .holdings(variant_id)
            .into_iter()
            .filter(|(store, quantity)| *store != store_id && *quantity > 0)
            .map(|(store, quantity)| TransferOption {
                store_id: store,
                available_quantity: quantity,
            })
            .collect();

        options.sort_by(|a, b| {
            b.available_quantity
                .cmp(&a.available_quantity)
                .then_with(|| a.store_id.cmp(&b.store_id))
        });
        options
    }
}
