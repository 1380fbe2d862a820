use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use fleetstock_core::{DomainError, Money, StoreId, UserId, VariantId};
use fleetstock_inventory::Store;
use fleetstock_products::ProductVariant;

use super::InventoryEngine;
use crate::error::EngineResult;

impl InventoryEngine {
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub fn register_store(&self, name: &str, actor: UserId) -> EngineResult<Store> {
        let store = Store::new(StoreId::new(), name)?;
        self.db.transaction(|tx| {
            tx.put_store(store.clone());
            Ok(())
        })?;

        info!(store_id = %store.id, name = %store.name, "store registered");
        Ok(store)
    }

    /// Register a variant; `unit_price` is in major units.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub fn register_variant(
        &self,
        sku: &str,
        unit_price: Decimal,
        actor: UserId,
    ) -> EngineResult<ProductVariant> {
        let variant = ProductVariant::new(VariantId::new(), sku, Money::from_major(unit_price)?)?;

        self.db
            .transaction(|tx| {
                if tx.tables().skus.contains_key(variant.sku()) {
                    return Err(DomainError::conflict(format!(
                        "sku '{}' is already registered",
                        variant.sku()
                    ))
                    .into());
                }
                tx.put_variant(variant.clone());
                Ok(())
            })
            .inspect_err(|e| warn!(error = %e, sku, "variant registration rejected"))?;

        info!(variant_id = %variant.id_typed(), sku = variant.sku(), "variant registered");
        Ok(variant)
    }

    pub fn store(&self, store_id: StoreId) -> EngineResult<Store> {
        Ok(self.db.read(|t| t.store(store_id).cloned())??)
    }

    pub fn variant(&self, variant_id: VariantId) -> EngineResult<ProductVariant> {
        Ok(self.db.read(|t| t.variant(variant_id).cloned())??)
    }

    pub fn variant_by_sku(&self, sku: &str) -> EngineResult<ProductVariant> {
        let found = self.db.read(|t| {
            t.skus
                .get(sku.trim())
                .and_then(|id| t.variants.get(id))
                .cloned()
        })?;
        Ok(found.ok_or_else(|| DomainError::not_found(format!("variant with sku '{sku}'")))?)
    }
}
