//! Postgres-backed inventory ledger.
//!
//! Persists the two write paths that must stay consistent under concurrent
//! writers: stock adjustments and variant cost aggregates. Each call runs in
//! its own sqlx transaction and locks the row it changes with
//! `SELECT ... FOR UPDATE`.
//!
//! ## Error Mapping
//!
//! | PostgreSQL code | Meaning | `PgLedgerError` |
//! |-----------------|---------|-----------------|
//! | `23505` | unique violation | `Domain(Conflict)` |
//! | `23514` | check violation (e.g. `quantity >= 0`) | `CheckViolation` |
//! | `23503` | foreign key violation | `Domain(ForeignKeyViolation)` |
//! | other / pool / io | | `Database` |

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{Span, info, instrument};

use fleetstock_core::{DomainError, Money, StoreId, VariantId};
use fleetstock_inventory::AdjustStock;
use fleetstock_products::{CostUpdate, ProductVariant};

use crate::error::EngineError;

/// Schema applied by [`PgInventoryLedger::apply_schema`].
pub const SCHEMA: &str = include_str!("../../../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum PgLedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("check constraint violated: {0}")]
    CheckViolation(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<PgLedgerError> for EngineError {
    fn from(err: PgLedgerError) -> Self {
        match err {
            PgLedgerError::Domain(e) => EngineError::Domain(e),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgInventoryLedger {
    pool: PgPool,
}

impl PgInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, PgLedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub async fn apply_schema(&self) -> Result<(), PgLedgerError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    /// Current quantity (0 when the row does not exist).
    pub async fn quantity(
        &self,
        store_id: StoreId,
        variant_id: VariantId,
    ) -> Result<i64, PgLedgerError> {
        let quantity = sqlx::query_scalar::<_, i64>(
            "SELECT quantity FROM inventory_stock WHERE store_id = $1 AND variant_id = $2",
        )
        .bind(store_id.as_uuid())
        .bind(variant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("quantity", e))?;
        Ok(quantity.unwrap_or(0))
    }

    /// Apply one stock adjustment and append its transaction row.
    ///
    /// Returns the resulting quantity.
    #[instrument(
        skip(self, command),
        fields(
            store_id = %command.store_id,
            variant_id = %command.variant_id,
            delta = command.delta,
            resulting_quantity = tracing::field::Empty
        ),
        err
    )]
    pub async fn adjust(&self, command: &AdjustStock) -> Result<i64, PgLedgerError> {
        if command.delta == 0 {
            return Err(DomainError::validation("stock adjustment delta cannot be zero").into());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO inventory_stock (store_id, variant_id, quantity)
            VALUES ($1, $2, 0)
            ON CONFLICT (store_id, variant_id) DO NOTHING
            "#,
        )
        .bind(command.store_id.as_uuid())
        .bind(command.variant_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_stock_row", e))?;

        let available = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT quantity FROM inventory_stock
            WHERE store_id = $1 AND variant_id = $2
            FOR UPDATE
            "#,
        )
        .bind(command.store_id.as_uuid())
        .bind(command.variant_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock_row", e))?;

        let resulting = available
            .checked_add(command.delta)
            .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;
        if resulting < 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::InsufficientStock {
                store_id: command.store_id,
                variant_id: command.variant_id,
                available,
                requested: -command.delta,
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE inventory_stock
            SET quantity = $3, updated_at = now()
            WHERE store_id = $1 AND variant_id = $2
            "#,
        )
        .bind(command.store_id.as_uuid())
        .bind(command.variant_id.as_uuid())
        .bind(resulting)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock_row", e))?;

        sqlx::query(
            r#"
            INSERT INTO inventory_transactions (
                store_id, variant_id, delta, resulting_quantity,
                reason, notes, metadata, actor, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(command.store_id.as_uuid())
        .bind(command.variant_id.as_uuid())
        .bind(command.delta)
        .bind(resulting)
        .bind(command.reason.as_str())
        .bind(command.notes.as_deref())
        .bind(command.metadata.as_ref())
        .bind(command.actor.as_uuid())
        .bind(command.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transaction", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("resulting_quantity", resulting);
        info!(reason = command.reason.as_str(), "stock adjusted");
        Ok(resulting)
    }

    /// Fold a received purchase line into the variant's cost aggregates.
    #[instrument(skip(self), fields(variant_id = %variant_id), err)]
    pub async fn update_cost_aggregates(
        &self,
        variant_id: VariantId,
        quantity: i64,
        line_total_cost: Money,
    ) -> Result<CostUpdate, PgLedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            SELECT sku, unit_price, total_purchased_quantity, total_cost_amount
            FROM product_variants
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(variant_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_variant_row", e))?
        .ok_or_else(|| DomainError::not_found(format!("variant {variant_id}")))?;

        let mut variant = ProductVariant::from_parts(
            variant_id,
            row.try_get("sku").map_err(|e| map_sqlx_error("decode_variant", e))?,
            Money::from_minor(
                row.try_get("unit_price")
                    .map_err(|e| map_sqlx_error("decode_variant", e))?,
            ),
            row.try_get("total_purchased_quantity")
                .map_err(|e| map_sqlx_error("decode_variant", e))?,
            Money::from_minor(
                row.try_get("total_cost_amount")
                    .map_err(|e| map_sqlx_error("decode_variant", e))?,
            ),
        )?;
        let update = variant.record_purchase(quantity, line_total_cost)?;

        sqlx::query(
            r#"
            UPDATE product_variants
            SET total_purchased_quantity = $2, total_cost_amount = $3, average_cost = $4
            WHERE id = $1
            "#,
        )
        .bind(variant_id.as_uuid())
        .bind(update.total_purchased_quantity)
        .bind(update.total_cost_amount.minor())
        .bind(update.average_cost.minor())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_variant_row", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        info!(average_cost = update.average_cost.minor(), "cost aggregates updated");
        Ok(update)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PgLedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => PgLedgerError::Domain(DomainError::conflict(msg)),
                Some("23503") => PgLedgerError::Domain(DomainError::foreign_key(msg)),
                Some("23514") => PgLedgerError::CheckViolation(msg),
                _ => PgLedgerError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            PgLedgerError::Database(format!("connection pool closed in {operation}"))
        }
        _ => PgLedgerError::Database(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetstock_core::UserId;
    use fleetstock_inventory::StockMovementReason;

    #[test]
    fn schema_declares_non_negative_stock() {
        assert!(SCHEMA.contains("CHECK (quantity >= 0)"));
        assert!(SCHEMA.contains("inventory_transactions"));
    }

    #[test]
    fn ledger_errors_keep_domain_errors_typed() {
        let err: EngineError = PgLedgerError::Domain(DomainError::conflict("dup")).into();
        assert_eq!(err.code(), "conflict");

        let err: EngineError = PgLedgerError::CheckViolation("quantity".into()).into();
        assert!(matches!(err, EngineError::Storage(_)));
    }

    // Runs only when DATABASE_URL points at a scratch database.
    #[test]
    fn adjust_rejects_overdraw_against_postgres() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let ledger = PgInventoryLedger::connect(&url).await.unwrap();
            ledger.apply_schema().await.unwrap();

            let store_id = StoreId::new();
            let variant_id = VariantId::new();
            sqlx::query("INSERT INTO stores (id, name) VALUES ($1, 'Test')")
                .bind(store_id.as_uuid())
                .execute(&ledger.pool)
                .await
                .unwrap();
            sqlx::query("INSERT INTO product_variants (id, sku, unit_price) VALUES ($1, $2, 0)")
                .bind(variant_id.as_uuid())
                .bind(variant_id.to_string())
                .execute(&ledger.pool)
                .await
                .unwrap();

            let mut command = AdjustStock {
                store_id,
                variant_id,
                delta: 5,
                reason: StockMovementReason::ManualAdjustment,
                notes: None,
                metadata: None,
                actor: UserId::new(),
                occurred_at: Utc::now(),
            };
            assert_eq!(ledger.adjust(&command).await.unwrap(), 5);

            command.delta = -6;
            let err = ledger.adjust(&command).await.unwrap_err();
            assert!(matches!(
                err,
                PgLedgerError::Domain(DomainError::InsufficientStock { available: 5, .. })
            ));
            assert_eq!(ledger.quantity(store_id, variant_id).await.unwrap(), 5);

            let update = ledger
                .update_cost_aggregates(variant_id, 10, Money::from_minor(1_333))
                .await
                .unwrap();
            assert_eq!(update.average_cost, Money::from_minor(133));
        });
    }
}
