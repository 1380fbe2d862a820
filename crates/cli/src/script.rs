//! JSON operation scripts.
//!
//! A script is a list of operations replayed in order against one engine.
//! Records created by an operation can be bound to a name with `"as"` and
//! referenced by later operations; a raw UUID is accepted wherever a name is.
//!
//! ```json
//! { "operations": [
//!   { "op": "register_store", "name": "Downtown", "as": "dt" },
//!   { "op": "register_variant", "sku": "TEE-RED-M", "unit_price": "25.00", "as": "tee" },
//!   { "op": "adjust_inventory", "store": "dt", "variant": "tee", "action": "add", "quantity": 5 }
//! ] }
//! ```

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use fleetstock_core::{CustomerId, Money, OrderId, StoreId, TransferId, UserId, VariantId};
use fleetstock_infra::engine::{
    AdjustAction, AdjustInventory, CreateOrderRequest, RecordPurchase, RecordPurchaseItem,
    TransferRequest,
};
use fleetstock_infra::{EngineError, InventoryEngine};
use fleetstock_inventory::{HistoryFilter, HistoryScope, RequestedLine, StockMovementReason};
use fleetstock_sales::OrderLineInput;
use fleetstock_transfers::TransferStatus;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unknown reference '{0}'")]
    UnknownReference(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScriptError {
    pub fn code(&self) -> &'static str {
        match self {
            ScriptError::UnknownReference(_) => "unknown_reference",
            ScriptError::Engine(e) => e.code(),
            ScriptError::Serialization(_) => "serialization_error",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Acting user for every operation; a fresh id when omitted.
    #[serde(default)]
    pub actor: Option<Uuid>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineRef {
    pub variant: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseLineRef {
    pub variant: String,
    pub quantity: i64,
    pub cost_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRef {
    pub variant: String,
    pub quantity: i64,
    /// Minor units.
    pub price: i64,
    #[serde(default)]
    pub stocked: bool,
    #[serde(default)]
    pub backorder: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRef {
    pub from: String,
    pub to: String,
    pub variant: String,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    RegisterStore {
        name: String,
        #[serde(rename = "as")]
        bind: Option<String>,
    },
    RegisterVariant {
        sku: String,
        unit_price: Decimal,
        #[serde(rename = "as")]
        bind: Option<String>,
    },
    AdjustInventory {
        store: String,
        variant: String,
        action: AdjustAction,
        quantity: i64,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        metadata: Option<JsonValue>,
    },
    CheckAvailability {
        store: String,
        items: Vec<LineRef>,
    },
    RecordPurchase {
        store: String,
        #[serde(default)]
        shipping_cost: Decimal,
        items: Vec<PurchaseLineRef>,
        #[serde(rename = "as")]
        bind: Option<String>,
    },
    CreateOrder {
        store: String,
        #[serde(default)]
        customer: Option<Uuid>,
        items: Vec<OrderLineRef>,
        #[serde(default)]
        shipping_fee: i64,
        #[serde(default)]
        tax: i64,
        #[serde(default)]
        discount: i64,
        #[serde(rename = "as")]
        bind: Option<String>,
    },
    ShipOrder {
        order: String,
    },
    CompleteOrder {
        order: String,
    },
    CancelOrder {
        order: String,
        reason: String,
    },
    DeleteOrder {
        order: String,
    },
    AddPayment {
        order: String,
        amount: Decimal,
        method: String,
        #[serde(default)]
        notes: Option<String>,
    },
    RefundOrder {
        order: String,
        reason: String,
    },
    CreateTransfers {
        #[serde(default)]
        order: Option<String>,
        transfers: Vec<TransferRef>,
        /// One name per transfer, in order.
        #[serde(default, rename = "as")]
        bind: Vec<String>,
    },
    UpdateTransferStatus {
        transfer: String,
        status: TransferStatus,
        #[serde(default)]
        notes: Option<String>,
    },
    CancelTransfer {
        transfer: String,
        reason: String,
    },
    History {
        #[serde(default)]
        store: Option<String>,
        #[serde(default)]
        variant: Option<String>,
        #[serde(default)]
        reason: Option<StockMovementReason>,
    },
    Valuation {
        store: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RegisterStore { .. } => "register_store",
            Operation::RegisterVariant { .. } => "register_variant",
            Operation::AdjustInventory { .. } => "adjust_inventory",
            Operation::CheckAvailability { .. } => "check_availability",
            Operation::RecordPurchase { .. } => "record_purchase",
            Operation::CreateOrder { .. } => "create_order",
            Operation::ShipOrder { .. } => "ship_order",
            Operation::CompleteOrder { .. } => "complete_order",
            Operation::CancelOrder { .. } => "cancel_order",
            Operation::DeleteOrder { .. } => "delete_order",
            Operation::AddPayment { .. } => "add_payment",
            Operation::RefundOrder { .. } => "refund_order",
            Operation::CreateTransfers { .. } => "create_transfers",
            Operation::UpdateTransferStatus { .. } => "update_transfer_status",
            Operation::CancelTransfer { .. } => "cancel_transfer",
            Operation::History { .. } => "history",
            Operation::Valuation { .. } => "valuation",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Result line printed for each operation.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Replays operations against one engine, keeping the name bindings.
pub struct ScriptRunner<'a> {
    engine: &'a InventoryEngine,
    actor: UserId,
    names: HashMap<String, Uuid>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(engine: &'a InventoryEngine, actor: UserId) -> Self {
        Self {
            engine,
            actor,
            names: HashMap::new(),
        }
    }

    /// Run every operation; a failed operation is reported and the script
    /// carries on with the next one.
    pub fn run(&mut self, operations: &[Operation]) -> Vec<StepOutcome> {
        operations
            .iter()
            .enumerate()
            .map(|(idx, op)| {
                let step = idx + 1;
                match self.execute(op) {
                    Ok(result) => StepOutcome {
                        step,
                        op: op.name(),
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => {
                        debug!(step, op = op.name(), error = %err, "operation failed");
                        StepOutcome {
                            step,
                            op: op.name(),
                            result: None,
                            error: Some(ErrorBody {
                                code: err.code(),
                                message: err.to_string(),
                            }),
                        }
                    }
                }
            })
            .collect()
    }

    fn resolve(&self, reference: &str) -> Result<Uuid, ScriptError> {
        if let Some(id) = self.names.get(reference) {
            return Ok(*id);
        }
        Uuid::parse_str(reference).map_err(|_| ScriptError::UnknownReference(reference.to_string()))
    }

    fn store(&self, reference: &str) -> Result<StoreId, ScriptError> {
        self.resolve(reference).map(StoreId::from_uuid)
    }

    fn variant(&self, reference: &str) -> Result<VariantId, ScriptError> {
        self.resolve(reference).map(VariantId::from_uuid)
    }

    fn order(&self, reference: &str) -> Result<OrderId, ScriptError> {
        self.resolve(reference).map(OrderId::from_uuid)
    }

    fn transfer(&self, reference: &str) -> Result<TransferId, ScriptError> {
        self.resolve(reference).map(TransferId::from_uuid)
    }

    fn bind(&mut self, name: &Option<String>, id: Uuid) {
        if let Some(name) = name {
            self.names.insert(name.clone(), id);
        }
    }

    fn execute(&mut self, op: &Operation) -> Result<JsonValue, ScriptError> {
        let engine = self.engine;
        let actor = self.actor;

        let value = match op {
            Operation::RegisterStore { name, bind } => {
                let store = engine.register_store(name, actor)?;
                self.bind(bind, *store.id.as_uuid());
                serde_json::to_value(store)?
            }
            Operation::RegisterVariant {
                sku,
                unit_price,
                bind,
            } => {
                let variant = engine.register_variant(sku, *unit_price, actor)?;
                self.bind(bind, *variant.id_typed().as_uuid());
                serde_json::to_value(variant)?
            }
            Operation::AdjustInventory {
                store,
                variant,
                action,
                quantity,
                notes,
                metadata,
            } => {
                let request = AdjustInventory {
                    variant_id: self.variant(variant)?,
                    store_id: self.store(store)?,
                    action: *action,
                    quantity: *quantity,
                    notes: notes.clone(),
                    metadata: metadata.clone(),
                };
                serde_json::to_value(engine.adjust_inventory(&request, actor)?)?
            }
            Operation::CheckAvailability { store, items } => {
                let lines = items
                    .iter()
                    .map(|line| {
                        Ok(RequestedLine {
                            variant_id: self.variant(&line.variant)?,
                            quantity: line.quantity,
                        })
                    })
                    .collect::<Result<Vec<_>, ScriptError>>()?;
                serde_json::to_value(engine.check_stock_availability(self.store(store)?, &lines)?)?
            }
            Operation::RecordPurchase {
                store,
                shipping_cost,
                items,
                bind,
            } => {
                let request = RecordPurchase {
                    store_id: self.store(store)?,
                    shipping_cost: *shipping_cost,
                    items: items
                        .iter()
                        .map(|item| {
                            Ok(RecordPurchaseItem {
                                variant_id: self.variant(&item.variant)?,
                                quantity: item.quantity,
                                cost_price: item.cost_price,
                            })
                        })
                        .collect::<Result<Vec<_>, ScriptError>>()?,
                };
                let purchase = engine.record_purchase(&request, actor)?;
                self.bind(bind, *purchase.id_typed().as_uuid());
                serde_json::to_value(purchase)?
            }
            Operation::CreateOrder {
                store,
                customer,
                items,
                shipping_fee,
                tax,
                discount,
                bind,
            } => {
                let request = CreateOrderRequest {
                    store_id: self.store(store)?,
                    customer_id: customer.map(CustomerId::from_uuid),
                    items: items
                        .iter()
                        .map(|line| {
                            Ok(OrderLineInput {
                                variant_id: self.variant(&line.variant)?,
                                quantity: line.quantity,
                                price: Money::from_minor(line.price),
                                is_stocked_sale: line.stocked,
                                is_backorder: line.backorder,
                            })
                        })
                        .collect::<Result<Vec<_>, ScriptError>>()?,
                    shipping_fee: Money::from_minor(*shipping_fee),
                    tax: Money::from_minor(*tax),
                    discount: Money::from_minor(*discount),
                };
                let order = engine.create_order(&request, actor)?;
                self.bind(bind, *order.id_typed().as_uuid());
                serde_json::to_value(order)?
            }
            Operation::ShipOrder { order } => {
                serde_json::to_value(engine.ship_order(self.order(order)?, actor)?)?
            }
            Operation::CompleteOrder { order } => {
                serde_json::to_value(engine.complete_order(self.order(order)?, actor)?)?
            }
            Operation::CancelOrder { order, reason } => {
                serde_json::to_value(engine.cancel_order(self.order(order)?, reason, actor)?)?
            }
            Operation::DeleteOrder { order } => {
                let order_id = self.order(order)?;
                engine.delete_order(order_id, actor)?;
                serde_json::json!({ "deleted": order_id })
            }
            Operation::AddPayment {
                order,
                amount,
                method,
                notes,
            } => serde_json::to_value(engine.add_payment(
                self.order(order)?,
                *amount,
                method,
                notes.clone(),
                actor,
            )?)?,
            Operation::RefundOrder { order, reason } => {
                serde_json::to_value(engine.refund_order(self.order(order)?, reason, actor)?)?
            }
            Operation::CreateTransfers {
                order,
                transfers,
                bind,
            } => {
                let order_id = order.as_deref().map(|o| self.order(o)).transpose()?;
                let requests = transfers
                    .iter()
                    .map(|t| {
                        Ok(TransferRequest {
                            from_store: self.store(&t.from)?,
                            to_store: self.store(&t.to)?,
                            variant_id: self.variant(&t.variant)?,
                            quantity: t.quantity,
                            notes: t.notes.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, ScriptError>>()?;
                let created = engine.create_transfers_batch(&requests, order_id, actor)?;
                for (name, transfer) in bind.iter().zip(&created) {
                    self.names.insert(name.clone(), *transfer.id_typed().as_uuid());
                }
                serde_json::to_value(created)?
            }
            Operation::UpdateTransferStatus {
                transfer,
                status,
                notes,
            } => serde_json::to_value(engine.update_transfer_status(
                self.transfer(transfer)?,
                *status,
                notes.clone(),
                actor,
            )?)?,
            Operation::CancelTransfer { transfer, reason } => {
                serde_json::to_value(engine.cancel_transfer(self.transfer(transfer)?, reason, actor)?)?
            }
            Operation::History {
                store,
                variant,
                reason,
            } => {
                let store = store.as_deref().map(|s| self.store(s)).transpose()?;
                let variant = variant.as_deref().map(|v| self.variant(v)).transpose()?;
                let scope = match (store, variant) {
                    (Some(store), _) => HistoryScope::Store(store),
                    (None, Some(variant)) => HistoryScope::Variant(variant),
                    (None, None) => {
                        return Err(ScriptError::UnknownReference(
                            "history needs a store or a variant".to_string(),
                        ));
                    }
                };
                let filter = HistoryFilter {
                    variant_id: variant,
                    reason: *reason,
                    ..HistoryFilter::default()
                };
                let history = engine.history(scope, filter)?;
                serde_json::to_value(history.iter().collect::<Vec<_>>())?
            }
            Operation::Valuation { store } => {
                serde_json::to_value(engine.valuation(self.store(store)?)?)?
            }
        };

        Ok(value)
    }
}
