//! End-to-end tests through the service layer.
//!
//! Each test drives `InventoryEngine` the way a caller would and checks the
//! resulting rows, history and journal.
//!
//! Verifies:
//! - Stock never goes negative and every accepted movement leaves one history row
//! - Purchases prorate shipping and keep weighted average cost
//! - Order payments reconcile against the grand total
//! - Order cancellation/deletion cascades to linked transfers
//! - A rejected operation leaves no trace

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use fleetstock_core::{DomainError, Money, OrderId, StoreId, UserId, VariantId};
    use fleetstock_inventory::{
        HistoryFilter, HistoryScope, MixedSolution, RequestedLine, StockMovementReason,
        TransferOption,
    };
    use fleetstock_purchasing::{PurchaseLine, PurchaseStatus};
    use fleetstock_sales::{LineStatus, OrderLineInput, PaymentStatus, ShippingStatus};
    use fleetstock_transfers::TransferStatus;

    use crate::engine::{
        AdjustAction, AdjustInventory, CreateOrderRequest, InventoryEngine, RecordPurchase,
        RecordPurchaseItem, TransferRequest, stock_stream_id,
    };
    use crate::error::EngineError;
    use fleetstock_inventory::StockKey;

    struct Fixture {
        engine: InventoryEngine,
        actor: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: InventoryEngine::default(),
                actor: UserId::new(),
            }
        }

        fn store(&self, name: &str) -> StoreId {
            self.engine.register_store(name, self.actor).unwrap().id
        }

        fn variant(&self, sku: &str) -> VariantId {
            self.engine
                .register_variant(sku, Decimal::new(2_500, 2), self.actor)
                .unwrap()
                .id_typed()
        }

        fn stock(&self, store: StoreId, variant: VariantId, quantity: i64) {
            self.engine
                .adjust(
                    store,
                    variant,
                    quantity,
                    StockMovementReason::ManualAdjustment,
                    self.actor,
                )
                .unwrap();
        }

        fn quantity(&self, store: StoreId, variant: VariantId) -> i64 {
            self.engine.quantity(store, variant).unwrap()
        }

        fn order(&self, store: StoreId, lines: Vec<OrderLineInput>) -> OrderId {
            self.engine
                .create_order(
                    &CreateOrderRequest {
                        store_id: store,
                        customer_id: None,
                        items: lines,
                        shipping_fee: Money::ZERO,
                        tax: Money::ZERO,
                        discount: Money::ZERO,
                    },
                    self.actor,
                )
                .unwrap()
                .id_typed()
        }
    }

    fn stocked(variant_id: VariantId, quantity: i64, price: i64) -> OrderLineInput {
        OrderLineInput {
            variant_id,
            quantity,
            price: Money::from_minor(price),
            is_stocked_sale: true,
            is_backorder: false,
        }
    }

    fn backorder(variant_id: VariantId, quantity: i64, price: i64) -> OrderLineInput {
        OrderLineInput {
            variant_id,
            quantity,
            price: Money::from_minor(price),
            is_stocked_sale: false,
            is_backorder: true,
        }
    }

    fn transfer(from: StoreId, to: StoreId, variant: VariantId, quantity: i64) -> TransferRequest {
        TransferRequest {
            from_store: from,
            to_store: to,
            variant_id: variant,
            quantity,
            notes: None,
        }
    }

    fn domain(err: &EngineError) -> &DomainError {
        err.domain().expect("domain error")
    }

    // ---------------------------------------------------------------------
    // Purchasing and costing
    // ---------------------------------------------------------------------

    #[test]
    fn purchase_prorates_shipping_and_updates_average_cost() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        let cap = fx.variant("CAP-BLK");

        let purchase = fx
            .engine
            .record_purchase(
                &RecordPurchase {
                    store_id: store,
                    shipping_cost: Decimal::new(200, 2),
                    items: vec![
                        RecordPurchaseItem {
                            variant_id: tee,
                            quantity: 10,
                            cost_price: Decimal::new(1_000, 2),
                        },
                        RecordPurchaseItem {
                            variant_id: cap,
                            quantity: 5,
                            cost_price: Decimal::new(2_000, 2),
                        },
                    ],
                },
                fx.actor,
            )
            .unwrap();

        assert_eq!(purchase.status(), PurchaseStatus::Received);
        let allocated: Vec<i64> = purchase
            .items()
            .iter()
            .map(|i| i.allocated_shipping_cost.minor())
            .collect();
        assert_eq!(allocated, vec![133, 67]);
        assert_eq!(purchase.total_amount().unwrap(), Money::from_minor(20_200));

        // 10 * 1000 + 133 over 10 units; 5 * 2000 + 67 over 5 units.
        assert_eq!(fx.engine.variant(tee).unwrap().average_cost(), Money::from_minor(1_013));
        assert_eq!(fx.engine.variant(cap).unwrap().average_cost(), Money::from_minor(2_013));

        assert_eq!(fx.quantity(store, tee), 10);
        assert_eq!(fx.quantity(store, cap), 5);

        let receipts = fx
            .engine
            .history(
                HistoryScope::Store(store),
                HistoryFilter {
                    reason: Some(StockMovementReason::PurchaseReceipt),
                    ..HistoryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(receipts.iter().count(), 2);

        let stream = fx.engine.journal_stream(*purchase.id_typed().as_uuid()).unwrap();
        let types: Vec<&str> = stream.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["purchasing.purchase.created", "purchasing.purchase.received"]
        );
    }

    #[test]
    fn average_cost_is_weighted_across_purchases() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");

        for cost in [1_000, 1_200] {
            fx.engine
                .record_purchase(
                    &RecordPurchase {
                        store_id: store,
                        shipping_cost: Decimal::ZERO,
                        items: vec![RecordPurchaseItem {
                            variant_id: tee,
                            quantity: 10,
                            cost_price: Decimal::new(cost, 2),
                        }],
                    },
                    fx.actor,
                )
                .unwrap();
        }

        let variant = fx.engine.variant(tee).unwrap();
        assert_eq!(variant.total_purchased_quantity(), 20);
        assert_eq!(variant.total_cost_amount(), Money::from_minor(22_000));
        assert_eq!(variant.average_cost(), Money::from_minor(1_100));
        assert_eq!(fx.quantity(store, tee), 20);
    }

    #[test]
    fn pending_purchase_has_no_effect_until_received_once() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");

        let purchase = fx
            .engine
            .create_purchase(
                store,
                Money::from_minor(300),
                vec![PurchaseLine {
                    variant_id: tee,
                    quantity: 3,
                    cost_price: Money::from_minor(1_000),
                }],
                fx.actor,
            )
            .unwrap();
        assert_eq!(purchase.status(), PurchaseStatus::Pending);
        assert_eq!(fx.quantity(store, tee), 0);
        assert_eq!(fx.engine.variant(tee).unwrap().average_cost(), Money::ZERO);

        let received = fx
            .engine
            .receive_purchase(purchase.id_typed(), fx.actor)
            .unwrap();
        assert!(received.received_at().is_some());
        assert_eq!(fx.quantity(store, tee), 3);
        assert_eq!(fx.engine.variant(tee).unwrap().average_cost(), Money::from_minor(1_100));

        let err = fx
            .engine
            .receive_purchase(purchase.id_typed(), fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvariantViolation(_)));
        assert_eq!(fx.quantity(store, tee), 3);
    }

    #[test]
    fn purchase_for_unknown_variant_is_rejected_atomically() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        let journal_before = fx.engine.journal_len().unwrap();

        let err = fx
            .engine
            .record_purchase(
                &RecordPurchase {
                    store_id: store,
                    shipping_cost: Decimal::ZERO,
                    items: vec![
                        RecordPurchaseItem {
                            variant_id: tee,
                            quantity: 1,
                            cost_price: Decimal::ONE,
                        },
                        RecordPurchaseItem {
                            variant_id: VariantId::new(),
                            quantity: 1,
                            cost_price: Decimal::ONE,
                        },
                    ],
                },
                fx.actor,
            )
            .unwrap_err();

        assert!(matches!(domain(&err), DomainError::NotFound(_)));
        assert_eq!(fx.quantity(store, tee), 0);
        assert_eq!(fx.engine.journal_len().unwrap(), journal_before);
    }

    // ---------------------------------------------------------------------
    // Allocation planner
    // ---------------------------------------------------------------------

    #[test]
    fn shortage_fully_covered_by_transfer_is_not_mixed() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(b, tee, 50);

        let report = fx
            .engine
            .check_stock_availability(a, &[RequestedLine { variant_id: tee, quantity: 10 }])
            .unwrap();

        assert!(report.has_shortage);
        let suggestion = &report.suggestions[0];
        assert_eq!(suggestion.shortage_quantity, 10);
        assert_eq!(
            suggestion.transfer_options,
            vec![TransferOption {
                store_id: b,
                available_quantity: 50
            }]
        );
        assert!(suggestion.purchase_suggestion.is_none());
        assert!(suggestion.mixed_solution.is_none());
    }

    #[test]
    fn shortage_with_partial_local_stock_is_mixed() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(a, tee, 3);
        fx.stock(b, tee, 20);

        let report = fx
            .engine
            .check_stock_availability(a, &[RequestedLine { variant_id: tee, quantity: 10 }])
            .unwrap();

        let suggestion = &report.suggestions[0];
        assert_eq!(suggestion.available_quantity, 3);
        assert_eq!(suggestion.shortage_quantity, 7);
        assert_eq!(
            suggestion.mixed_solution,
            Some(MixedSolution {
                transfer_quantity: 7,
                purchase_quantity: 0
            })
        );
    }

    #[test]
    fn transfer_options_rank_by_quantity_then_store() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let stores: Vec<StoreId> = ["B", "C", "D"].iter().map(|n| fx.store(n)).collect();
        let tee = fx.variant("TEE-RED-M");
        fx.stock(stores[0], tee, 5);
        fx.stock(stores[1], tee, 20);
        fx.stock(stores[2], tee, 20);

        let report = fx
            .engine
            .check_stock_availability(a, &[RequestedLine { variant_id: tee, quantity: 100 }])
            .unwrap();

        let mut tied = vec![stores[1], stores[2]];
        tied.sort();
        let ranked: Vec<StoreId> = report.suggestions[0]
            .transfer_options
            .iter()
            .map(|o| o.store_id)
            .collect();
        assert_eq!(ranked, vec![tied[0], tied[1], stores[0]]);
        assert_eq!(
            report.suggestions[0]
                .purchase_suggestion
                .map(|p| p.suggested_quantity),
            Some(55)
        );
    }

    #[test]
    fn availability_check_rejects_unknown_store() {
        let fx = Fixture::new();
        let tee = fx.variant("TEE-RED-M");
        let err = fx
            .engine
            .check_stock_availability(StoreId::new(), &[RequestedLine { variant_id: tee, quantity: 1 }])
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::NotFound(_)));
    }

    // ---------------------------------------------------------------------
    // Orders and payments
    // ---------------------------------------------------------------------

    #[test]
    fn payments_reconcile_against_grand_total() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        let order_id = fx.order(store, vec![backorder(tee, 1, 100_000)]);

        let order = fx
            .engine
            .add_payment(order_id, Decimal::new(700, 0), "card", None, fx.actor)
            .unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Partial);
        assert_eq!(order.paid_amount(), Money::from_minor(70_000));

        let err = fx
            .engine
            .add_payment(order_id, Decimal::new(400, 0), "card", None, fx.actor)
            .unwrap_err();
        assert_eq!(
            domain(&err),
            &DomainError::OverpaymentRejected {
                amount: 40_000,
                remaining: 30_000
            }
        );

        let order = fx
            .engine
            .add_payment(order_id, Decimal::new(300, 0), "cash", None, fx.actor)
            .unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.paid_amount(), order.grand_total());
        assert!(order.paid_at().is_some());
        assert_eq!(order.payments().len(), 2);

        let err = fx
            .engine
            .add_payment(order_id, Decimal::ONE, "cash", None, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvariantViolation(_)));

        let refunded = fx
            .engine
            .refund_order(order_id, "damaged in transit", fx.actor)
            .unwrap();
        assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
        assert_eq!(refunded.paid_amount(), Money::from_minor(100_000));
        assert_eq!(refunded.payments().len(), 2);
    }

    #[test]
    fn fully_discounted_order_is_paid_on_creation() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");

        let order = fx
            .engine
            .create_order(
                &CreateOrderRequest {
                    store_id: store,
                    customer_id: None,
                    items: vec![backorder(tee, 1, 500)],
                    shipping_fee: Money::ZERO,
                    tax: Money::ZERO,
                    discount: Money::from_minor(500),
                },
                fx.actor,
            )
            .unwrap();
        assert_eq!(order.grand_total(), Money::ZERO);
        assert_eq!(
            order.payment_status() == PaymentStatus::Paid,
            order.paid_amount() == order.grand_total()
        );
        assert!(order.paid_at().is_some());
        assert_eq!(order.history().len(), 1);

        let err = fx
            .engine
            .add_payment(order.id_typed(), Decimal::ONE, "cash", None, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvariantViolation(_)));
    }

    #[test]
    fn stocked_sale_debits_the_order_store() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        let cap = fx.variant("CAP-BLK");
        fx.stock(store, tee, 5);

        fx.order(store, vec![stocked(tee, 3, 2_500), backorder(cap, 4, 1_500)]);
        assert_eq!(fx.quantity(store, tee), 2);
        assert_eq!(fx.quantity(store, cap), 0);

        let orders_before = fx.engine.database().read(|t| t.orders.len()).unwrap();
        let err = fx
            .engine
            .create_order(
                &CreateOrderRequest {
                    store_id: store,
                    customer_id: None,
                    items: vec![stocked(tee, 3, 2_500)],
                    shipping_fee: Money::ZERO,
                    tax: Money::ZERO,
                    discount: Money::ZERO,
                },
                fx.actor,
            )
            .unwrap_err();
        assert!(matches!(
            domain(&err),
            DomainError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }
        ));
        assert_eq!(fx.quantity(store, tee), 2);
        assert_eq!(
            fx.engine.database().read(|t| t.orders.len()).unwrap(),
            orders_before
        );

        let sales = fx
            .engine
            .history(
                HistoryScope::Variant(tee),
                HistoryFilter {
                    reason: Some(StockMovementReason::OrderSale),
                    ..HistoryFilter::default()
                },
            )
            .unwrap();
        let rows: Vec<_> = sales.iter().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delta, -3);
        assert!(rows[0].metadata.is_some());
    }

    #[test]
    fn order_totals_and_shipping_flow() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(store, tee, 10);

        let order = fx
            .engine
            .create_order(
                &CreateOrderRequest {
                    store_id: store,
                    customer_id: None,
                    items: vec![stocked(tee, 2, 2_500)],
                    shipping_fee: Money::from_minor(500),
                    tax: Money::from_minor(400),
                    discount: Money::from_minor(1_000),
                },
                fx.actor,
            )
            .unwrap();
        assert_eq!(order.subtotal(), Money::from_minor(5_000));
        assert_eq!(order.grand_total(), Money::from_minor(4_900));

        let shipped = fx.engine.ship_order(order.id_typed(), fx.actor).unwrap();
        assert_eq!(shipped.shipping_status(), ShippingStatus::Shipped);
        assert!(shipped.items().iter().all(|i| i.status == LineStatus::Shipped));

        let completed = fx.engine.complete_order(order.id_typed(), fx.actor).unwrap();
        assert_eq!(completed.shipping_status(), ShippingStatus::Completed);
        assert!(completed.items().iter().all(|i| i.status == LineStatus::Fulfilled));
        assert_eq!(completed.history().len(), 2);

        let err = fx
            .engine
            .cancel_order(order.id_typed(), "too late", fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidOrderTransition { .. }));
        assert_eq!(fx.quantity(store, tee), 8);
    }

    // ---------------------------------------------------------------------
    // Transfers and the order cascade
    // ---------------------------------------------------------------------

    #[test]
    fn transfer_movements_follow_status() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(b, tee, 10);

        let created = fx
            .engine
            .create_transfers_batch(&[transfer(b, a, tee, 4)], None, fx.actor)
            .unwrap();
        let id = created[0].id_typed();
        assert_eq!(fx.quantity(b, tee), 10);

        let err = fx
            .engine
            .update_transfer_status(id, TransferStatus::Completed, None, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidTransferTransition { .. }));

        fx.engine
            .update_transfer_status(id, TransferStatus::InTransit, Some("picked".into()), fx.actor)
            .unwrap();
        assert_eq!(fx.quantity(b, tee), 6);
        assert_eq!(fx.quantity(a, tee), 0);

        let done = fx
            .engine
            .update_transfer_status(id, TransferStatus::Completed, None, fx.actor)
            .unwrap();
        assert_eq!(done.status(), TransferStatus::Completed);
        assert_eq!(fx.quantity(a, tee), 4);

        let err = fx.engine.cancel_transfer(id, "oops", fx.actor).unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidTransferTransition { .. }));
    }

    #[test]
    fn cancelling_in_transit_transfer_returns_stock_to_source() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(b, tee, 10);

        let id = fx
            .engine
            .create_transfers_batch(&[transfer(b, a, tee, 4)], None, fx.actor)
            .unwrap()[0]
            .id_typed();
        fx.engine
            .update_transfer_status(id, TransferStatus::InTransit, None, fx.actor)
            .unwrap();
        assert_eq!(fx.quantity(b, tee), 6);

        let err = fx.engine.cancel_transfer(id, "  ", fx.actor).unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));

        let cancelled = fx
            .engine
            .cancel_transfer(id, "truck broke down", fx.actor)
            .unwrap();
        assert_eq!(cancelled.status(), TransferStatus::Cancelled);
        assert!(cancelled.notes().unwrap_or_default().contains("truck broke down"));
        assert_eq!(fx.quantity(b, tee), 10);
    }

    #[test]
    fn dispatch_revalidates_source_stock() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(b, tee, 5);

        let id = fx
            .engine
            .create_transfers_batch(&[transfer(b, a, tee, 5)], None, fx.actor)
            .unwrap()[0]
            .id_typed();
        fx.engine
            .adjust(b, tee, -3, StockMovementReason::ManualAdjustment, fx.actor)
            .unwrap();

        let err = fx
            .engine
            .update_transfer_status(id, TransferStatus::InTransit, None, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InsufficientStock { .. }));
        assert_eq!(fx.engine.transfer(id).unwrap().status(), TransferStatus::Pending);
        assert_eq!(fx.quantity(b, tee), 2);
    }

    #[test]
    fn batch_checks_cumulative_source_quantity() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let c = fx.store("C");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(b, tee, 5);

        let err = fx
            .engine
            .create_transfers_batch(&[transfer(b, a, tee, 3), transfer(b, c, tee, 3)], None, fx.actor)
            .unwrap_err();
        assert_eq!(
            domain(&err),
            &DomainError::InsufficientStock {
                store_id: b,
                variant_id: tee,
                available: 5,
                requested: 6
            }
        );
        assert_eq!(fx.engine.database().read(|t| t.transfers.len()).unwrap(), 0);

        let err = fx
            .engine
            .create_transfers_batch(&[], None, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));

        let err = fx
            .engine
            .create_transfers_batch(&[transfer(b, b, tee, 1)], None, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));

        let err = fx
            .engine
            .create_transfers_batch(&[transfer(b, a, tee, 1)], Some(OrderId::new()), fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::NotFound(_)));
    }

    #[test]
    fn cancelling_an_order_cascades_to_its_transfers() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(a, tee, 2);
        fx.stock(b, tee, 10);

        let order_id = fx.order(a, vec![stocked(tee, 2, 2_500)]);
        assert_eq!(fx.quantity(a, tee), 0);

        let transfers = fx
            .engine
            .create_transfers_batch(
                &[transfer(b, a, tee, 3), transfer(b, a, tee, 2), transfer(b, a, tee, 1)],
                Some(order_id),
                fx.actor,
            )
            .unwrap();
        let (pending, in_transit, completed) = (
            transfers[0].id_typed(),
            transfers[1].id_typed(),
            transfers[2].id_typed(),
        );
        for id in [in_transit, completed] {
            fx.engine
                .update_transfer_status(id, TransferStatus::InTransit, None, fx.actor)
                .unwrap();
        }
        fx.engine
            .update_transfer_status(completed, TransferStatus::Completed, None, fx.actor)
            .unwrap();
        assert_eq!(fx.quantity(b, tee), 7);
        assert_eq!(fx.quantity(a, tee), 1);
        assert_eq!(fx.engine.transfers_for_order(order_id).unwrap().len(), 3);

        let order = fx
            .engine
            .cancel_order(order_id, "customer changed their mind", fx.actor)
            .unwrap();
        assert_eq!(order.shipping_status(), ShippingStatus::Cancelled);
        assert!(order.items().iter().all(|i| i.status == LineStatus::Cancelled));

        assert_eq!(fx.engine.transfer(pending).unwrap().status(), TransferStatus::Cancelled);
        assert_eq!(fx.engine.transfer(in_transit).unwrap().status(), TransferStatus::Cancelled);
        assert_eq!(fx.engine.transfer(completed).unwrap().status(), TransferStatus::Completed);
        for id in [pending, in_transit, completed] {
            let t = fx.engine.transfer(id).unwrap();
            assert_eq!(t.order_id(), None);
            assert!(t.notes().unwrap_or_default().contains(&order_id.to_string()));
        }
        assert!(fx.engine.transfers_for_order(order_id).unwrap().is_empty());

        // Restocked sale plus the completed transfer; in-transit stock back at B.
        assert_eq!(fx.quantity(a, tee), 3);
        assert_eq!(fx.quantity(b, tee), 9);
    }

    #[test]
    fn deleting_a_pending_order_restocks_and_unlinks() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(a, tee, 4);
        fx.stock(b, tee, 10);

        let order_id = fx.order(a, vec![stocked(tee, 4, 2_500)]);
        let t = fx
            .engine
            .create_transfers_batch(&[transfer(b, a, tee, 2)], Some(order_id), fx.actor)
            .unwrap()[0]
            .id_typed();

        fx.engine.delete_order(order_id, fx.actor).unwrap();

        let err = fx.engine.order(order_id).unwrap_err();
        assert!(matches!(domain(&err), DomainError::NotFound(_)));
        let t = fx.engine.transfer(t).unwrap();
        assert_eq!(t.status(), TransferStatus::Cancelled);
        assert_eq!(t.order_id(), None);
        assert_eq!(fx.quantity(a, tee), 4);

        let deleted = fx
            .engine
            .history(
                HistoryScope::Store(a),
                HistoryFilter {
                    reason: Some(StockMovementReason::OrderDeleted),
                    ..HistoryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(deleted.iter().count(), 1);
    }

    #[test]
    fn order_row_cannot_be_removed_while_a_transfer_references_it() {
        let fx = Fixture::new();
        let a = fx.store("A");
        let b = fx.store("B");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(b, tee, 5);

        let order_id = fx.order(a, vec![backorder(tee, 2, 2_500)]);
        fx.engine
            .create_transfers_batch(&[transfer(b, a, tee, 2)], Some(order_id), fx.actor)
            .unwrap();

        let err = fx
            .engine
            .database()
            .transaction(|tx| Ok(tx.remove_order(order_id)?))
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::ForeignKeyViolation(_)));
        assert_eq!(err.http_status(), 422);
        assert!(fx.engine.order(order_id).is_ok());
        assert_eq!(fx.engine.transfers_for_order(order_id).unwrap().len(), 1);
    }

    #[test]
    fn deleting_a_shipped_order_keeps_stock_out() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(store, tee, 4);

        let order_id = fx.order(store, vec![stocked(tee, 4, 2_500)]);
        fx.engine.ship_order(order_id, fx.actor).unwrap();
        fx.engine.delete_order(order_id, fx.actor).unwrap();

        assert_eq!(fx.quantity(store, tee), 0);
    }

    #[test]
    fn cancelling_a_shipped_order_keeps_stock_out() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(store, tee, 4);

        let order_id = fx.order(store, vec![stocked(tee, 4, 2_500)]);
        fx.engine.ship_order(order_id, fx.actor).unwrap();
        let order = fx
            .engine
            .cancel_order(order_id, "lost by carrier", fx.actor)
            .unwrap();

        assert_eq!(order.shipping_status(), ShippingStatus::Cancelled);
        assert_eq!(fx.quantity(store, tee), 0);
        let restocked = fx
            .engine
            .history(
                HistoryScope::Store(store),
                HistoryFilter {
                    reason: Some(StockMovementReason::OrderCancelled),
                    ..HistoryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(restocked.iter().count(), 0);
    }

    // ---------------------------------------------------------------------
    // Manual adjustments, history, valuation, journal
    // ---------------------------------------------------------------------

    #[test]
    fn adjust_inventory_actions() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");

        let request = |action, quantity| AdjustInventory {
            variant_id: tee,
            store_id: store,
            action,
            quantity,
            notes: Some("cycle count".into()),
            metadata: Some(serde_json::json!({ "counted_by": "night shift" })),
        };

        let added = fx
            .engine
            .adjust_inventory(&request(AdjustAction::Add, 10), fx.actor)
            .unwrap();
        assert_eq!(added.quantity, 10);
        let row = added.transaction.unwrap();
        assert_eq!(row.notes.as_deref(), Some("cycle count"));
        assert_eq!(row.metadata.unwrap()["counted_by"], "night shift");

        let reduced = fx
            .engine
            .adjust_inventory(&request(AdjustAction::Reduce, 3), fx.actor)
            .unwrap();
        assert_eq!(reduced.quantity, 7);

        let set = fx
            .engine
            .adjust_inventory(&request(AdjustAction::Set, 12), fx.actor)
            .unwrap();
        assert_eq!(set.transaction.map(|t| t.delta), Some(5));

        let unchanged = fx
            .engine
            .adjust_inventory(&request(AdjustAction::Set, 12), fx.actor)
            .unwrap();
        assert!(unchanged.transaction.is_none());

        for (action, quantity) in [
            (AdjustAction::Add, 0),
            (AdjustAction::Reduce, -1),
            (AdjustAction::Set, -1),
        ] {
            let err = fx
                .engine
                .adjust_inventory(&request(action, quantity), fx.actor)
                .unwrap_err();
            assert!(matches!(domain(&err), DomainError::Validation(_)));
        }

        let err = fx
            .engine
            .adjust_inventory(&request(AdjustAction::Reduce, 13), fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InsufficientStock { .. }));

        let history = fx
            .engine
            .history(HistoryScope::Variant(tee), HistoryFilter::default())
            .unwrap();
        assert_eq!(history.iter().count(), 3);
        assert_eq!(history.iter().count(), 3);
    }

    #[test]
    fn valuation_uses_average_cost() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        let cap = fx.variant("CAP-BLK");
        fx.engine
            .record_purchase(
                &RecordPurchase {
                    store_id: store,
                    shipping_cost: Decimal::ZERO,
                    items: vec![
                        RecordPurchaseItem {
                            variant_id: tee,
                            quantity: 4,
                            cost_price: Decimal::new(1_000, 2),
                        },
                        RecordPurchaseItem {
                            variant_id: cap,
                            quantity: 2,
                            cost_price: Decimal::new(500, 2),
                        },
                    ],
                },
                fx.actor,
            )
            .unwrap();

        let valuation = fx.engine.valuation(store).unwrap();
        let skus: Vec<&str> = valuation.lines.iter().map(|l| l.sku.as_str()).collect();
        assert_eq!(skus, vec!["CAP-BLK", "TEE-RED-M"]);
        assert_eq!(valuation.total_value, Money::from_minor(5_000));
    }

    #[test]
    fn duplicate_sku_is_a_conflict() {
        let fx = Fixture::new();
        fx.variant("TEE-RED-M");
        let err = fx
            .engine
            .register_variant("TEE-RED-M", Decimal::ONE, fx.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::Conflict(_)));
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn stock_stream_sequences_are_gap_free() {
        let fx = Fixture::new();
        let store = fx.store("Downtown");
        let tee = fx.variant("TEE-RED-M");
        fx.stock(store, tee, 5);
        fx.stock(store, tee, -2);
        let rejected = fx
            .engine
            .adjust(store, tee, -10, StockMovementReason::ManualAdjustment, fx.actor);
        assert!(rejected.is_err());
        fx.stock(store, tee, 1);

        let stream = fx
            .engine
            .journal_stream(stock_stream_id(StockKey::new(store, tee)))
            .unwrap();
        let seqs: Vec<u64> = stream.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(stream.iter().all(|e| e.aggregate_type() == "inventory.stock_level"));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

        #[test]
        fn ledger_never_goes_negative(deltas in prop::collection::vec((-20i64..20).prop_filter("non-zero", |d| *d != 0), 1..30)) {
            let fx = Fixture::new();
            let store = fx.store("Downtown");
            let tee = fx.variant("TEE-RED-M");

            let mut expected = 0i64;
            let mut accepted = 0usize;
            for delta in deltas {
                let result = fx
                    .engine
                    .adjust(store, tee, delta, StockMovementReason::ManualAdjustment, fx.actor);
                if expected + delta < 0 {
                    prop_assert!(result.is_err());
                } else {
                    expected += delta;
                    accepted += 1;
                    prop_assert_eq!(result.unwrap(), expected);
                }
                prop_assert!(fx.quantity(store, tee) >= 0);
            }

            let history = fx
                .engine
                .history(HistoryScope::Store(store), HistoryFilter::default())
                .unwrap();
            prop_assert_eq!(history.iter().count(), accepted);
            prop_assert_eq!(history.iter().last().map(|r| r.resulting_quantity).unwrap_or(0), expected);
        }
    }
}
