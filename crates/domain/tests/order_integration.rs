//! Integration tests for order placement and queries.
//!
//! These tests drive the engine and the query service together against the
//! in-memory store and check the atomicity and isolation guarantees of the
//! order path.

use std::sync::Arc;

use domain::{
    Cart, CartProduct, ErrorKind, LineItemRequest, OrderEngine, OrderError, OrderQueryService,
    ShippingAddress, Subject, SubjectId,
};
use order_store::{InMemoryOrderStore, NewProduct, OrderStore, OrderStoreExt, Product};
use rust_decimal::Decimal;

fn shipping() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: "555-0100".to_string(),
        address: "12 Garden Row".to_string(),
        city: "London".to_string(),
        state: "LDN".to_string(),
        zip_code: "N1 9GU".to_string(),
    }
}

fn customer(id: i64) -> Subject {
    Subject::customer(SubjectId::new(id))
}

async fn add_product(store: &InMemoryOrderStore, name: &str, cents: i64, stock: i32) -> Product {
    store
        .insert_product(NewProduct::new(name, Decimal::new(cents, 2), stock))
        .await
        .unwrap()
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn cart_checkout_example() {
        let store = InMemoryOrderStore::new();
        let monstera = add_product(&store, "Monstera", 2999, 50).await;
        let engine = OrderEngine::new(store.clone());

        let mut cart = Cart::new();
        cart.add_item(
            Some(&CartProduct {
                id: monstera.id,
                name: monstera.name.clone(),
                price: monstera.price,
                image: None,
            }),
            2,
        );

        let placed = engine
            .place_order(&customer(1), cart.to_line_items(), &shipping())
            .await
            .unwrap();

        assert_eq!(placed.total_amount, Decimal::new(5998, 2));
        assert_eq!(store.stock_of(monstera.id).await.unwrap(), Some(48));

        let trail = store.tracking_for_order(placed.order_id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].status, "Order Placed");
        assert_eq!(trail[0].description, "Your order has been successfully placed");
    }

    #[tokio::test]
    async fn successful_placement_writes_expected_rows() {
        let store = InMemoryOrderStore::new();
        let a = add_product(&store, "A", 1000, 10).await;
        let b = add_product(&store, "B", 250, 10).await;
        let c = add_product(&store, "C", 75, 10).await;
        let engine = OrderEngine::new(store.clone());

        engine
            .place_order(
                &customer(1),
                vec![
                    LineItemRequest::new(a.id, 1),
                    LineItemRequest::new(b.id, 2),
                    LineItemRequest::new(c.id, 3),
                ],
                &shipping(),
            )
            .await
            .unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.order_item_count().await, 3);
        assert_eq!(store.tracking_event_count().await, 1);
        assert_eq!(store.stock_of(a.id).await.unwrap(), Some(9));
        assert_eq!(store.stock_of(b.id).await.unwrap(), Some(8));
        assert_eq!(store.stock_of(c.id).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn failure_on_second_item_rolls_back_everything() {
        let store = InMemoryOrderStore::new();
        let a = add_product(&store, "A", 1000, 10).await;
        let b = add_product(&store, "B", 250, 1).await;
        let c = add_product(&store, "C", 75, 10).await;
        let engine = OrderEngine::new(store.clone());

        let err = engine
            .place_order(
                &customer(1),
                vec![
                    LineItemRequest::new(a.id, 1),
                    LineItemRequest::new(b.id, 5),
                    LineItemRequest::new(c.id, 1),
                ],
                &shipping(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.product_id(), Some(b.id));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.order_item_count().await, 0);
        assert_eq!(store.tracking_event_count().await, 0);
        assert_eq!(store.stock_of(a.id).await.unwrap(), Some(10));
        assert_eq!(store.stock_of(b.id).await.unwrap(), Some(1));
        assert_eq!(store.stock_of(c.id).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn infrastructure_failure_mid_transaction_leaves_no_trace() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Fern", 1250, 4).await;
        store.set_fail_on_tracking(true);
        let engine = OrderEngine::new(store.clone());

        let err = engine
            .place_order(
                &customer(1),
                vec![LineItemRequest::new(product.id, 2)],
                &shipping(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.order_item_count().await, 0);
        assert_eq!(store.stock_of(product.id).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn admin_can_place_orders() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Fern", 1250, 4).await;
        let engine = OrderEngine::new(store.clone());

        let placed = engine
            .place_order(
                &Subject::admin(SubjectId::new(9)),
                vec![LineItemRequest::new(product.id, 1)],
                &shipping(),
            )
            .await;
        assert!(placed.is_ok());
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_units_go_to_exactly_one_buyer() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Rare Orchid", 9900, 2).await;
        let engine = Arc::new(OrderEngine::new(store.clone()));

        let handles: Vec<_> = (1..=2)
            .map(|buyer| {
                let engine = Arc::clone(&engine);
                let product_id = product.id;
                tokio::spawn(async move {
                    engine
                        .place_order(
                            &customer(buyer),
                            vec![LineItemRequest::new(product_id, 2)],
                            &shipping(),
                        )
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(OrderError::InsufficientStock { available, .. }) => {
                    assert_eq!(available, 0);
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.stock_of(product.id).await.unwrap(), Some(0));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stock_never_goes_negative_under_contention() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Seed Pack", 300, 10).await;
        let engine = Arc::new(OrderEngine::new(store.clone()));

        let handles: Vec<_> = (1..=25)
            .map(|buyer| {
                let engine = Arc::clone(&engine);
                let product_id = product.id;
                tokio::spawn(async move {
                    engine
                        .place_order(
                            &customer(buyer),
                            vec![LineItemRequest::new(product_id, 1)],
                            &shipping(),
                        )
                        .await
                        .is_ok()
                })
            })
            .collect();

        let mut placed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                placed += 1;
            }
        }

        assert_eq!(placed, 10);
        assert_eq!(store.stock_of(product.id).await.unwrap(), Some(0));
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn my_orders_are_newest_first_with_items_and_tracking() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Fern", 1250, 10).await;
        let engine = OrderEngine::new(store.clone());
        let service = OrderQueryService::new(store.clone());

        let first = engine
            .place_order(
                &customer(1),
                vec![LineItemRequest::new(product.id, 1)],
                &shipping(),
            )
            .await
            .unwrap();
        let second = engine
            .place_order(
                &customer(1),
                vec![LineItemRequest::new(product.id, 2)],
                &shipping(),
            )
            .await
            .unwrap();

        let orders = service.list_orders(&customer(1)).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].summary.id, second.order_id);
        assert_eq!(orders[1].summary.id, first.order_id);
        assert_eq!(orders[0].items[0].name, "Fern");
        assert_eq!(orders[0].items[0].price, Decimal::new(1250, 2));
        assert_eq!(orders[0].tracking[0].status, "Order Placed");
        assert_eq!(
            orders[0].summary.shipping_address.as_ref().unwrap()["city"],
            "London"
        );
    }

    #[tokio::test]
    async fn no_orders_is_an_empty_list() {
        let service = OrderQueryService::new(InMemoryOrderStore::new());
        let orders = service.list_orders(&customer(5)).await.unwrap();
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn another_subjects_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Fern", 1250, 10).await;
        let engine = OrderEngine::new(store.clone());
        let service = OrderQueryService::new(store.clone());

        let placed = engine
            .place_order(
                &customer(1),
                vec![LineItemRequest::new(product.id, 1)],
                &shipping(),
            )
            .await
            .unwrap();

        let err = service
            .get_order_detail(&customer(2), placed.order_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let own = service
            .get_order_detail(&customer(1), placed.order_id)
            .await
            .unwrap();
        assert_eq!(own.summary.user_id, SubjectId::new(1));
    }

    #[tokio::test]
    async fn status_change_shows_up_in_tracking_trail() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Fern", 1250, 10).await;
        let engine = OrderEngine::new(store.clone());
        let service = OrderQueryService::new(store.clone());

        let placed = engine
            .place_order(
                &customer(1),
                vec![LineItemRequest::new(product.id, 1)],
                &shipping(),
            )
            .await
            .unwrap();

        service
            .update_status(&Subject::admin(SubjectId::new(99)), placed.order_id, "shipped")
            .await
            .unwrap();

        let view = service
            .get_order_detail(&customer(1), placed.order_id)
            .await
            .unwrap();
        assert_eq!(view.summary.status, "shipped");
        let statuses: Vec<_> = view.tracking.iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["Order Placed", "Shipped"]);
    }

    #[tokio::test]
    async fn item_price_is_frozen_at_order_time() {
        let store = InMemoryOrderStore::new();
        let product = add_product(&store, "Fern", 1250, 10).await;
        let engine = OrderEngine::new(store.clone());
        let service = OrderQueryService::new(store.clone());

        let placed = engine
            .place_order(
                &customer(1),
                vec![LineItemRequest::new(product.id, 1)],
                &shipping(),
            )
            .await
            .unwrap();

        add_product(&store, "Fern", 9999, 10).await;

        let view = service
            .get_order_detail(&customer(1), placed.order_id)
            .await
            .unwrap();
        assert_eq!(view.items[0].price, Decimal::new(1250, 2));
        assert_eq!(view.items[0].product_id, product.id);
    }
}
