//! Order transaction engine.
//!
//! Turns a checkout request into an order header, its lines, a stock
//! decrement per product and the first tracking entry, all inside one store
//! transaction.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use common::{ProductId, SubjectId};
use order_store::{NewOrder, NewOrderItem, OrderStore, StoreTransaction};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::{LineItemRequest, OrderError, OrderStatus, PlacedOrder, ShippingAddress};
use crate::identity::{Role, Subject, require_role};

/// Default upper bound for one placement transaction.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(5000);

const ORDER_PLACED_STATUS: &str = "Order Placed";
const ORDER_PLACED_DESCRIPTION: &str = "Your order has been successfully placed";

/// A product line after merging and pricing.
struct PricedLine {
    product_id: ProductId,
    quantity: i32,
    unit_price: Decimal,
}

/// Places orders against an [`OrderStore`].
pub struct OrderEngine<S: OrderStore> {
    store: S,
    timeout: Duration,
}

impl<S: OrderStore> OrderEngine<S> {
    /// Creates an engine with the default transaction timeout.
    pub fn new(store: S) -> Self {
        Self::with_timeout(store, DEFAULT_TRANSACTION_TIMEOUT)
    }

    pub fn with_timeout(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Places an order for `subject`.
    ///
    /// Either every write lands or none does. Prices come from the catalog;
    /// client-supplied prices are ignored. The call is never retried.
    #[tracing::instrument(
        skip(self, subject, items, shipping),
        fields(subject_id = %subject.id, item_count = items.len())
    )]
    pub async fn place_order(
        &self,
        subject: &Subject,
        items: Vec<LineItemRequest>,
        shipping: &ShippingAddress,
    ) -> Result<PlacedOrder, OrderError> {
        let start = Instant::now();
        let result = self.try_place_order(subject, items, shipping).await;
        metrics::histogram!("order_placement_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(placed) => {
                metrics::counter!("orders_placed_total").increment(1);
                info!(order_id = %placed.order_id, total = %placed.total_amount, "Order placed");
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total", "kind" => e.kind().as_str())
                    .increment(1);
                warn!(error = %e, kind = %e.kind(), "Order rejected");
            }
        }

        result
    }

    async fn try_place_order(
        &self,
        subject: &Subject,
        items: Vec<LineItemRequest>,
        shipping: &ShippingAddress,
    ) -> Result<PlacedOrder, OrderError> {
        require_role(subject, Role::Customer)?;
        let lines = merge_lines(items)?;
        shipping.check()?;
        let stored_shipping = shipping.to_stored()?;

        match tokio::time::timeout(
            self.timeout,
            self.run_transaction(subject.id, lines, stored_shipping),
        )
        .await
        {
            Ok(result) => result,
            // The dropped future drops its transaction, which rolls back
            Err(_) => Err(OrderError::Timeout(self.timeout)),
        }
    }

    async fn run_transaction(
        &self,
        subject_id: SubjectId,
        lines: BTreeMap<ProductId, i32>,
        shipping: String,
    ) -> Result<PlacedOrder, OrderError> {
        let mut tx = self.store.begin().await?;
        let result = write_order(tx.as_mut(), subject_id, &lines, shipping).await;
        settle(tx, result).await
    }
}

/// Commits on success, rolls back on failure.
pub(crate) async fn settle<T>(
    mut tx: Box<dyn StoreTransaction>,
    result: Result<T, OrderError>,
) -> Result<T, OrderError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Merges duplicate products and checks quantities.
///
/// The map iterates in ascending product id order, which is also the order
/// rows get locked in.
fn merge_lines(items: Vec<LineItemRequest>) -> Result<BTreeMap<ProductId, i32>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    let mut merged: BTreeMap<ProductId, i64> = BTreeMap::new();
    for item in items {
        if item.quantity < 1 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.id,
                quantity: item.quantity,
            });
        }
        let entry = merged.entry(item.id).or_insert(0);
        *entry = entry.saturating_add(item.quantity);
    }

    merged
        .into_iter()
        .map(|(product_id, quantity)| {
            i32::try_from(quantity)
                .map(|q| (product_id, q))
                .map_err(|_| OrderError::InvalidQuantity {
                    product_id,
                    quantity,
                })
        })
        .collect()
}

async fn write_order(
    tx: &mut dyn StoreTransaction,
    subject_id: SubjectId,
    lines: &BTreeMap<ProductId, i32>,
    shipping: String,
) -> Result<PlacedOrder, OrderError> {
    let mut priced = Vec::with_capacity(lines.len());
    for (&product_id, &quantity) in lines {
        let product = tx
            .lock_product(product_id)
            .await?
            .ok_or(OrderError::ProductNotFound { product_id })?;

        if product.stock < quantity {
            return Err(OrderError::InsufficientStock {
                product_id,
                requested: quantity.into(),
                available: product.stock.into(),
            });
        }

        priced.push(PricedLine {
            product_id,
            quantity,
            unit_price: product.price,
        });
    }

    let total_amount = priced.iter().try_fold(Decimal::ZERO, |total, line| {
        line.unit_price
            .checked_mul(Decimal::from(line.quantity))
            .and_then(|line_total| total.checked_add(line_total))
            .ok_or(OrderError::TotalOverflow)
    })?;

    let order = tx
        .insert_order(NewOrder {
            subject_id,
            total_amount,
            shipping_address: shipping,
            status: OrderStatus::Pending.as_str().to_string(),
        })
        .await?;

    for line in &priced {
        tx.insert_order_item(NewOrderItem {
            order_id: order.id,
            product_id: line.product_id,
            quantity: line.quantity,
            price: line.unit_price,
        })
        .await?;

        if !tx.decrement_stock(line.product_id, line.quantity).await? {
            let available = tx
                .lock_product(line.product_id)
                .await?
                .map_or(0, |p| p.stock);
            return Err(OrderError::InsufficientStock {
                product_id: line.product_id,
                requested: line.quantity.into(),
                available: available.into(),
            });
        }
    }

    tx.append_tracking_event(order.id, ORDER_PLACED_STATUS, ORDER_PLACED_DESCRIPTION)
        .await?;

    Ok(PlacedOrder {
        order_id: order.id,
        status: OrderStatus::Pending,
        total_amount,
    })
}
