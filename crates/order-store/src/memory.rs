use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    NewOrder, NewOrderItem, NewProduct, OrderFilter, OrderId, OrderItemRecord, OrderPage,
    OrderRecord, Product, ProductId, Result, StoreError, SubjectId, TrackingEventRecord,
    store::{OrderStore, StoreTransaction},
};

#[derive(Debug, Clone)]
struct StoredItem {
    id: i64,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price: rust_decimal::Decimal,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, OrderRecord>,
    items: Vec<StoredItem>,
    tracking: Vec<TrackingEventRecord>,
    next_product_id: i64,
    next_order_id: i64,
    next_item_id: i64,
    next_tracking_id: i64,
}

impl MemoryState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn newest_first(mut orders: Vec<OrderRecord>) -> Vec<OrderRecord> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }
}

/// In-memory order store implementation for testing.
///
/// This implementation keeps every table in memory and provides the same
/// interface as the PostgreSQL implementation. A transaction holds the only
/// lock on the whole state and works on a private copy, so transactions are
/// fully serialised and uncommitted writes are never observable.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_tracking: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures tracking inserts to fail, simulating an infrastructure
    /// fault in the middle of a transaction.
    pub fn set_fail_on_tracking(&self, fail: bool) {
        self.fail_on_tracking.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of order headers stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of order lines stored.
    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }

    /// Returns the number of tracking events stored.
    pub async fn tracking_event_count(&self) -> usize {
        self.state.lock().await.tracking.len()
    }

    /// Overwrites the stored shipping address text of an order.
    pub async fn corrupt_shipping_address(&self, id: OrderId, raw: &str) {
        if let Some(order) = self.state.lock().await.orders.get_mut(&id) {
            order.shipping_address = raw.to_string();
        }
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        *self.state.lock().await = MemoryState::default();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
            fail_on_tracking: self.fail_on_tracking.load(Ordering::SeqCst),
        }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.lock().await;
        let id = ProductId::new(MemoryState::next_id(&mut state.next_product_id));
        let product = Product {
            id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            category: product.category,
            image_url: product.image_url,
        };
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn get_order_for_subject(
        &self,
        subject_id: SubjectId,
        id: OrderId,
    ) -> Result<Option<OrderRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .get(&id)
            .filter(|o| o.subject_id == subject_id)
            .cloned())
    }

    async fn orders_for_subject(&self, subject_id: SubjectId) -> Result<Vec<OrderRecord>> {
        let state = self.state.lock().await;
        let orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.subject_id == subject_id)
            .cloned()
            .collect();
        Ok(MemoryState::newest_first(orders))
    }

    async fn list_orders(&self, filter: OrderFilter) -> Result<OrderPage> {
        let state = self.state.lock().await;
        let matching: Vec<_> = state
            .orders
            .values()
            .filter(|o| filter.status.as_deref().is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        let total = matching.len() as i64;

        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        let orders = MemoryState::newest_first(matching)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();

        Ok(OrderPage { orders, total })
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let state = self.state.lock().await;
        // Inner join semantics: lines whose product vanished are skipped
        let items = state
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .filter_map(|i| {
                let product = state.products.get(&i.product_id)?;
                Some(OrderItemRecord {
                    id: i.id,
                    order_id: i.order_id,
                    product_id: i.product_id,
                    quantity: i.quantity,
                    price: i.price,
                    product_name: product.name.clone(),
                    product_image: product.image_url.clone(),
                })
            })
            .collect();
        Ok(items)
    }

    async fn tracking_for_order(&self, order_id: OrderId) -> Result<Vec<TrackingEventRecord>> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .tracking
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }
}

/// Transaction handle for [`InMemoryOrderStore`].
///
/// Holds the store lock for its whole lifetime. Writes land in a private copy
/// that replaces the shared state on commit.
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
    fail_on_tracking: bool,
}

impl MemoryTransaction {
    fn state(&mut self) -> Result<&mut MemoryState> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state()?.products.get(&id).cloned())
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<bool> {
        let state = self.state()?;
        match state.products.get_mut(&id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let state = self.state()?;
        let id = OrderId::new(MemoryState::next_id(&mut state.next_order_id));
        let now = Utc::now();
        let record = OrderRecord {
            id,
            subject_id: order.subject_id,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            status: order.status,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<()> {
        let state = self.state()?;
        if !state.orders.contains_key(&item.order_id) {
            return Err(StoreError::OrderNotFound(item.order_id));
        }
        if !state.products.contains_key(&item.product_id) {
            return Err(StoreError::ProductNotFound(item.product_id));
        }
        let id = MemoryState::next_id(&mut state.next_item_id);
        state.items.push(StoredItem {
            id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        });
        Ok(())
    }

    async fn set_order_status(&mut self, id: OrderId, status: &str) -> Result<bool> {
        let state = self.state()?;
        match state.orders.get_mut(&id) {
            Some(order) => {
                order.status = status.to_string();
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_tracking_event(
        &mut self,
        order_id: OrderId,
        status: &str,
        description: &str,
    ) -> Result<TrackingEventRecord> {
        if self.fail_on_tracking {
            return Err(StoreError::Unavailable(
                "tracking insert rejected".to_string(),
            ));
        }
        let state = self.state()?;
        if !state.orders.contains_key(&order_id) {
            return Err(StoreError::OrderNotFound(order_id));
        }
        let event = TrackingEventRecord {
            id: MemoryState::next_id(&mut state.next_tracking_id),
            order_id,
            status: status.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        state.tracking.push(event.clone());
        Ok(event)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.guard.take().ok_or(StoreError::TransactionClosed)?;
        self.working = MemoryState::default();
        Ok(())
    }
}
