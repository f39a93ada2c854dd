use async_trait::async_trait;
use common::{OrderId, ProductId, SubjectId};

use crate::{
    NewOrder, NewOrderItem, NewProduct, OrderFilter, OrderItemRecord, OrderPage, OrderRecord,
    Product, Result, TrackingEventRecord,
};

/// Core trait for order store implementations.
///
/// Reads go straight to the store. Every write that must be atomic goes
/// through a [`StoreTransaction`] obtained from [`OrderStore::begin`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Opens a transaction.
    ///
    /// Nothing written through the handle is visible to other callers until
    /// [`StoreTransaction::commit`]. Dropping the handle without committing
    /// discards every write.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Retrieves a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts a catalog product and returns it with its assigned id.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Retrieves an order header by id, regardless of owner.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Retrieves an order header only if it belongs to `subject_id`.
    async fn get_order_for_subject(
        &self,
        subject_id: SubjectId,
        id: OrderId,
    ) -> Result<Option<OrderRecord>>;

    /// Retrieves all orders placed by a subject, newest first.
    async fn orders_for_subject(&self, subject_id: SubjectId) -> Result<Vec<OrderRecord>>;

    /// Retrieves a page of orders across all subjects, newest first.
    async fn list_orders(&self, filter: OrderFilter) -> Result<OrderPage>;

    /// Retrieves the lines of an order joined with current product data.
    ///
    /// Lines are returned in insertion order.
    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Retrieves the tracking trail of an order, oldest first.
    async fn tracking_for_order(&self, order_id: OrderId) -> Result<Vec<TrackingEventRecord>>;
}

/// A unit of work against the store.
///
/// Implementations roll back when dropped without a successful commit.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads a product and locks its row until the transaction ends.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Decrements stock only if at least `quantity` units remain.
    ///
    /// Returns false, leaving stock untouched, when the row is missing or
    /// holds fewer than `quantity` units.
    async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<bool>;

    /// Inserts an order header.
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord>;

    /// Inserts one order line.
    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<()>;

    /// Sets the status of an order. Returns false when the order is missing.
    async fn set_order_status(&mut self, id: OrderId, status: &str) -> Result<bool>;

    /// Appends an entry to an order's tracking trail.
    async fn append_tracking_event(
        &mut self,
        order_id: OrderId,
        status: &str,
        description: &str,
    ) -> Result<TrackingEventRecord>;

    /// Makes every write of this transaction visible.
    async fn commit(&mut self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(&mut self) -> Result<()>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Checks if a product exists.
    async fn product_exists(&self, id: ProductId) -> Result<bool> {
        Ok(self.get_product(id).await?.is_some())
    }

    /// Returns the current stock of a product, if it exists.
    async fn stock_of(&self, id: ProductId) -> Result<Option<i32>> {
        Ok(self.get_product(id).await?.map(|p| p.stock))
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
