//! Relational store for the storefront: catalog products, order headers,
//! order lines and tracking trails.
//!
//! Two implementations share the [`OrderStore`] interface: an in-memory store
//! for tests and local runs, and a PostgreSQL store for production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{OrderId, ProductId, SubjectId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, MemoryTransaction};
pub use postgres::{PgStoreTransaction, PostgresOrderStore};
pub use records::{
    NewOrder, NewOrderItem, NewProduct, OrderFilter, OrderItemRecord, OrderPage, OrderRecord,
    Product, TrackingEventRecord,
};
pub use store::{OrderStore, OrderStoreExt, StoreTransaction};
