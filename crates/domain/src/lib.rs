//! Domain layer for the storefront.
//!
//! This crate provides:
//! - the client-held [`Cart`] aggregate and its persistence port
//! - the identity provider and capability checks
//! - the order transaction engine that turns a cart into an order
//! - the order query and tracking service

pub mod cart;
pub mod identity;
pub mod order;

pub use cart::{
    CART_STORAGE_KEY, Cart, CartLineItem, CartOverflow, CartProduct, CartStorage, CartStorageError,
    FileCartStorage, MemoryCartStorage, PersistentCart,
};
pub use common::{OrderId, ProductId, SubjectId};
pub use identity::{
    AuthError, HmacIdentityProvider, IdentityProvider, Role, Subject, require_role,
};
pub use order::{
    DEFAULT_TRANSACTION_TIMEOUT, ErrorKind, LineItemRequest, ListOrdersQuery, OrderEngine,
    OrderError, OrderItemView, OrderListing, OrderQueryService, OrderStatus, OrderSummary,
    OrderView, PlacedOrder, ShippingAddress, TrackingEvent,
};
