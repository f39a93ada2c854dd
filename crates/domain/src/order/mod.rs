//! Order placement, queries and tracking.

mod engine;
mod service;
mod status;
mod value_objects;

pub use engine::{DEFAULT_TRANSACTION_TIMEOUT, OrderEngine};
pub use service::{ListOrdersQuery, OrderQueryService};
pub use status::{OrderStatus, ParseStatusError};
pub use value_objects::{
    LineItemRequest, OrderItemView, OrderListing, OrderSummary, OrderView, PlacedOrder,
    ShippingAddress, TrackingEvent, decode_stored_shipping,
};

use std::time::Duration;

use common::{OrderId, ProductId};
use order_store::StoreError;
use thiserror::Error;

use crate::identity::AuthError;

/// Broad category of an [`OrderError`], preserved up to the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    Timeout,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Store => "store",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order request carried no line items.
    #[error("Order has no items")]
    EmptyCart,

    /// A line item quantity is below one or out of range.
    #[error("Invalid quantity {quantity} for product {product_id} (must be at least 1)")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// Shipping details are missing or malformed.
    #[error("Invalid shipping details: {0}")]
    InvalidShipping(String),

    /// The order total does not fit in a decimal.
    #[error("Order total is too large")]
    TotalOverflow,

    /// A status string names no known order status.
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// The subject is not authenticated or not allowed.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// A line item references an unknown product.
    #[error("Product with ID {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    /// Not enough stock to fulfil a line item.
    #[error(
        "Insufficient stock for product ID {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// The order does not exist or is not visible to the subject.
    #[error("Order not found")]
    OrderNotFound { order_id: OrderId },

    /// The placement transaction did not finish in time.
    #[error("Order placement timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyCart
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidShipping(_)
            | OrderError::TotalOverflow
            | OrderError::InvalidStatus(_) => ErrorKind::Validation,
            OrderError::Unauthorized(e) if e.is_forbidden() => ErrorKind::Forbidden,
            OrderError::Unauthorized(_) => ErrorKind::Auth,
            OrderError::ProductNotFound { .. } | OrderError::OrderNotFound { .. } => {
                ErrorKind::NotFound
            }
            OrderError::InsufficientStock { .. } => ErrorKind::Conflict,
            OrderError::Timeout(_) => ErrorKind::Timeout,
            OrderError::Store(StoreError::OrderNotFound(_))
            | OrderError::Store(StoreError::ProductNotFound(_)) => ErrorKind::NotFound,
            OrderError::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns the product the error is about, if any.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            OrderError::InvalidQuantity { product_id, .. }
            | OrderError::ProductNotFound { product_id }
            | OrderError::InsufficientStock { product_id, .. } => Some(*product_id),
            OrderError::Store(StoreError::ProductNotFound(product_id)) => Some(*product_id),
            _ => None,
        }
    }
}
