//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SubjectId};
use order_store::{OrderItemRecord, OrderRecord, TrackingEventRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{OrderError, OrderStatus};

/// Shipping details captured at checkout.
///
/// Missing fields deserialize as empty strings and are rejected by
/// [`ShippingAddress::check`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[validate(length(min = 1, max = 512))]
    pub address: String,
    #[validate(length(min = 1, max = 255))]
    pub city: String,
    #[validate(length(min = 1, max = 255))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub zip_code: String,
}

impl ShippingAddress {
    /// Validates every field.
    pub fn check(&self) -> Result<(), OrderError> {
        self.validate()
            .map_err(|e| OrderError::InvalidShipping(e.to_string()))
    }

    /// Encodes the address the way it is stored on the order row.
    pub fn to_stored(&self) -> Result<String, OrderError> {
        serde_json::to_string(self).map_err(|e| OrderError::InvalidShipping(e.to_string()))
    }
}

/// Decodes a stored shipping address for display.
///
/// Malformed JSON yields `None` instead of failing the read.
pub fn decode_stored_shipping(order_id: OrderId, raw: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(order_id = %order_id, error = %e, "invalid JSON in shipping address");
            None
        }
    }
}

/// One requested line of a new order.
///
/// `price` is what the client believed the unit price to be; the server
/// price always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl LineItemRequest {
    pub fn new(id: ProductId, quantity: i64) -> Self {
        Self {
            id,
            quantity,
            price: None,
        }
    }
}

/// Result of a successful order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
}

/// Order header as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderId,
    pub user_id: SubjectId,
    pub total_amount: Decimal,
    pub shipping_address: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderRecord> for OrderSummary {
    fn from(record: OrderRecord) -> Self {
        Self {
            shipping_address: decode_stored_shipping(record.id, &record.shipping_address),
            id: record.id,
            user_id: record.subject_id,
            total_amount: record.total_amount,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// One line of a placed order with the product's current name and image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: i64,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Decimal,
    pub name: String,
    pub image: Option<String>,
}

impl From<OrderItemRecord> for OrderItemView {
    fn from(record: OrderItemRecord) -> Self {
        Self {
            id: record.id,
            product_id: record.product_id,
            quantity: record.quantity,
            price: record.price,
            name: record.product_name,
            image: record.product_image,
        }
    }
}

/// One entry of an order's tracking trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub id: i64,
    pub order_id: OrderId,
    pub status: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<TrackingEventRecord> for TrackingEvent {
    fn from(record: TrackingEventRecord) -> Self {
        Self {
            id: record.id,
            order_id: record.order_id,
            status: record.status,
            description: record.description,
            created_at: record.created_at,
        }
    }
}

/// A full order: header, lines and tracking trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub summary: OrderSummary,
    pub items: Vec<OrderItemView>,
    pub tracking: Vec<TrackingEvent>,
}

/// A page of the admin order listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListing {
    pub orders: Vec<OrderSummary>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}
