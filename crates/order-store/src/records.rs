//! Row types exchanged with the store.
//!
//! Statuses travel as plain strings here; the domain layer owns their
//! meaning and validation.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, SubjectId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

/// Fields for inserting a catalog product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl NewProduct {
    /// Creates a product with only the fields the order path cares about.
    pub fn new(name: impl Into<String>, price: Decimal, stock: i32) -> Self {
        Self {
            name: name.into(),
            description: None,
            price,
            stock,
            category: None,
            image_url: None,
        }
    }

    /// Sets the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the image URL.
    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// An order header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub subject_id: SubjectId,
    pub total_amount: Decimal,
    /// Shipping address as stored: JSON text that may not parse.
    pub shipping_address: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting an order header.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub subject_id: SubjectId,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub status: String,
}

/// An order line joined with the product's current name and image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price frozen at order time.
    pub price: Decimal,
    pub product_name: String,
    pub product_image: Option<String>,
}

/// Fields for inserting an order line.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Decimal,
}

/// One entry of an order's tracking trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingEventRecord {
    pub id: i64,
    pub order_id: OrderId,
    pub status: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Filter for the admin order listing.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: 10,
            offset: 0,
        }
    }
}

/// A page of orders plus the total number of matching rows.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderRecord>,
    pub total: i64,
}
