//! Client-held shopping cart.
//!
//! The cart keeps at most one line per product and a total that is always
//! derived from its lines. It never talks to the catalog: the order engine
//! re-validates prices and stock when the cart is checked out.

mod storage;

pub use storage::{
    CART_STORAGE_KEY, CartStorage, CartStorageError, FileCartStorage, MemoryCartStorage,
    PersistentCart,
};

use common::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::LineItemRequest;

/// A cart total that does not fit in a [`Decimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cart total overflows")]
pub struct CartOverflow;

/// The product data a cart needs to add a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl CartLineItem {
    /// Returns unit price times quantity, or `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

fn total_of(items: &[CartLineItem]) -> Result<Decimal, CartOverflow> {
    items.iter().try_fold(Decimal::ZERO, |total, item| {
        item.line_total()
            .and_then(|line| total.checked_add(line))
            .ok_or(CartOverflow)
    })
}

/// Cart aggregate.
///
/// `total` equals the sum of `unit_price * quantity` over all lines after
/// every operation, including deserialisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    items: Vec<CartLineItem>,
    total: Decimal,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cart from untrusted lines.
    ///
    /// Lines for the same product are merged, lines with a zero quantity are
    /// dropped and the total is recomputed.
    pub fn from_items(
        items: impl IntoIterator<Item = CartLineItem>,
    ) -> Result<Self, CartOverflow> {
        let mut merged: Vec<CartLineItem> = Vec::new();
        for item in items.into_iter().filter(|i| i.quantity >= 1) {
            match merged
                .iter_mut()
                .find(|existing| existing.product_id == item.product_id)
            {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
                None => merged.push(item),
            }
        }
        let total = total_of(&merged)?;
        Ok(Self {
            items: merged,
            total,
        })
    }

    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of distinct products in the cart.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the quantity held for a product, if any.
    pub fn quantity_of(&self, product_id: ProductId) -> Option<u32> {
        self.items
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.quantity)
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    ///
    /// A quantity of zero counts as one. A missing product is ignored.
    pub fn add_item(&mut self, product: Option<&CartProduct>, quantity: u32) {
        let Some(product) = product else {
            return;
        };
        let quantity = quantity.max(1);

        self.apply(|items| match items.iter_mut().find(|i| i.product_id == product.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => items.push(CartLineItem {
                product_id: product.id,
                name: product.name.clone(),
                unit_price: product.price,
                quantity,
                image: product.image.clone(),
            }),
        });
    }

    /// Removes the line for a product. Absent products are ignored.
    pub fn remove_item(&mut self, product_id: ProductId) {
        self.apply(|items| items.retain(|i| i.product_id != product_id));
    }

    /// Replaces the quantity of a line.
    ///
    /// Quantities below one leave the cart unchanged; removal goes through
    /// [`Cart::remove_item`].
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i64) {
        let Ok(quantity) = u32::try_from(quantity) else {
            return;
        };
        if quantity < 1 {
            return;
        }
        self.apply(|items| {
            if let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) {
                item.quantity = quantity;
            }
        });
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.items.clear();
        self.total = Decimal::ZERO;
    }

    /// Returns the checkout payload for the order engine.
    pub fn to_line_items(&self) -> Vec<LineItemRequest> {
        self.items
            .iter()
            .map(|i| LineItemRequest {
                id: i.product_id,
                quantity: i64::from(i.quantity),
                price: Some(i.unit_price),
            })
            .collect()
    }

    /// Applies a change to the lines and recomputes the total.
    ///
    /// A change whose total would overflow is dropped and the cart keeps its
    /// previous state.
    fn apply(&mut self, change: impl FnOnce(&mut Vec<CartLineItem>)) {
        let mut items = self.items.clone();
        change(&mut items);
        match total_of(&items) {
            Ok(total) => {
                self.items = items;
                self.total = total;
            }
            Err(e) => tracing::warn!(error = %e, "cart change rejected"),
        }
    }
}

/// Stored shape of a cart. The stored total is ignored.
#[derive(Deserialize)]
struct StoredCart {
    #[serde(default)]
    items: Vec<StoredLine>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLine {
    product_id: ProductId,
    name: String,
    unit_price: Decimal,
    quantity: i64,
    #[serde(default)]
    image: Option<String>,
}

impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let stored = StoredCart::deserialize(deserializer)?;
        let lines = stored.items.into_iter().filter_map(|line| {
            let quantity = u32::try_from(line.quantity).ok()?;
            Some(CartLineItem {
                product_id: line.product_id,
                name: line.name,
                unit_price: line.unit_price,
                quantity,
                image: line.image,
            })
        });
        Cart::from_items(lines).map_err(serde::de::Error::custom)
    }
}
