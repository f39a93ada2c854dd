//! Admin endpoints: order listing, tracking notes and catalog products.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId};
use domain::{ListOrdersQuery, OrderListing, Role, TrackingEvent, require_role};
use order_store::{NewProduct, OrderStore, Product};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::auth::AuthSubject;
use crate::error::ApiError;

/// Largest price the catalog schema stores, `NUMERIC(10, 2)`.
const MAX_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub status: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

impl CreateProductRequest {
    fn check(&self) -> Result<(), ApiError> {
        self.validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if self.price < Decimal::ZERO {
            return Err(ApiError::BadRequest(
                "price: must not be negative".to_string(),
            ));
        }
        if self.price > MAX_PRICE {
            return Err(ApiError::BadRequest(format!(
                "price: must not exceed {MAX_PRICE}"
            )));
        }
        Ok(())
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            category: product.category,
            image_url: product.image_url,
        }
    }
}

// -- Handlers --

/// GET /admin/orders: every subject's orders, filtered and paginated.
#[tracing::instrument(skip(state, subject, query), fields(subject_id = %subject.id))]
pub async fn list_orders<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<OrderListing>, ApiError> {
    let Query(query) = query?;
    let listing = state.orders.list_all_orders(&subject, query).await?;
    Ok(Json(listing))
}

/// POST /admin/orders/{id}/tracking: append a note to an order's trail.
#[tracing::instrument(skip(state, subject, id, payload), fields(subject_id = %subject.id))]
pub async fn add_tracking<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
    id: Result<Path<OrderId>, PathRejection>,
    payload: Result<Json<TrackingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TrackingEvent>), ApiError> {
    let Path(order_id) = id?;
    let Json(req) = payload?;

    let event = state
        .orders
        .append_tracking_event(&subject, order_id, &req.status, &req.description)
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /admin/products: add a product to the catalog.
#[tracing::instrument(skip(state, subject, payload), fields(subject_id = %subject.id))]
pub async fn create_product<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    require_role(&subject, Role::Admin)?;
    let Json(req) = payload?;
    req.check()?;

    let product = state
        .store
        .insert_product(NewProduct {
            name: req.name,
            description: req.description,
            price: req.price,
            stock: req.stock,
            category: req.category,
            image_url: req.image_url,
        })
        .await?;

    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product.into())))
}
