//! Customer order endpoints and the admin status update.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{LineItemRequest, OrderView, PlacedOrder, ShippingAddress};
use order_store::OrderStore;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthSubject;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub shipping_details: ShippingAddress,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct StatusUpdatedResponse {
    pub message: &'static str,
}

// -- Handlers --

/// POST /orders: place an order from the caller's cart lines.
#[tracing::instrument(skip(state, subject, payload), fields(subject_id = %subject.id))]
pub async fn place<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let Json(req) = payload?;

    let placed = state
        .engine
        .place_order(&subject, req.items, &req.shipping_details)
        .await?;

    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /orders/my-orders: the caller's orders, newest first.
#[tracing::instrument(skip(state, subject), fields(subject_id = %subject.id))]
pub async fn mine<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let orders = state.orders.list_orders(&subject).await?;
    Ok(Json(orders))
}

/// GET /orders/{id}: one of the caller's orders.
#[tracing::instrument(skip(state, subject, id), fields(subject_id = %subject.id))]
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
    id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<OrderView>, ApiError> {
    let Path(order_id) = id?;
    let order = state.orders.get_order_detail(&subject, order_id).await?;
    Ok(Json(order))
}

/// PATCH /orders/{id}/status: move an order to a new status (admin).
#[tracing::instrument(skip(state, subject, id, payload), fields(subject_id = %subject.id))]
pub async fn update_status<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthSubject(subject): AuthSubject,
    id: Result<Path<OrderId>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<StatusUpdatedResponse>, ApiError> {
    let Path(order_id) = id?;
    let Json(req) = payload?;

    state
        .orders
        .update_status(&subject, order_id, &req.status)
        .await?;

    Ok(Json(StatusUpdatedResponse {
        message: "Order status updated",
    }))
}
