//! Order read and fulfillment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::{OrderId, OrderItemId};
use domain::{HistoryEntry, ItemStatusUpdate, Order, OrderItem, Payment, ShipmentDetails};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Authenticated;
use crate::routes::parse_id;
use crate::state::{AppState, Backend};

// -- Request types --

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Handlers --

/// GET /orders: role-scoped listing.
#[tracing::instrument(skip_all)]
pub async fn list<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list(&actor).await?))
}

/// GET /orders/{id}: one order, as far as the caller may see it.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn get<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    Ok(Json(state.orders.get(&actor, order_id).await?))
}

/// POST /orders/{id}/ship: ship the order, with optional carrier data.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn ship<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    let details: ShipmentDetails = optional_json(&body)?;
    Ok(Json(state.orders.ship(&actor, order_id, details).await?))
}

/// POST /orders/{id}/deliver
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn deliver<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    Ok(Json(state.orders.deliver(&actor, order_id).await?))
}

/// POST /orders/{id}/cancel: cancel with a reason and restock.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn cancel<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(req) = body?;
    let order_id = parse_id(&id, OrderId::parse)?;
    Ok(Json(
        state.orders.cancel(&actor, order_id, &req.reason).await?,
    ))
}

/// PATCH /orders/items/{itemId}/status: move a single line item.
#[tracing::instrument(skip_all, fields(item_id = %id))]
pub async fn update_item_status<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
    body: Result<Json<ItemStatusUpdate>, JsonRejection>,
) -> Result<Json<OrderItem>, ApiError> {
    let Json(update) = body?;
    let item_id = parse_id(&id, OrderItemId::parse)?;
    Ok(Json(
        state
            .orders
            .update_item_status(&actor, item_id, update)
            .await?,
    ))
}

/// DELETE /orders/{id}: admin purge.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn delete<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    state.orders.delete(&actor, order_id).await?;
    Ok(Json(MessageResponse {
        message: format!("Order {order_id} deleted"),
    }))
}

/// GET /orders/{id}/payment
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn payment<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    Ok(Json(state.orders.payment(&actor, order_id).await?))
}

/// GET /orders/{id}/history: audit trail, oldest first.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn history<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let order_id = parse_id(&id, OrderId::parse)?;
    Ok(Json(state.orders.history(&actor, order_id).await?))
}

/// Decodes a JSON body that may be absent altogether.
fn optional_json<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}
