//! Cart and checkout endpoints.
//!
//! Authenticated callers always work on their user cart. Anonymous callers
//! get a cart keyed by a session id kept in the cookie-backed session.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartId, ProductId};
use domain::{CartView, Order, PaymentMethod, ShippingAddress};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::ApiError;
use crate::identity::{Authenticated, Identity};
use crate::routes::parse_id;
use crate::session::{cart_session, remember_cart_session};
use crate::state::{AppState, Backend};

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    pub shipping_address: ShippingAddress,
}

// -- Handlers --

/// POST /cart/add: add units of a product, accumulating onto the line.
#[tracing::instrument(skip_all)]
pub async fn add<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    session: Session,
    body: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<CartView>, ApiError> {
    let Json(req) = body?;
    let cart_id = current_cart(&state, actor.map(|a| a.subject_id), &session).await?;
    let view = state
        .carts
        .add_item(cart_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(view))
}

/// PUT /cart/update/{productId}: overwrite a line's quantity.
#[tracing::instrument(skip_all, fields(product_id = %product_id))]
pub async fn update<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    session: Session,
    Path(product_id): Path<String>,
    body: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<CartView>, ApiError> {
    let Json(req) = body?;
    let product_id = parse_id(&product_id, ProductId::parse)?;
    let cart_id = current_cart(&state, actor.map(|a| a.subject_id), &session).await?;
    let view = state
        .carts
        .update_item(cart_id, product_id, req.quantity)
        .await?;
    Ok(Json(view))
}

/// DELETE /cart/remove/{productId}: drop a line.
#[tracing::instrument(skip_all, fields(product_id = %product_id))]
pub async fn remove<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    session: Session,
    Path(product_id): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let product_id = parse_id(&product_id, ProductId::parse)?;
    let cart_id = current_cart(&state, actor.map(|a| a.subject_id), &session).await?;
    Ok(Json(state.carts.remove_item(cart_id, product_id).await?))
}

/// GET /cart: quote the cart at current prices.
#[tracing::instrument(skip_all)]
pub async fn get<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    session: Session,
) -> Result<Json<CartView>, ApiError> {
    let cart_id = current_cart(&state, actor.map(|a| a.subject_id), &session).await?;
    Ok(Json(state.carts.read_cart(cart_id).await?))
}

/// DELETE /cart/clear: empty the cart.
#[tracing::instrument(skip_all)]
pub async fn clear<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    session: Session,
) -> Result<Json<CartView>, ApiError> {
    let cart_id = current_cart(&state, actor.map(|a| a.subject_id), &session).await?;
    state.carts.clear(cart_id).await?;
    Ok(Json(CartView::empty(cart_id)))
}

/// POST /cart/checkout: turn the caller's user cart into an order.
///
/// Identity is checked before the body is read. The anonymous session cart,
/// if any, is a separate record and stays untouched.
#[tracing::instrument(skip_all)]
pub async fn checkout<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(req) = body?;
    let order = state
        .checkout
        .checkout(Some(&actor), req.shipping_address, req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Resolves the cart for this request, minting and remembering a session
/// for anonymous callers.
async fn current_cart<S: Backend>(
    state: &AppState<S>,
    user: Option<common::UserId>,
    session: &Session,
) -> Result<CartId, ApiError> {
    let stored = match user {
        Some(_) => None,
        None => cart_session(session).await?,
    };
    let resolved = state.carts.resolve_cart(user, stored).await?;

    if let Some(session_id) = resolved.session_id {
        if stored != Some(session_id) {
            remember_cart_session(session, session_id).await?;
        }
    }
    Ok(resolved.cart.id)
}
