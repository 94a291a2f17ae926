//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, ProductId, ShopId};
use domain::Product;
use serde::Deserialize;
use services::NewProduct;

use crate::error::ApiError;
use crate::identity::Authenticated;
use crate::routes::parse_id;
use crate::state::{AppState, Backend};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    #[serde(default)]
    pub shop_id: Option<ShopId>,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

/// GET /products: every product that was not removed.
#[tracing::instrument(skip_all)]
pub async fn list<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.catalog.catalog().await?))
}

/// GET /products/{id}
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn get<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_id(&id, ProductId::parse)?;
    Ok(Json(state.catalog.product(product_id).await?))
}

/// POST /products: list a product for the caller's shop.
#[tracing::instrument(skip_all)]
pub async fn create<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(req) = body?;
    let product = state
        .catalog
        .create(
            &actor,
            NewProduct {
                name: req.name,
                price: Money::from_cents(req.price_cents),
                stock_quantity: req.stock_quantity,
                shop_id: req.shop_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /products/{id}/restock
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn restock<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
    body: Result<Json<RestockRequest>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Json(req) = body?;
    let product_id = parse_id(&id, ProductId::parse)?;
    Ok(Json(
        state
            .catalog
            .restock(&actor, product_id, req.quantity)
            .await?,
    ))
}

/// DELETE /products/{id}: soft delete.
#[tracing::instrument(skip_all, fields(product_id = %id))]
pub async fn remove<S: Backend>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(actor): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id = parse_id(&id, ProductId::parse)?;
    Ok(Json(state.catalog.remove(&actor, product_id).await?))
}
