//! Stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use domain::{ProductId, StockLevel};
use serde::{Deserialize, Serialize};
use store::{OrderStore, StockStore};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct StockLevelResponse {
    pub product_id: String,
    pub available: i64,
}

impl From<StockLevel> for StockLevelResponse {
    fn from(level: StockLevel) -> Self {
        Self {
            product_id: level.product_id.to_string(),
            available: level.available,
        }
    }
}

/// POST /inventory/{product_id}/restock: add units to a product.
#[tracing::instrument(skip(state, payload))]
pub async fn restock<O, S>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(product_id): Path<String>,
    payload: Result<Json<RestockRequest>, JsonRejection>,
) -> Result<Json<StockLevelResponse>, ApiError>
where
    O: OrderStore + 'static,
    S: StockStore + 'static,
{
    let Json(req) = payload?;
    let product_id = parse_product_id(&product_id)?;
    if req.quantity == 0 {
        return Err(ApiError::BadRequest(
            "quantity must be greater than zero".to_string(),
        ));
    }

    let level = state
        .coordinator
        .inventory()
        .restock(&product_id, req.quantity)
        .await?;
    Ok(Json(level.into()))
}

/// GET /inventory/{product_id}: current stock for a product.
#[tracing::instrument(skip(state))]
pub async fn get<O, S>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<StockLevelResponse>, ApiError>
where
    O: OrderStore + 'static,
    S: StockStore + 'static,
{
    let product_id = parse_product_id(&product_id)?;
    let level = state
        .coordinator
        .inventory()
        .stock_level(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))?;
    Ok(Json(level.into()))
}

fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("product_id must not be empty".to_string()));
    }
    Ok(ProductId::new(trimmed))
}
