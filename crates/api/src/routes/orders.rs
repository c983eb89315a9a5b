//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{CancellationReason, Money, Order, OrderItem, OrderStatus};
use saga::PlaceOrder;
use serde::{Deserialize, Serialize};
use store::{OrderStore, StockStore};

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationReason>,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_total_cents: Option<i64>,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            line_total_cents: item.total_price().ok().map(|total| total.cents()),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            status: order.status,
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            total_cents: order.total_amount.cents(),
            currency: order.currency.to_string(),
            cancellation: order.cancellation,
            needs_reconciliation: order.needs_reconciliation,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// POST /orders: place an order and run the saga to completion.
#[tracing::instrument(skip(state, payload), fields(user_id, items))]
pub async fn place<O, S>(
    State(state): State<Arc<AppState<O, S>>>,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    O: OrderStore + 'static,
    S: StockStore + 'static,
{
    let Json(req) = payload?;
    let span = tracing::Span::current();
    span.record("user_id", req.user_id.as_str());
    span.record("items", req.items.len());

    let user_id = parse_user_id(&req.user_id)?;

    let request = req
        .items
        .iter()
        .fold(PlaceOrder::new(user_id), |request, item| {
            request.item(
                item.product_id.as_str(),
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            )
        });

    let order = state.coordinator.place_order(request).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<O, S>(
    State(state): State<Arc<AppState<O, S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    O: OrderStore + 'static,
    S: StockStore + 'static,
{
    let order_id = parse_order_id(&id)?;
    let order = state
        .coordinator
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {order_id}")))?;
    Ok(Json(order.into()))
}

/// GET /orders?user_id=: list a user's orders, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn list<O, S>(
    State(state): State<Arc<AppState<O, S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    O: OrderStore + 'static,
    S: StockStore + 'static,
{
    let raw = query
        .user_id
        .ok_or_else(|| ApiError::BadRequest("user_id query parameter is required".to_string()))?;
    let user_id = parse_user_id(&raw)?;

    let orders = state.coordinator.list_orders(user_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid user_id: {e}")))
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))
}
