//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CancellationReason;
use saga::{InventoryError, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order placement or lookup error.
    Saga(SagaError),
    /// Stock lookup or restock error.
    Inventory(InventoryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut order_id = None;
        let mut reason = None;

        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => {
                order_id = err.order_id();
                reason = err.cancellation_reason().map(CancellationReason::code);
                (saga_error_status(&err), err.to_string())
            }
            ApiError::Inventory(err) => (inventory_error_status(&err), err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let mut body = serde_json::json!({ "error": message });
        if let Some(order_id) = order_id {
            body["order_id"] = serde_json::json!(order_id);
        }
        if let Some(reason) = reason {
            body["reason"] = serde_json::json!(reason);
        }
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SagaError::ReservationFailed { reason, .. } | SagaError::PaymentFailed { reason, .. } => {
            cancellation_status(reason)
        }
        SagaError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SagaError::Store(_) | SagaError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cancellation_status(reason: &CancellationReason) -> StatusCode {
    match reason {
        CancellationReason::InsufficientStock { .. } => StatusCode::CONFLICT,
        CancellationReason::ProductNotFound { .. } => StatusCode::NOT_FOUND,
        CancellationReason::PaymentDeclined { .. } => StatusCode::PAYMENT_REQUIRED,
        CancellationReason::InventoryUnavailable { .. }
        | CancellationReason::PaymentUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn inventory_error_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. } => StatusCode::CONFLICT,
        InventoryError::Unavailable(_) | InventoryError::Timeout(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

/// Malformed or mistyped JSON bodies are client errors like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}
