//! Saga error types.

use std::time::Duration;

use common::OrderId;
use domain::{CancellationReason, OrderError, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

use crate::retry::Transient;

/// Errors returned by order placement.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was rejected before any side effect.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] OrderError),

    /// A line item could not be reserved. Earlier items were released and the
    /// order was recorded as cancelled.
    #[error("Reservation failed for order {order_id} on product {product_id}: {reason}")]
    ReservationFailed {
        order_id: OrderId,
        product_id: ProductId,
        reason: CancellationReason,
        needs_reconciliation: bool,
    },

    /// Payment was declined or unreachable. Every item was released and the
    /// order was cancelled.
    #[error("Payment failed for order {order_id}: {reason}")]
    PaymentFailed {
        order_id: OrderId,
        reason: CancellationReason,
        needs_reconciliation: bool,
    },

    /// The order store refused a status change. Indicates an ordering bug.
    #[error("Invalid transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Storage failed outside the business outcomes above.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// The saga task stopped before reaching a terminal status.
    #[error("Saga task aborted: {0}")]
    Aborted(String),
}

impl SagaError {
    /// The order the failure belongs to, when one was assigned.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            SagaError::ReservationFailed { order_id, .. }
            | SagaError::PaymentFailed { order_id, .. }
            | SagaError::InvalidTransition { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }

    /// The recorded cancellation reason for business failures.
    pub fn cancellation_reason(&self) -> Option<&CancellationReason> {
        match self {
            SagaError::ReservationFailed { reason, .. } | SagaError::PaymentFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }

    /// Returns true if the failure was a stock shortfall.
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(
            self.cancellation_reason(),
            Some(CancellationReason::InsufficientStock { .. })
        )
    }
}

impl From<StoreError> for SagaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidTransition { order_id, from, to } => {
                SagaError::InvalidTransition { order_id, from, to }
            }
            other => SagaError::Store(other),
        }
    }
}

/// Storage faults may clear on a repeated write. Missing rows, duplicates and
/// refused transitions are answers, not faults.
impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        !matches!(
            self,
            StoreError::OrderNotFound(_)
                | StoreError::DuplicateOrder(_)
                | StoreError::InvalidTransition { .. }
                | StoreError::Migration(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        StoreError::Timeout(after)
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
