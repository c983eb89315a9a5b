//! Why a cancelled order was cancelled.

use serde::{Deserialize, Serialize};

use super::ProductId;

/// The failure that sent a placement saga to `Cancelled`.
///
/// Recorded on the order so that a stock shortfall, a declined card and a
/// payment outage stay distinguishable after the fact even though the saga
/// compensates all of them the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CancellationReason {
    /// A reservation failed the `available >= quantity` check.
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// A line item referenced a product the ledger does not know.
    ProductNotFound { product_id: ProductId },

    /// The inventory service could not be reached within the retry budget.
    InventoryUnavailable { product_id: ProductId, detail: String },

    /// The payment provider answered and refused the authorization.
    PaymentDeclined { detail: String },

    /// The payment provider could not be reached within the retry budget.
    PaymentUnavailable { detail: String },
}

impl CancellationReason {
    /// Short machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            CancellationReason::InsufficientStock { .. } => "insufficient_stock",
            CancellationReason::ProductNotFound { .. } => "product_not_found",
            CancellationReason::InventoryUnavailable { .. } => "inventory_unavailable",
            CancellationReason::PaymentDeclined { .. } => "payment_declined",
            CancellationReason::PaymentUnavailable { .. } => "payment_unavailable",
        }
    }

    /// The product whose reservation failed, for reservation-stage reasons.
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            CancellationReason::InsufficientStock { product_id, .. }
            | CancellationReason::ProductNotFound { product_id }
            | CancellationReason::InventoryUnavailable { product_id, .. } => Some(product_id),
            CancellationReason::PaymentDeclined { .. }
            | CancellationReason::PaymentUnavailable { .. } => None,
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::InsufficientStock {
                product_id,
                requested,
                available,
            } => write!(
                f,
                "insufficient stock for {product_id}: requested {requested}, available {available}"
            ),
            CancellationReason::ProductNotFound { product_id } => {
                write!(f, "product not found: {product_id}")
            }
            CancellationReason::InventoryUnavailable { product_id, detail } => {
                write!(f, "inventory unavailable for {product_id}: {detail}")
            }
            CancellationReason::PaymentDeclined { detail } => {
                write!(f, "payment declined: {detail}")
            }
            CancellationReason::PaymentUnavailable { detail } => {
                write!(f, "payment unavailable: {detail}")
            }
        }
    }
}
