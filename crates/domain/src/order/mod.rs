//! Order record, line items and the status state machine.

mod reason;
mod record;
mod state;
mod value_objects;

pub use reason::CancellationReason;
pub use record::{Order, StatusChange};
pub use state::OrderStatus;
pub use value_objects::{Currency, Money, OrderItem, ProductId, order_total};

use thiserror::Error;

/// Errors raised when building or mutating an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// An order must contain at least one line item.
    #[error("Order has no items")]
    NoItems,

    /// Line item quantities must be positive.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Unit prices must not be negative.
    #[error("Invalid price for {product_id}: {price} (must not be negative)")]
    InvalidPrice { product_id: ProductId, price: Money },

    /// Product identifiers must not be blank.
    #[error("Product ID must not be empty")]
    EmptyProductId,

    /// A line total or the order total does not fit in an `i64` of cents.
    #[error("Order amount overflows")]
    AmountOverflow,

    /// Currency codes are three upper-case ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// The status change is not allowed from the current status.
    #[error("Invalid transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
