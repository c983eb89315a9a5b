//! Domain model for order placement.
//!
//! This crate holds the pure types the saga moves around:
//! - value objects (`ProductId`, `Money`, `Currency`, `OrderItem`)
//! - the `Order` record and its `OrderStatus` state machine
//! - `StockLevel`, the observable value of a product's stock entry
//!
//! Nothing here performs I/O; persistence lives in the `store` crate.

pub mod order;
pub mod stock;

pub use common::{OrderId, ReservationToken, UserId};
pub use order::{
    CancellationReason, Currency, Money, Order, OrderError, OrderItem, OrderStatus, ProductId,
    StatusChange, order_total,
};
pub use stock::StockLevel;
