use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Order, StatusChange};

use crate::Result;

/// Order Record Store: persists orders with their line items.
///
/// Status changes are monotonic. Only a `Pending` order may change status,
/// and implementations must make that check and the write a single atomic
/// step so two writers cannot both move the same order.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order and its items atomically.
    ///
    /// Fails with `DuplicateOrder` if the id is already taken.
    async fn create(&self, order: &Order) -> Result<OrderId>;

    /// Moves an order to a new status and returns the updated record.
    ///
    /// Fails with `OrderNotFound` for unknown ids and `InvalidTransition` when
    /// the order is already terminal.
    async fn set_status(&self, order_id: OrderId, change: StatusChange) -> Result<Order>;

    /// Loads an order by id.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;
}
