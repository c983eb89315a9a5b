use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ReservationToken, UserId};
use domain::{Order, ProductId, StatusChange, StockLevel};
use tokio::sync::{Mutex, RwLock};

use crate::{
    OrderStore, Result, StoreError,
    stock::{ReleaseOutcome, ReserveOutcome, StockStore},
};

/// In-memory order store for tests and the storage-less server mode.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<OrderId> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(order.id)
    }

    async fn set_status(&self, order_id: OrderId, change: StatusChange) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let (from, to) = (order.status, change.status);
        order
            .apply(change)
            .map_err(|_| StoreError::InvalidTransition { order_id, from, to })?;
        Ok(order.clone())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut found: Vec<_> = orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Held,
    Released,
}

#[derive(Debug, Clone)]
struct Hold {
    product_id: ProductId,
    quantity: u32,
    state: HoldState,
}

#[derive(Debug, Default)]
struct StockState {
    stock: HashMap<ProductId, i64>,
    holds: HashMap<ReservationToken, Hold>,
}

impl StockState {
    fn level(&self, product_id: &ProductId) -> Option<StockLevel> {
        self.stock
            .get(product_id)
            .map(|available| StockLevel::new(product_id.clone(), *available))
    }
}

/// In-memory stock store.
///
/// Every operation runs inside one critical section over both the counters and
/// the token table, which gives the same atomicity a single-row conditional
/// `UPDATE` gives the PostgreSQL adapter.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<StockState>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with the given stock counts.
    pub fn with_stock<P: Into<ProductId>>(entries: impl IntoIterator<Item = (P, i64)>) -> Self {
        let stock = entries
            .into_iter()
            .map(|(product_id, available)| (product_id.into(), available.max(0)))
            .collect();
        Self {
            state: Arc::new(Mutex::new(StockState {
                stock,
                holds: HashMap::new(),
            })),
        }
    }

    /// Returns the number of reservations currently held (not released).
    pub async fn held_count(&self) -> usize {
        self.state
            .lock()
            .await
            .holds
            .values()
            .filter(|h| h.state == HoldState::Held)
            .count()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn reserve(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.holds.contains_key(&token) {
            return Ok(match state.level(product_id) {
                Some(level) => ReserveOutcome::AlreadyReserved(level),
                None => ReserveOutcome::UnknownProduct,
            });
        }

        let Some(available) = state.stock.get_mut(product_id) else {
            return Ok(ReserveOutcome::UnknownProduct);
        };

        let requested = i64::from(quantity);
        if *available < requested {
            return Ok(ReserveOutcome::Insufficient(StockLevel::new(
                product_id.clone(),
                *available,
            )));
        }

        *available -= requested;
        let level = StockLevel::new(product_id.clone(), *available);
        state.holds.insert(
            token,
            Hold {
                product_id: product_id.clone(),
                quantity,
                state: HoldState::Held,
            },
        );
        Ok(ReserveOutcome::Reserved(level))
    }

    async fn release(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(available) = state.stock.get_mut(product_id) else {
            return Ok(ReleaseOutcome::UnknownProduct);
        };

        let outcome = match state.holds.get_mut(&token) {
            Some(hold) if hold.product_id == *product_id && hold.quantity == quantity => {
                match hold.state {
                    HoldState::Held => {
                        hold.state = HoldState::Released;
                        *available += i64::from(quantity);
                        ReleaseOutcome::Released(StockLevel::new(product_id.clone(), *available))
                    }
                    HoldState::Released => ReleaseOutcome::AlreadyReleased(StockLevel::new(
                        product_id.clone(),
                        *available,
                    )),
                }
            }
            _ => ReleaseOutcome::NotReserved(StockLevel::new(product_id.clone(), *available)),
        };
        Ok(outcome)
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<StockLevel> {
        let mut state = self.state.lock().await;
        let available = state.stock.entry(product_id.clone()).or_insert(0);
        *available += i64::from(quantity);
        Ok(StockLevel::new(product_id.clone(), *available))
    }

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<StockLevel>> {
        Ok(self.state.lock().await.level(product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::{CancellationReason, Currency, Money, OrderItem, OrderStatus};

    fn pid(s: &str) -> ProductId {
        ProductId::new(s)
    }

    fn new_order(user_id: UserId) -> Order {
        Order::pending(
            OrderId::new(),
            user_id,
            vec![OrderItem::new("P1", 2, Money::from_cents(500))],
            Currency::usd(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_order() {
        let store = InMemoryOrderStore::new();
        let order = new_order(UserId::new());

        let id = store.create(&order).await.unwrap();
        assert_eq!(id, order.id);
        assert_eq!(store.get(id).await.unwrap(), Some(order));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = InMemoryOrderStore::new();
        let order = new_order(UserId::new());
        store.create(&order).await.unwrap();

        let result = store.create(&order).await;
        assert!(matches!(result, Err(StoreError::DuplicateOrder(id)) if id == order.id));
    }

    #[tokio::test]
    async fn test_set_status_is_monotonic() {
        let store = InMemoryOrderStore::new();
        let order = new_order(UserId::new());
        store.create(&order).await.unwrap();

        let confirmed = store
            .set_status(order.id, StatusChange::confirm())
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);

        let result = store
            .set_status(
                order.id,
                StatusChange::cancel(
                    CancellationReason::PaymentDeclined {
                        detail: "late".into(),
                    },
                    false,
                ),
            )
            .await;
        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition {
                from: OrderStatus::Confirmed,
                to: OrderStatus::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_set_status_unknown_order() {
        let store = InMemoryOrderStore::new();
        let result = store.set_status(OrderId::new(), StatusChange::confirm()).await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_user_filters_and_orders_newest_first() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new();

        let first = new_order(user);
        store.create(&first).await.unwrap();
        let mut second = new_order(user);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.create(&second).await.unwrap();
        store.create(&new_order(UserId::new())).await.unwrap();

        let listed = store.list_by_user(user).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_reserve_decrements_when_enough_stock() {
        let store = InMemoryStockStore::with_stock([("P1", 5)]);

        let outcome = store
            .reserve(ReservationToken::new(), &pid("P1"), 3)
            .await
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::Reserved(StockLevel::new("P1", 2)));
        assert_eq!(store.held_count().await, 1);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_leaves_stock_untouched() {
        let store = InMemoryStockStore::with_stock([("P1", 1)]);

        let outcome = store
            .reserve(ReservationToken::new(), &pid("P1"), 2)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReserveOutcome::Insufficient(StockLevel::new("P1", 1))
        );
        assert_eq!(store.held_count().await, 0);
    }

    #[tokio::test]
    async fn test_reserve_unknown_product() {
        let store = InMemoryStockStore::new();
        let outcome = store
            .reserve(ReservationToken::new(), &pid("NOPE"), 1)
            .await
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::UnknownProduct);
    }

    #[tokio::test]
    async fn test_reserve_same_token_twice_decrements_once() {
        let store = InMemoryStockStore::with_stock([("P1", 5)]);
        let token = ReservationToken::new();

        store.reserve(token, &pid("P1"), 2).await.unwrap();
        let again = store.reserve(token, &pid("P1"), 2).await.unwrap();

        assert_eq!(again, ReserveOutcome::AlreadyReserved(StockLevel::new("P1", 3)));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = InMemoryStockStore::with_stock([("P1", 5)]);
        let token = ReservationToken::new();
        store.reserve(token, &pid("P1"), 2).await.unwrap();

        let first = store.release(token, &pid("P1"), 2).await.unwrap();
        let second = store.release(token, &pid("P1"), 2).await.unwrap();

        assert_eq!(first, ReleaseOutcome::Released(StockLevel::new("P1", 5)));
        assert_eq!(
            second,
            ReleaseOutcome::AlreadyReleased(StockLevel::new("P1", 5))
        );
    }

    #[tokio::test]
    async fn test_release_without_reservation_does_not_over_credit() {
        let store = InMemoryStockStore::with_stock([("P1", 5)]);

        let outcome = store
            .release(ReservationToken::new(), &pid("P1"), 2)
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::NotReserved(StockLevel::new("P1", 5)));
    }

    #[tokio::test]
    async fn test_release_with_mismatched_quantity_is_rejected() {
        let store = InMemoryStockStore::with_stock([("P1", 5)]);
        let token = ReservationToken::new();
        store.reserve(token, &pid("P1"), 2).await.unwrap();

        let outcome = store.release(token, &pid("P1"), 4).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::NotReserved(StockLevel::new("P1", 3)));
    }

    #[tokio::test]
    async fn test_restock_creates_and_adds() {
        let store = InMemoryStockStore::new();
        assert_eq!(store.stock_level(&pid("P1")).await.unwrap(), None);

        store.restock(&pid("P1"), 4).await.unwrap();
        let level = store.restock(&pid("P1"), 1).await.unwrap();
        assert_eq!(level, StockLevel::new("P1", 5));
    }
}
