use std::collections::HashMap;

use async_trait::async_trait;
use common::{OrderId, ReservationToken, UserId};
use domain::{
    CancellationReason, Currency, Money, Order, OrderItem, OrderStatus, ProductId, StatusChange,
    StockLevel,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderStore, Result, StoreError,
    stock::{ReleaseOutcome, ReserveOutcome, StockStore},
};

/// Applies the schema migrations in `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(OrderItem {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::CorruptRow(format!("quantity out of range: {quantity}")))?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency")?;
        let cancellation: Option<serde_json::Value> = row.try_get("cancellation")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            items,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            currency: Currency::new(&currency)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
            status: status.parse().map_err(StoreError::CorruptRow)?,
            cancellation: cancellation
                .map(serde_json::from_value::<CancellationReason>)
                .transpose()?,
            needs_reconciliation: row.try_get("needs_reconciliation")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        status
            .map(|s| s.parse().map_err(StoreError::CorruptRow))
            .transpose()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<OrderId> {
        let cancellation = order
            .cancellation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_cents, currency, status, cancellation, needs_reconciliation, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.currency.as_str())
        .bind(order.status.as_str())
        .bind(cancellation)
        .bind(order.needs_reconciliation)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::DuplicateOrder(order.id);
            }
            StoreError::Database(e)
        })?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i64)
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order.id)
    }

    #[tracing::instrument(skip(self, change), fields(to = %change.status))]
    async fn set_status(&self, order_id: OrderId, change: StatusChange) -> Result<Order> {
        let to = change.status;
        if OrderStatus::Pending.can_transition_to(to) {
            let cancellation = change
                .reason
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;

            // The status guard in the WHERE clause makes check-and-write one step.
            let updated = sqlx::query(
                r#"
                UPDATE orders
                SET status = $2, cancellation = $3, needs_reconciliation = $4, updated_at = now()
                WHERE id = $1 AND status = 'PENDING'
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(to.as_str())
            .bind(cancellation)
            .bind(change.needs_reconciliation)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if updated == 1 {
                return self
                    .get(order_id)
                    .await?
                    .ok_or(StoreError::OrderNotFound(order_id));
            }
        }

        match self.current_status(order_id).await? {
            Some(from) => Err(StoreError::InvalidTransition { order_id, from, to }),
            None => Err(StoreError::OrderNotFound(order_id)),
        }
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, total_cents, currency, status, cancellation, needs_reconciliation, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Self::row_to_order(&row, items).map(Some)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, total_cents, currency, status, cancellation, needs_reconciliation, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items_by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_item(row)?);
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| {
                Self::row_to_order(row, items_by_order.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

/// PostgreSQL-backed stock store.
///
/// Reservations are tracked in `stock_reservations` keyed by token, written
/// in the same transaction as the counter change.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[tracing::instrument(skip(self))]
    async fn reserve(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        // Claim the token first; a concurrent request with the same token
        // blocks on the primary key until this transaction ends.
        let claimed = sqlx::query(
            r#"
            INSERT INTO stock_reservations (token, product_id, quantity, state)
            VALUES ($1, $2, $3, 'held')
            ON CONFLICT (token) DO NOTHING
            "#,
        )
        .bind(token.as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            tx.rollback().await?;
            return Ok(match self.stock_level(product_id).await? {
                Some(level) => ReserveOutcome::AlreadyReserved(level),
                None => ReserveOutcome::UnknownProduct,
            });
        }

        let available: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE stock
            SET available = available - $2, updated_at = now()
            WHERE product_id = $1 AND available >= $2
            RETURNING available
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *tx)
        .await?;

        match available {
            Some(available) => {
                tx.commit().await?;
                Ok(ReserveOutcome::Reserved(StockLevel::new(
                    product_id.clone(),
                    available,
                )))
            }
            None => {
                tx.rollback().await?;
                Ok(match self.stock_level(product_id).await? {
                    Some(level) => ReserveOutcome::Insufficient(level),
                    None => ReserveOutcome::UnknownProduct,
                })
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn release(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;

        let flipped = sqlx::query(
            r#"
            UPDATE stock_reservations
            SET state = 'released', released_at = now()
            WHERE token = $1 AND product_id = $2 AND quantity = $3 AND state = 'held'
            "#,
        )
        .bind(token.as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if flipped {
            let available: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE stock
                SET available = available + $2, updated_at = now()
                WHERE product_id = $1
                RETURNING available
                "#,
            )
            .bind(product_id.as_str())
            .bind(i64::from(quantity))
            .fetch_optional(&mut *tx)
            .await?;

            return match available {
                Some(available) => {
                    tx.commit().await?;
                    Ok(ReleaseOutcome::Released(StockLevel::new(
                        product_id.clone(),
                        available,
                    )))
                }
                None => {
                    tx.rollback().await?;
                    Ok(ReleaseOutcome::UnknownProduct)
                }
            };
        }

        let state: Option<String> = sqlx::query_scalar(
            "SELECT state FROM stock_reservations WHERE token = $1 AND product_id = $2",
        )
        .bind(token.as_uuid())
        .bind(product_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        tx.rollback().await?;

        let Some(level) = self.stock_level(product_id).await? else {
            return Ok(ReleaseOutcome::UnknownProduct);
        };
        Ok(match state.as_deref() {
            Some("released") => ReleaseOutcome::AlreadyReleased(level),
            _ => ReleaseOutcome::NotReserved(level),
        })
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<StockLevel> {
        let available: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock (product_id, available)
            VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE
            SET available = stock.available + EXCLUDED.available, updated_at = now()
            RETURNING available
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_one(&self.pool)
        .await?;

        Ok(StockLevel::new(product_id.clone(), available))
    }

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<StockLevel>> {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT available FROM stock WHERE product_id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(available.map(|a| StockLevel::new(product_id.clone(), a)))
    }
}
