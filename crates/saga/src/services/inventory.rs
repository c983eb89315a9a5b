//! Inventory service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ReservationToken;
use domain::{ProductId, StockLevel};
use store::InMemoryStockStore;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::ledger::InventoryLedger;
use crate::retry::Transient;

/// Errors from the inventory service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    #[error("Inventory unavailable: {0}")]
    Unavailable(String),

    #[error("Inventory call timed out after {0:?}")]
    Timeout(Duration),
}

impl Transient for InventoryError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            InventoryError::Unavailable(_) | InventoryError::Timeout(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        InventoryError::Timeout(after)
    }
}

/// Result of a compensating release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReceipt {
    pub level: StockLevel,
    /// False when the release was a no-op: already released, or the
    /// reservation never took effect.
    pub restored: bool,
}

/// Stock reservation port.
///
/// Both operations are keyed by a [`ReservationToken`] so they are safe to
/// retry: a repeated `reserve` does not decrement twice and a repeated or
/// unmatched `release` does not credit stock that was never taken.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Decrements `available` by `quantity` if enough stock exists.
    async fn reserve(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError>;

    /// Returns the units held by `token` to `available`.
    async fn release(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseReceipt, InventoryError>;
}

/// A call observed by [`InMemoryInventoryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCall {
    Reserve {
        token: ReservationToken,
        product_id: ProductId,
        quantity: u32,
    },
    Release {
        token: ReservationToken,
        product_id: ProductId,
        quantity: u32,
    },
}

#[derive(Debug, Default)]
struct Faults {
    reserve_failures: HashMap<ProductId, u32>,
    lost_reserve_replies: HashMap<ProductId, u32>,
    release_failures: HashMap<ProductId, u32>,
    latency: Option<Duration>,
}

/// Consumes one injected fault for `product_id`. `u32::MAX` never runs out.
fn take_fault(faults: &mut HashMap<ProductId, u32>, product_id: &ProductId) -> bool {
    match faults.get_mut(product_id) {
        Some(remaining) if *remaining > 0 => {
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            true
        }
        _ => false,
    }
}

/// In-memory inventory service for testing.
///
/// Backed by a real [`InventoryLedger`] over an in-memory stock store, with
/// injectable faults and a journal of every call received.
#[derive(Clone)]
pub struct InMemoryInventoryService {
    ledger: InventoryLedger<InMemoryStockStore>,
    faults: Arc<Mutex<Faults>>,
    journal: Arc<Mutex<Vec<InventoryCall>>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service with no stock.
    pub fn new() -> Self {
        Self::with_ledger(InventoryLedger::new(InMemoryStockStore::new()))
    }

    /// Creates a service seeded with the given stock counts.
    pub fn with_stock<P: Into<ProductId>>(entries: impl IntoIterator<Item = (P, i64)>) -> Self {
        Self::with_ledger(InventoryLedger::new(InMemoryStockStore::with_stock(entries)))
    }

    fn with_ledger(ledger: InventoryLedger<InMemoryStockStore>) -> Self {
        Self {
            ledger,
            faults: Arc::default(),
            journal: Arc::default(),
        }
    }

    /// The ledger behind this service.
    pub fn ledger(&self) -> &InventoryLedger<InMemoryStockStore> {
        &self.ledger
    }

    /// Makes the next `times` reserve calls for `product_id` fail as
    /// unavailable without touching stock. `u32::MAX` fails forever.
    pub async fn fail_reserves(&self, product_id: impl Into<ProductId>, times: u32) {
        self.faults
            .lock()
            .await
            .reserve_failures
            .insert(product_id.into(), times);
    }

    /// Makes the next `times` reserve calls for `product_id` apply the
    /// reservation and then report a transport failure, as if the reply was
    /// lost on the way back.
    pub async fn lose_reserve_replies(&self, product_id: impl Into<ProductId>, times: u32) {
        self.faults
            .lock()
            .await
            .lost_reserve_replies
            .insert(product_id.into(), times);
    }

    /// Makes the next `times` release calls for `product_id` fail as
    /// unavailable without touching stock. `u32::MAX` fails forever.
    pub async fn fail_releases(&self, product_id: impl Into<ProductId>, times: u32) {
        self.faults
            .lock()
            .await
            .release_failures
            .insert(product_id.into(), times);
    }

    /// Delays every call by `latency` before it reaches the ledger.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().await.latency = latency;
    }

    /// Every call received, in arrival order.
    pub async fn calls(&self) -> Vec<InventoryCall> {
        self.journal.lock().await.clone()
    }

    /// Products named by release calls, in arrival order.
    pub async fn released_products(&self) -> Vec<ProductId> {
        self.journal
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                InventoryCall::Release { product_id, .. } => Some(product_id.clone()),
                InventoryCall::Reserve { .. } => None,
            })
            .collect()
    }

    /// Current available units, or `None` for an unknown product.
    pub async fn available(&self, product_id: impl Into<ProductId>) -> Option<i64> {
        self.ledger
            .stock_level(&product_id.into())
            .await
            .ok()
            .flatten()
            .map(|level| level.available)
    }

    /// Number of reservations currently held.
    pub async fn held_count(&self) -> usize {
        self.ledger.store().held_count().await
    }

    async fn delay(&self) {
        let latency = self.faults.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for InMemoryInventoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        self.journal.lock().await.push(InventoryCall::Reserve {
            token,
            product_id: product_id.clone(),
            quantity,
        });
        self.delay().await;

        let (fail, lose_reply) = {
            let mut faults = self.faults.lock().await;
            let fail = take_fault(&mut faults.reserve_failures, product_id);
            let lose_reply = !fail && take_fault(&mut faults.lost_reserve_replies, product_id);
            (fail, lose_reply)
        };

        if fail {
            return Err(InventoryError::Unavailable(format!(
                "injected reserve failure for {product_id}"
            )));
        }

        let result = self.ledger.reserve(token, product_id, quantity).await;
        if lose_reply {
            return Err(InventoryError::Unavailable(
                "connection reset before reply".to_string(),
            ));
        }
        result
    }

    async fn release(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseReceipt, InventoryError> {
        self.journal.lock().await.push(InventoryCall::Release {
            token,
            product_id: product_id.clone(),
            quantity,
        });
        self.delay().await;

        if take_fault(&mut self.faults.lock().await.release_failures, product_id) {
            return Err(InventoryError::Unavailable(format!(
                "injected release failure for {product_id}"
            )));
        }

        self.ledger.release(token, product_id, quantity).await
    }
}
