//! Inventory ledger: the stock authority behind the inventory port.

use async_trait::async_trait;
use common::ReservationToken;
use domain::{ProductId, StockLevel};
use store::{ReleaseOutcome, ReserveOutcome, StockStore, StoreError};

use crate::services::inventory::{InventoryError, InventoryService, ReleaseReceipt};

fn unavailable(err: StoreError) -> InventoryError {
    InventoryError::Unavailable(err.to_string())
}

/// Per-product stock counters with token-keyed reservations.
///
/// Correctness of concurrent reservations rests on [`StockStore::reserve`]
/// being a single conditional update; the ledger adds error mapping,
/// logging and metrics on top.
#[derive(Clone, Default)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: StockStore> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds units to a product, creating it if needed.
    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        let level = self
            .store
            .restock(product_id, quantity)
            .await
            .map_err(unavailable)?;
        tracing::info!(available = level.available, "product restocked");
        Ok(level)
    }

    pub async fn stock_level(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<StockLevel>, InventoryError> {
        self.store.stock_level(product_id).await.map_err(unavailable)
    }
}

#[async_trait]
impl<S: StockStore> InventoryService for InventoryLedger<S> {
    #[tracing::instrument(skip(self), fields(%token))]
    async fn reserve(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError> {
        let outcome = self
            .store
            .reserve(token, product_id, quantity)
            .await
            .map_err(unavailable)?;

        match outcome {
            ReserveOutcome::Reserved(level) => {
                metrics::counter!("inventory_reservations_total", "outcome" => "reserved")
                    .increment(1);
                tracing::debug!(available = level.available, "stock reserved");
                Ok(level)
            }
            ReserveOutcome::AlreadyReserved(level) => {
                metrics::counter!("inventory_reservations_total", "outcome" => "duplicate")
                    .increment(1);
                tracing::debug!("reservation token already applied");
                Ok(level)
            }
            ReserveOutcome::Insufficient(level) => {
                metrics::counter!("inventory_reservations_total", "outcome" => "insufficient")
                    .increment(1);
                Err(InventoryError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested: quantity,
                    available: level.available,
                })
            }
            ReserveOutcome::UnknownProduct => {
                metrics::counter!("inventory_reservations_total", "outcome" => "not_found")
                    .increment(1);
                Err(InventoryError::NotFound(product_id.clone()))
            }
        }
    }

    #[tracing::instrument(skip(self), fields(%token))]
    async fn release(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseReceipt, InventoryError> {
        let outcome = self
            .store
            .release(token, product_id, quantity)
            .await
            .map_err(unavailable)?;

        let (label, receipt) = match outcome {
            ReleaseOutcome::Released(level) => (
                "released",
                ReleaseReceipt {
                    level,
                    restored: true,
                },
            ),
            ReleaseOutcome::AlreadyReleased(level) => (
                "duplicate",
                ReleaseReceipt {
                    level,
                    restored: false,
                },
            ),
            ReleaseOutcome::NotReserved(level) => {
                tracing::debug!("no held reservation for token, nothing to release");
                (
                    "not_reserved",
                    ReleaseReceipt {
                        level,
                        restored: false,
                    },
                )
            }
            ReleaseOutcome::UnknownProduct => {
                metrics::counter!("inventory_releases_total", "outcome" => "not_found")
                    .increment(1);
                return Err(InventoryError::NotFound(product_id.clone()));
            }
        };

        metrics::counter!("inventory_releases_total", "outcome" => label).increment(1);
        Ok(receipt)
    }
}
