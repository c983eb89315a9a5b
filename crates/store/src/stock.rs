use async_trait::async_trait;
use common::ReservationToken;
use domain::{ProductId, StockLevel};

use crate::Result;

/// Result of a conditional reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Stock was decremented and the token recorded as held.
    Reserved(StockLevel),
    /// The token has been seen before; nothing was decremented this time.
    AlreadyReserved(StockLevel),
    /// Fewer units are available than requested; nothing changed.
    Insufficient(StockLevel),
    /// No stock entry exists for the product.
    UnknownProduct,
}

/// Result of a compensating release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The held reservation was released and its units returned.
    Released(StockLevel),
    /// The reservation was already released; nothing changed.
    AlreadyReleased(StockLevel),
    /// No held reservation matches the token, product and quantity, so there
    /// is nothing to give back.
    NotReserved(StockLevel),
    /// No stock entry exists for the product.
    UnknownProduct,
}

/// Storage for per-product stock counters.
///
/// `reserve` must be a single atomic conditional update: decrement only if
/// `available >= quantity`, and record the token in the same step. A separate
/// read followed by a write would let concurrent buyers oversell.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn reserve(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome>;

    async fn release(
        &self,
        token: ReservationToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ReleaseOutcome>;

    /// Adds units to a product, creating the entry if needed.
    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<StockLevel>;

    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<StockLevel>>;
}
