//! Stock entry value.

use serde::{Deserialize, Serialize};

use crate::order::ProductId;

/// Units of a product currently available for reservation.
///
/// `available` is signed so that storage rows map onto it directly, but the
/// ledger never lets it drop below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub available: i64,
}

impl StockLevel {
    pub fn new(product_id: impl Into<ProductId>, available: i64) -> Self {
        Self {
            product_id: product_id.into(),
            available,
        }
    }

    /// Returns true if `quantity` units could be reserved right now.
    pub fn covers(&self, quantity: u32) -> bool {
        self.available >= i64::from(quantity)
    }
}
