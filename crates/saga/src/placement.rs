//! The order placement request.

use common::UserId;
use domain::{Money, OrderError, OrderItem, ProductId, order_total};
use serde::{Deserialize, Serialize};

/// The saga type identifier, used as a tracing field.
pub const SAGA_TYPE: &str = "OrderPlacement";

/// Retry labels for the remote calls the saga makes.
pub const OP_RESERVE: &str = "reserve";
pub const OP_AUTHORIZE: &str = "authorize";
pub const OP_RELEASE: &str = "release";
pub const OP_PERSIST: &str = "persist";

/// One requested line item. The caller quotes the unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Request to place an order for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub user_id: UserId,
    pub items: Vec<PlaceOrderItem>,
}

impl PlaceOrder {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
        }
    }

    /// Appends a line item.
    pub fn item(mut self, product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        self.items.push(PlaceOrderItem {
            product_id: product_id.into(),
            quantity,
            unit_price,
        });
        self
    }

    /// Checks the request and converts it into order items.
    ///
    /// Rejects an empty item list, a zero quantity, a negative price, a blank
    /// product id and a total too large to represent. Duplicate product ids are allowed; each line is
    /// reserved separately.
    pub fn validate(&self) -> Result<Vec<OrderItem>, OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let items = self
            .items
            .iter()
            .map(|item| {
                let item = OrderItem::new(item.product_id.clone(), item.quantity, item.unit_price);
                item.validate()?;
                Ok(item)
            })
            .collect::<Result<Vec<_>, OrderError>>()?;
        order_total(&items)?;
        Ok(items)
    }
}
