//! The persisted order record.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{CancellationReason, Currency, Money, OrderError, OrderItem, OrderStatus, order_total};

/// A status transition requested by the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub reason: Option<CancellationReason>,
    /// Set when a compensating release could not be completed, leaving the
    /// ledger short of units that are not actually sold.
    pub needs_reconciliation: bool,
}

impl StatusChange {
    pub fn confirm() -> Self {
        Self {
            status: OrderStatus::Confirmed,
            reason: None,
            needs_reconciliation: false,
        }
    }

    pub fn cancel(reason: CancellationReason, needs_reconciliation: bool) -> Self {
        Self {
            status: OrderStatus::Cancelled,
            reason: Some(reason),
            needs_reconciliation,
        }
    }
}

/// An order and its line items.
///
/// Fields are public so storage adapters can rebuild records from rows; the
/// status must only change through [`Order::apply`], which enforces the
/// `Pending → Confirmed | Cancelled` state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub currency: Currency,
    pub status: OrderStatus,
    pub cancellation: Option<CancellationReason>,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new `Pending` order, validating every item and computing
    /// `total_amount = Σ quantity × unit_price`.
    pub fn pending(
        id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
        currency: Currency,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            item.validate()?;
        }
        let total_amount = order_total(&items)?;

        let now = Utc::now();
        Ok(Self {
            id,
            user_id,
            total_amount,
            items,
            currency,
            status: OrderStatus::Pending,
            cancellation: None,
            needs_reconciliation: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a status change, failing from a terminal status.
    pub fn apply(&mut self, change: StatusChange) -> Result<(), OrderError> {
        if !self.status.can_transition_to(change.status) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: change.status,
            });
        }

        self.status = change.status;
        self.cancellation = change.reason;
        self.needs_reconciliation = change.needs_reconciliation;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Total number of units across all line items.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}
