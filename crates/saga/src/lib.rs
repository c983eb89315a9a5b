//! Order-placement saga.
//!
//! Places a purchase order across inventory and payment without a shared
//! transaction:
//! 1. Reserve stock for each line item, in the order given
//! 2. Persist the order as `Pending`
//! 3. Authorize payment
//! 4. Confirm the order, or release every reserved item in reverse order and
//!    cancel it
//!
//! A release that still fails after its retries leaves the order `Cancelled`
//! with `needs_reconciliation` set and bumps a dedicated metric.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod placement;
pub mod reservation;
pub mod retry;
pub mod services;
pub mod state;
pub mod telemetry;

pub use config::SagaConfig;
pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError};
pub use ledger::InventoryLedger;
pub use placement::{PlaceOrder, PlaceOrderItem};
pub use reservation::{AttemptOutcome, ReservationAttempt, ReservationLog};
pub use retry::{Backoff, RetryPolicy, Transient};
pub use services::{
    Authorization, InMemoryInventoryService, InMemoryPaymentService, InventoryCall,
    InventoryError, InventoryService, PaymentError, PaymentService, ReleaseReceipt,
};
pub use state::PlacementState;
pub use telemetry::describe_metrics;
