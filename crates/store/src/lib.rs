//! Persistence for the order-placement core.
//!
//! Two ports, each with an in-memory and a PostgreSQL adapter:
//! - [`OrderStore`]: order records and their monotonic status transitions
//! - [`StockStore`]: per-product stock counters with token-tracked,
//!   atomic conditional reservations

pub mod error;
pub mod memory;
pub mod orders;
pub mod postgres;
pub mod stock;

pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryStockStore};
pub use orders::OrderStore;
pub use postgres::{PostgresOrderStore, PostgresStockStore, run_migrations};
pub use stock::{ReleaseOutcome, ReserveOutcome, StockStore};
