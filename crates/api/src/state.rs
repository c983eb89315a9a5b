//! Shared application state.

use saga::{InMemoryPaymentService, InventoryLedger, SagaCoordinator};
use sqlx::PgPool;

/// Backing storage, reported by the health check.
#[derive(Clone)]
pub enum Storage {
    Memory,
    Postgres(PgPool),
}

impl Storage {
    pub fn name(&self) -> &'static str {
        match self {
            Storage::Memory => "memory",
            Storage::Postgres(_) => "postgres",
        }
    }

    /// Checks that storage answers.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        match self {
            Storage::Memory => Ok(()),
            Storage::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        }
    }
}

/// Shared application state accessible from all handlers.
///
/// Payment runs on the in-process adapter; the ledger is reached through the
/// coordinator so restocks and reservations share one stock store.
pub struct AppState<O, S> {
    pub coordinator: SagaCoordinator<O, InventoryLedger<S>, InMemoryPaymentService>,
    pub storage: Storage,
}
