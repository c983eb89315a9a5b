//! Remote service ports used by the saga and their in-memory adapters.

pub mod inventory;
pub mod payment;

pub use inventory::{
    InMemoryInventoryService, InventoryCall, InventoryError, InventoryService, ReleaseReceipt,
};
pub use payment::{Authorization, InMemoryPaymentService, PaymentError, PaymentService};
