//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::{Currency, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::retry::Transient;

/// The provider's answer to an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Authorization {
    Approved { authorization_id: String },
    Declined { reason: String },
}

impl Authorization {
    pub fn is_approved(&self) -> bool {
        matches!(self, Authorization::Approved { .. })
    }
}

/// Failures to obtain an answer from the provider.
///
/// A decline is an answer, not an error; see [`Authorization::Declined`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Payment provider timed out after {0:?}")]
    Timeout(Duration),
}

impl Transient for PaymentError {
    fn is_transient(&self) -> bool {
        true
    }

    fn timed_out(after: Duration) -> Self {
        PaymentError::Timeout(after)
    }
}

/// Payment authorization port.
///
/// `order_id` doubles as the idempotency key: authorizing the same order twice
/// must not hold funds twice, which is what makes retries safe.
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn authorize(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &Currency,
    ) -> Result<Authorization, PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    authorizations: HashMap<OrderId, (String, Money, Currency)>,
    next_id: u32,
    calls: u32,
    decline_reason: Option<String>,
    failures_remaining: u32,
    latency: Option<Duration>,
}

/// In-memory payment service for testing.
///
/// Approves by default. Can be told to decline, to fail a number of calls, or
/// to stall every call.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<Mutex<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every authorization with `reason`, or approves again on `None`.
    pub async fn set_decline(&self, reason: Option<&str>) {
        self.state.lock().await.decline_reason = reason.map(str::to_string);
    }

    /// Fails the next `times` calls as unavailable. `u32::MAX` fails forever.
    pub async fn fail_next(&self, times: u32) {
        self.state.lock().await.failures_remaining = times;
    }

    /// Delays every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Number of authorize calls received, including failed ones.
    pub async fn call_count(&self) -> u32 {
        self.state.lock().await.calls
    }

    /// Number of orders holding an approved authorization.
    pub async fn authorization_count(&self) -> usize {
        self.state.lock().await.authorizations.len()
    }

    /// Returns the authorization id held for an order.
    pub async fn authorization_for(&self, order_id: OrderId) -> Option<String> {
        self.state
            .lock()
            .await
            .authorizations
            .get(&order_id)
            .map(|(id, _, _)| id.clone())
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn authorize(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &Currency,
    ) -> Result<Authorization, PaymentError> {
        let latency = {
            let mut state = self.state.lock().await;
            state.calls += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;

        if state.failures_remaining > 0 {
            if state.failures_remaining != u32::MAX {
                state.failures_remaining -= 1;
            }
            return Err(PaymentError::Unavailable(
                "injected provider failure".to_string(),
            ));
        }

        if let Some(reason) = &state.decline_reason {
            return Ok(Authorization::Declined {
                reason: reason.clone(),
            });
        }

        if let Some((authorization_id, _, _)) = state.authorizations.get(&order_id) {
            return Ok(Authorization::Approved {
                authorization_id: authorization_id.clone(),
            });
        }

        state.next_id += 1;
        let authorization_id = format!("AUTH-{:04}", state.next_id);
        state.authorizations.insert(
            order_id,
            (authorization_id.clone(), amount, currency.clone()),
        );

        Ok(Authorization::Approved { authorization_id })
    }
}
