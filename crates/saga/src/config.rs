//! Saga tuning.

use std::time::Duration;

use domain::Currency;

use crate::retry::{Backoff, RetryPolicy};

/// Currency and per-call retry policies for the placement saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    /// Currency every order is priced in.
    pub currency: Currency,
    pub reserve: RetryPolicy,
    pub authorize: RetryPolicy,
    /// Releases get the largest budget: a release that gives up leaves units
    /// stranded until someone reconciles them.
    pub release: RetryPolicy,
    /// Order store writes. Confirm and cancel must land for the order to
    /// leave `Pending`.
    pub persist: RetryPolicy,
}

impl SagaConfig {
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Applies the same per-call timeout to every remote call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.reserve.call_timeout = call_timeout;
        self.authorize.call_timeout = call_timeout;
        self.release.call_timeout = call_timeout;
        self.persist.call_timeout = call_timeout;
        self
    }

    /// Removes backoff delays, for tests.
    pub fn without_backoff(mut self) -> Self {
        self.reserve.backoff = Backoff::None;
        self.authorize.backoff = Backoff::None;
        self.release.backoff = Backoff::None;
        self.persist.backoff = Backoff::None;
        self
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            currency: Currency::usd(),
            reserve: RetryPolicy::new(
                3,
                Backoff::Exponential {
                    base: Duration::from_millis(50),
                    max: Duration::from_millis(500),
                },
                Duration::from_secs(2),
            ),
            authorize: RetryPolicy::new(
                3,
                Backoff::Exponential {
                    base: Duration::from_millis(100),
                    max: Duration::from_secs(1),
                },
                Duration::from_secs(5),
            ),
            release: RetryPolicy::new(
                8,
                Backoff::Exponential {
                    base: Duration::from_millis(50),
                    max: Duration::from_secs(2),
                },
                Duration::from_secs(2),
            ),
            persist: RetryPolicy::new(
                5,
                Backoff::Exponential {
                    base: Duration::from_millis(20),
                    max: Duration::from_secs(1),
                },
                Duration::from_secs(5),
            ),
        }
    }
}
