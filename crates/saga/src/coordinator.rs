//! Saga coordinator for order placement.

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, UserId};
use domain::{CancellationReason, Order, OrderItem, OrderStatus, ProductId, StatusChange};
use store::{OrderStore, StoreError};
use tracing::Instrument;

use crate::config::SagaConfig;
use crate::error::SagaError;
use crate::placement::{self, PlaceOrder};
use crate::reservation::{AttemptOutcome, ReservationLog};
use crate::services::inventory::{InventoryError, InventoryService};
use crate::services::payment::{Authorization, PaymentService};
use crate::state::PlacementState;

/// Tracks the saga's state for one placement and logs every move.
struct Progress {
    order_id: OrderId,
    state: PlacementState,
}

impl Progress {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            state: PlacementState::default(),
        }
    }

    fn advance(&mut self, next: PlacementState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal saga transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(order_id = %self.order_id, from = %self.state, to = %next, "saga state changed");
        self.state = next;
    }
}

struct Inner<O, I, P> {
    orders: O,
    inventory: I,
    payment: P,
    config: SagaConfig,
}

/// Places orders across inventory, the order store and payment.
///
/// The coordinator reserves each line item in order, persists the order as
/// `Pending`, authorizes payment and confirms. Any failure after the first
/// reservation releases every held item in reverse order before the order is
/// cancelled. Cheap to clone; clones share the same services.
pub struct SagaCoordinator<O, I, P> {
    inner: Arc<Inner<O, I, P>>,
}

impl<O, I, P> Clone for SagaCoordinator<O, I, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O, I, P> SagaCoordinator<O, I, P>
where
    O: OrderStore + 'static,
    I: InventoryService + 'static,
    P: PaymentService + 'static,
{
    /// Creates a coordinator with default retry policies.
    pub fn new(orders: O, inventory: I, payment: P) -> Self {
        Self::with_config(orders, inventory, payment, SagaConfig::default())
    }

    pub fn with_config(orders: O, inventory: I, payment: P, config: SagaConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                orders,
                inventory,
                payment,
                config,
            }),
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.inner.config
    }

    pub fn orders(&self) -> &O {
        &self.inner.orders
    }

    pub fn inventory(&self) -> &I {
        &self.inner.inventory
    }

    pub fn payment(&self) -> &P {
        &self.inner.payment
    }

    /// Places an order and returns it `Confirmed`.
    ///
    /// Validation failures return before any side effect. Every other failure
    /// leaves stock compensated and, when an order was written, that order
    /// `Cancelled` with its reason.
    ///
    /// The saga runs on its own task: dropping the returned future does not
    /// stop it halfway, so stock is never left reserved by an abandoned
    /// request.
    #[tracing::instrument(
        skip(self, request),
        fields(saga_type = placement::SAGA_TYPE, user_id = %request.user_id, items = request.items.len())
    )]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order, SagaError> {
        let items = request.validate()?;
        let saga = self.clone();
        let user_id = request.user_id;

        tokio::spawn(async move { saga.run(user_id, items).await }.in_current_span())
            .await
            .map_err(|e| SagaError::Aborted(e.to_string()))?
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, SagaError> {
        Ok(self.inner.orders.get(order_id).await?)
    }

    /// Lists a user's orders, newest first.
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>, SagaError> {
        Ok(self.inner.orders.list_by_user(user_id).await?)
    }

    async fn run(&self, user_id: UserId, items: Vec<OrderItem>) -> Result<Order, SagaError> {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();
        let order_id = OrderId::new();
        let mut progress = Progress::new(order_id);
        let mut log = ReservationLog::new(&items);

        // 1. Reserve each line item in order
        progress.advance(PlacementState::Reserving);
        if let Err((product_id, reason)) = self.reserve_all(order_id, &mut log).await {
            progress.advance(PlacementState::Compensating);
            let needs_reconciliation = !self.compensate(order_id, &mut log).await;

            let result = self
                .record_cancelled(order_id, user_id, items, &reason, needs_reconciliation)
                .await;
            record_finished(started, Some(&reason));
            result?;
            progress.advance(PlacementState::Cancelled);

            return Err(SagaError::ReservationFailed {
                order_id,
                product_id,
                reason,
                needs_reconciliation,
            });
        }

        // 2. Persist the order as Pending
        progress.advance(PlacementState::Persisting);
        let order = match self.create_pending(order_id, user_id, items).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to persist order, releasing stock");
                progress.advance(PlacementState::Compensating);
                self.compensate(order_id, &mut log).await;
                progress.advance(PlacementState::Cancelled);
                record_finished(started, None);
                return Err(e);
            }
        };

        // 3. Authorize payment
        progress.advance(PlacementState::Paying);
        let config = &self.inner.config;
        let payment = config
            .authorize
            .run(placement::OP_AUTHORIZE, || {
                self.inner
                    .payment
                    .authorize(order_id, order.total_amount, &order.currency)
            })
            .await;

        let reason = match payment {
            Ok(Authorization::Approved { authorization_id }) => {
                // 4. Confirm
                let confirmed = match self.write_status(order_id, StatusChange::confirm()).await {
                    Ok(order) => order,
                    Err(e) => {
                        record_finished(started, None);
                        return Err(stranded(order_id, OrderStatus::Confirmed, e));
                    }
                };
                progress.advance(PlacementState::Confirmed);
                record_finished(started, None);
                metrics::counter!("saga_confirmed_total").increment(1);
                tracing::info!(
                    %order_id,
                    %authorization_id,
                    total_cents = confirmed.total_amount.cents(),
                    duration = started.elapsed().as_secs_f64(),
                    "order confirmed"
                );
                return Ok(confirmed);
            }
            Ok(Authorization::Declined { reason }) => {
                CancellationReason::PaymentDeclined { detail: reason }
            }
            Err(e) => CancellationReason::PaymentUnavailable {
                detail: e.to_string(),
            },
        };

        progress.advance(PlacementState::Compensating);
        let needs_reconciliation = !self.compensate(order_id, &mut log).await;
        let result = self
            .write_status(
                order_id,
                StatusChange::cancel(reason.clone(), needs_reconciliation),
            )
            .await;
        record_finished(started, Some(&reason));
        if let Err(e) = result {
            return Err(stranded(order_id, OrderStatus::Cancelled, e));
        }
        progress.advance(PlacementState::Cancelled);

        tracing::warn!(%order_id, %reason, needs_reconciliation, "order cancelled");
        Err(SagaError::PaymentFailed {
            order_id,
            reason,
            needs_reconciliation,
        })
    }

    /// Reserves every pending item in the log. Stops at the first failure and
    /// returns the product and the reason.
    async fn reserve_all(
        &self,
        order_id: OrderId,
        log: &mut ReservationLog,
    ) -> Result<(), (ProductId, CancellationReason)> {
        let policy = self.inner.config.reserve;

        while let Some(attempt) = log.current().cloned() {
            let result = policy
                .run(placement::OP_RESERVE, || {
                    self.inner
                        .inventory
                        .reserve(attempt.token, &attempt.product_id, attempt.quantity)
                })
                .await;

            let err = match result {
                Ok(level) => {
                    tracing::debug!(
                        %order_id,
                        product_id = %attempt.product_id,
                        quantity = attempt.quantity,
                        available = level.available,
                        "item reserved"
                    );
                    log.record_reserved();
                    continue;
                }
                Err(err) => err,
            };

            let reason = match err {
                InventoryError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                } => {
                    log.record_rejected();
                    CancellationReason::InsufficientStock {
                        product_id,
                        requested,
                        available,
                    }
                }
                InventoryError::NotFound(product_id) => {
                    log.record_rejected();
                    CancellationReason::ProductNotFound { product_id }
                }
                other @ (InventoryError::Unavailable(_) | InventoryError::Timeout(_)) => {
                    log.record_unknown();
                    CancellationReason::InventoryUnavailable {
                        product_id: attempt.product_id.clone(),
                        detail: other.to_string(),
                    }
                }
            };

            tracing::warn!(
                %order_id,
                product_id = %attempt.product_id,
                quantity = attempt.quantity,
                %reason,
                "reservation failed"
            );
            return Err((attempt.product_id, reason));
        }

        Ok(())
    }

    /// Releases reservations newest first. Returns false if any release gave
    /// up, in which case the units may still be held.
    #[tracing::instrument(skip(self, log))]
    async fn compensate(&self, order_id: OrderId, log: &mut ReservationLog) -> bool {
        let policy = self.inner.config.release;

        for index in log.compensation_plan() {
            let Some(attempt) = log.attempt(index).cloned() else {
                continue;
            };

            let result = policy
                .run(placement::OP_RELEASE, || {
                    self.inner
                        .inventory
                        .release(attempt.token, &attempt.product_id, attempt.quantity)
                })
                .await;

            match result {
                Ok(receipt) => {
                    let outcome = if receipt.restored {
                        AttemptOutcome::Released
                    } else {
                        AttemptOutcome::NotReserved
                    };
                    tracing::debug!(
                        product_id = %attempt.product_id,
                        quantity = attempt.quantity,
                        restored = receipt.restored,
                        "reservation released"
                    );
                    log.record_release(index, outcome);
                }
                Err(e) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(
                        product_id = %attempt.product_id,
                        quantity = attempt.quantity,
                        token = %attempt.token,
                        error = %e,
                        "release failed after retries, stock needs reconciliation"
                    );
                    log.record_release(index, AttemptOutcome::ReleaseFailed);
                }
            }
        }

        let needs_reconciliation = log.needs_reconciliation();
        if needs_reconciliation {
            metrics::counter!("orders_needing_reconciliation_total").increment(1);
        }
        !needs_reconciliation
    }

    /// Writes the audit record for an order that never got its stock.
    async fn record_cancelled(
        &self,
        order_id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
        reason: &CancellationReason,
        needs_reconciliation: bool,
    ) -> Result<Order, SagaError> {
        self.create_pending(order_id, user_id, items).await?;
        let cancelled = self
            .write_status(
                order_id,
                StatusChange::cancel(reason.clone(), needs_reconciliation),
            )
            .await
            .map_err(|e| stranded(order_id, OrderStatus::Cancelled, e))?;
        tracing::warn!(%order_id, %reason, needs_reconciliation, "order cancelled");
        Ok(cancelled)
    }

    /// Builds the `Pending` order and writes it, retrying storage faults.
    async fn create_pending(
        &self,
        order_id: OrderId,
        user_id: UserId,
        items: Vec<OrderItem>,
    ) -> Result<Order, SagaError> {
        let order = Order::pending(order_id, user_id, items, self.inner.config.currency.clone())?;

        let mut calls = 0u32;
        let result = self
            .inner
            .config
            .persist
            .run(placement::OP_PERSIST, || {
                calls += 1;
                self.inner.orders.create(&order)
            })
            .await;

        match result {
            Ok(_) => Ok(order),
            // An earlier attempt landed but its reply was lost.
            Err(StoreError::DuplicateOrder(_)) if calls > 1 => Ok(order),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies a status change, retrying storage faults.
    async fn write_status(
        &self,
        order_id: OrderId,
        change: StatusChange,
    ) -> Result<Order, StoreError> {
        let target = change.status;
        let mut calls = 0u32;
        let result = self
            .inner
            .config
            .persist
            .run(placement::OP_PERSIST, || {
                calls += 1;
                self.inner.orders.set_status(order_id, change.clone())
            })
            .await;

        match result {
            // An earlier attempt landed but its reply was lost.
            Err(StoreError::InvalidTransition { from, .. }) if from == target && calls > 1 => self
                .inner
                .orders
                .get(order_id)
                .await?
                .ok_or(StoreError::OrderNotFound(order_id)),
            other => other,
        }
    }
}

/// Reports an order left `Pending` because its final status never landed.
fn stranded(order_id: OrderId, wanted: OrderStatus, err: StoreError) -> SagaError {
    metrics::counter!("orders_needing_reconciliation_total").increment(1);
    tracing::error!(
        %order_id,
        %wanted,
        error = %err,
        "final status write failed after retries, order left pending"
    );
    err.into()
}

fn record_finished(started: Instant, cancelled: Option<&CancellationReason>) {
    metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
    if let Some(reason) = cancelled {
        metrics::counter!("saga_cancelled_total", "reason" => reason.code()).increment(1);
    }
}
