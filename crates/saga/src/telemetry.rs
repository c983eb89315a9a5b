//! Metric descriptions.

use metrics::{Unit, describe_counter, describe_histogram};

/// Registers help text for every metric the saga emits. Call once after
/// installing a recorder.
pub fn describe_metrics() {
    describe_counter!("saga_executions_total", "Placement sagas started");
    describe_counter!("saga_confirmed_total", "Placement sagas that confirmed an order");
    describe_counter!(
        "saga_cancelled_total",
        "Placement sagas that cancelled an order, by reason"
    );
    describe_histogram!(
        "saga_duration_seconds",
        Unit::Seconds,
        "Wall time from saga start to a terminal state"
    );
    describe_counter!(
        "inventory_reservations_total",
        "Reserve calls handled by the ledger, by outcome"
    );
    describe_counter!(
        "inventory_releases_total",
        "Release calls handled by the ledger, by outcome"
    );
    describe_counter!(
        "saga_compensation_failures_total",
        "Compensating releases that failed after all retries"
    );
    describe_counter!(
        "orders_needing_reconciliation_total",
        "Cancelled orders whose stock could not be fully restored"
    );
    describe_counter!(
        "remote_call_retries_total",
        "Retried remote calls, by operation"
    );
}
