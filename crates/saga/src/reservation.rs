//! Per-saga record of which line items hold stock.

use common::ReservationToken;
use domain::{OrderItem, ProductId};

/// What happened to one line item's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Not attempted yet.
    Pending,
    /// Stock is held.
    Reserved,
    /// The ledger refused the reservation; nothing is held.
    Rejected,
    /// The call failed in transit, so the reservation may or may not have
    /// been applied.
    Unknown,
    /// Compensation returned the units.
    Released,
    /// Compensation found nothing held for the token.
    NotReserved,
    /// Compensation gave up; the units may still be held.
    ReleaseFailed,
}

/// One line item's reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationAttempt {
    pub product_id: ProductId,
    pub quantity: u32,
    pub token: ReservationToken,
    pub outcome: AttemptOutcome,
}

/// Reservations for one saga, in line-item order, with a cursor at the next
/// item to reserve.
///
/// Each attempt gets its own [`ReservationToken`] up front so that retries of
/// the same item reuse it.
#[derive(Debug, Clone, Default)]
pub struct ReservationLog {
    attempts: Vec<ReservationAttempt>,
    cursor: usize,
}

impl ReservationLog {
    pub fn new(items: &[OrderItem]) -> Self {
        Self {
            attempts: items
                .iter()
                .map(|item| ReservationAttempt {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    token: ReservationToken::new(),
                    outcome: AttemptOutcome::Pending,
                })
                .collect(),
            cursor: 0,
        }
    }

    pub fn attempts(&self) -> &[ReservationAttempt] {
        &self.attempts
    }

    pub fn attempt(&self, index: usize) -> Option<&ReservationAttempt> {
        self.attempts.get(index)
    }

    /// The next item to reserve, if reservation is still in progress.
    pub fn current(&self) -> Option<&ReservationAttempt> {
        self.attempts
            .get(self.cursor)
            .filter(|a| a.outcome == AttemptOutcome::Pending)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Marks the current item reserved and advances the cursor.
    pub fn record_reserved(&mut self) {
        if self.set_current(AttemptOutcome::Reserved) {
            self.cursor += 1;
        }
    }

    /// Marks the current item as refused. Reservation stops here.
    pub fn record_rejected(&mut self) {
        self.set_current(AttemptOutcome::Rejected);
    }

    /// Marks the current item as possibly applied. Reservation stops here.
    pub fn record_unknown(&mut self) {
        self.set_current(AttemptOutcome::Unknown);
    }

    fn set_current(&mut self, outcome: AttemptOutcome) -> bool {
        match self.attempts.get_mut(self.cursor) {
            Some(attempt) if attempt.outcome == AttemptOutcome::Pending => {
                attempt.outcome = outcome;
                true
            }
            _ => false,
        }
    }

    /// Returns true once every item is reserved.
    pub fn is_complete(&self) -> bool {
        self.attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::Reserved)
    }

    /// Indices to release, newest first.
    ///
    /// Includes items whose reservation outcome is unknown: releasing by token
    /// is a no-op if the reservation never landed.
    pub fn compensation_plan(&self) -> Vec<usize> {
        self.attempts
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, a)| {
                matches!(
                    a.outcome,
                    AttemptOutcome::Reserved | AttemptOutcome::Unknown
                )
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Records the result of a compensating release.
    pub fn record_release(&mut self, index: usize, outcome: AttemptOutcome) {
        if let Some(attempt) = self.attempts.get_mut(index) {
            attempt.outcome = outcome;
        }
    }

    /// Returns true if any release gave up, leaving stock possibly held.
    pub fn needs_reconciliation(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::ReleaseFailed)
    }
}
