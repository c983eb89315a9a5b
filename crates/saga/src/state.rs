//! Placement saga state machine.

use serde::{Deserialize, Serialize};

/// Where a placement saga is in its lifecycle.
///
/// State transitions:
/// ```text
/// Validating ──► Reserving ──► Persisting ──► Paying ──► Confirmed
///                    │              │            │
///                    └──────────────┴────────────┴──► Compensating ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlacementState {
    /// The request is being checked. No side effects yet.
    #[default]
    Validating,

    /// Line items are being reserved one at a time.
    Reserving,

    /// All items are reserved and the order is being written as `Pending`.
    Persisting,

    /// Waiting for the payment provider.
    Paying,

    /// Reserved items are being released in reverse order.
    Compensating,

    /// Payment approved and the order confirmed (terminal state).
    Confirmed,

    /// Compensation finished (terminal state).
    Cancelled,
}

impl PlacementState {
    /// Returns true if the saga may move from `self` to `next`.
    pub fn can_transition_to(&self, next: PlacementState) -> bool {
        use PlacementState::*;
        matches!(
            (self, next),
            (Validating, Reserving)
                | (Reserving, Persisting)
                | (Persisting, Paying)
                | (Paying, Confirmed)
                | (Reserving | Persisting | Paying, Compensating)
                | (Compensating, Cancelled)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlacementState::Confirmed | PlacementState::Cancelled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementState::Validating => "Validating",
            PlacementState::Reserving => "Reserving",
            PlacementState::Persisting => "Persisting",
            PlacementState::Paying => "Paying",
            PlacementState::Compensating => "Compensating",
            PlacementState::Confirmed => "Confirmed",
            PlacementState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PlacementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlacementState::*;

    const ALL: [PlacementState; 7] = [
        Validating,
        Reserving,
        Persisting,
        Paying,
        Compensating,
        Confirmed,
        Cancelled,
    ];

    #[test]
    fn test_default_state_is_validating() {
        assert_eq!(PlacementState::default(), Validating);
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Validating.can_transition_to(Reserving));
        assert!(Reserving.can_transition_to(Persisting));
        assert!(Persisting.can_transition_to(Paying));
        assert!(Paying.can_transition_to(Confirmed));
    }

    #[test]
    fn test_compensation_reachable_only_after_side_effects() {
        assert!(!Validating.can_transition_to(Compensating));
        assert!(Reserving.can_transition_to(Compensating));
        assert!(Persisting.can_transition_to(Compensating));
        assert!(Paying.can_transition_to(Compensating));
        assert!(Compensating.can_transition_to(Cancelled));
        assert!(!Compensating.can_transition_to(Confirmed));
    }

    #[test]
    fn test_no_skipping_steps() {
        assert!(!Validating.can_transition_to(Paying));
        assert!(!Reserving.can_transition_to(Confirmed));
        assert!(!Persisting.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Confirmed, Cancelled] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
        assert!(!Paying.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(Validating.to_string(), "Validating");
        assert_eq!(Compensating.to_string(), "Compensating");
        assert_eq!(Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&Paying).unwrap();
        let deserialized: PlacementState = serde_json::from_str(&json).unwrap();
        assert_eq!(Paying, deserialized);
    }
}
