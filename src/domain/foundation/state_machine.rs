//! Transition table contract for status enums.
//!
//! `SubscriptionStatus` implements it; provider events that would move a
//! subscription along an edge missing from its table are recorded as ignored.

use super::ValidationError;

/// A status enum with an explicit table of allowed edges.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Every status reachable in one step, including staying put.
    fn valid_transitions(&self) -> Vec<Self>;

    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// No outgoing edges at all.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
