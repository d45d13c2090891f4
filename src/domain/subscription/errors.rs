//! Subscription transition errors.

use thiserror::Error;

use super::SubscriptionStatus;

/// Reasons a billing event cannot be applied to a subscription.
///
/// Both are terminal for the event: it is recorded as ignored, not retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The event would move the status along an edge the lifecycle does not allow.
    #[error("Cannot transition subscription from {from} to {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// The event type has no effect on subscriptions.
    #[error("Unsupported billing event: {0}")]
    UnsupportedEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_both_states() {
        let err = SubscriptionError::InvalidTransition {
            from: SubscriptionStatus::Expired,
            to: SubscriptionStatus::Paused,
        };
        assert_eq!(
            err.to_string(),
            "Cannot transition subscription from expired to paused"
        );
    }
}
