//! Subscription status state machine.
//!
//! Defines the provider-side subscription states and which moves between them
//! the engine accepts from billing events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Subscription status as reported by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid up, or the free-tier default.
    Active,

    /// Billing paused by the user; no charges, no unlimited access.
    Paused,

    /// User cancelled; may be resumed before it expires.
    Cancelled,

    /// Subscription ended.
    Expired,

    /// A renewal payment failed and the provider is retrying.
    PastDue,
}

impl SubscriptionStatus {
    /// Stable identifier used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::PastDue => "past_due",
        }
    }

    /// False once the provider has stopped billing: metered windows no longer
    /// roll forward.
    pub fn renews(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }

    /// Maps the provider's status strings, including its aliases.
    pub fn from_provider(value: &str) -> Option<Self> {
        match value {
            "active" | "on_trial" => Some(SubscriptionStatus::Active),
            "paused" => Some(SubscriptionStatus::Paused),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Active => vec![Active, Paused, Cancelled, Expired, PastDue],
            Paused => vec![Active, Paused, Cancelled, Expired],
            Cancelled => vec![Active, Cancelled, Expired],
            PastDue => vec![Active, PastDue, Paused, Cancelled, Expired],
            Expired => vec![Active, Expired],
        }
    }
}
