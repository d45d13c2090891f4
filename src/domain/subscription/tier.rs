//! Subscription tier definitions.
//!
//! A tier decides how many simulation sessions a user may count per period.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Subscription tier.
///
/// `None` is the implicit free tier: a fixed lifetime allowance that never resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Free tier, lifetime counter.
    #[serde(rename = "none")]
    None,

    /// Entry paid tier, metered per billing period.
    #[serde(rename = "tier_basic")]
    Basic,

    /// Mid paid tier, metered per billing period.
    #[serde(rename = "tier_mid")]
    Mid,

    /// Top paid tier, no ceiling.
    #[serde(rename = "tier_unlimited")]
    Unlimited,
}

impl Tier {
    /// Returns true if this tier is paid.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::None)
    }

    /// Returns true for paid tiers with a per-period ceiling.
    pub fn is_metered(&self) -> bool {
        matches!(self, Tier::Basic | Tier::Mid)
    }

    /// Stable identifier used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Basic => "tier_basic",
            Tier::Mid => "tier_mid",
            Tier::Unlimited => "tier_unlimited",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(Tier::None),
            "tier_basic" => Ok(Tier::Basic),
            "tier_mid" => Ok(Tier::Mid),
            "tier_unlimited" => Ok(Tier::Unlimited),
            other => Err(ValidationError::invalid_format(
                "tier",
                format!("unknown tier '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_is_not_paid() {
        assert!(!Tier::None.is_paid());
        assert!(!Tier::None.is_metered());
    }

    #[test]
    fn unlimited_is_paid_but_not_metered() {
        assert!(Tier::Unlimited.is_paid());
        assert!(!Tier::Unlimited.is_metered());
    }

    #[test]
    fn basic_and_mid_are_metered() {
        assert!(Tier::Basic.is_metered());
        assert!(Tier::Mid.is_metered());
    }

    #[test]
    fn tier_serializes_with_storage_names() {
        assert_eq!(serde_json::to_string(&Tier::Basic).unwrap(), "\"tier_basic\"");
        assert_eq!(serde_json::to_string(&Tier::None).unwrap(), "\"none\"");
    }

    #[test]
    fn tier_parses_from_storage_names() {
        for tier in [Tier::None, Tier::Basic, Tier::Mid, Tier::Unlimited] {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("gold".parse::<Tier>().is_err());
    }
}
