//! Quota policy: every tier ceiling, plan mapping and timing constant in one place.
//!
//! The state machine reads it to resolve tiers and limits; the access check and
//! session tracker read it for thresholds and period length.

use std::collections::HashMap;

use super::Tier;
use crate::domain::foundation::ValidationError;

/// Result of resolving a billing plan identifier to a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierResolution {
    pub tier: Tier,
    /// False when the plan id was absent from the table and the fallback was used.
    pub mapped: bool,
}

/// Tier ceilings and timing constants.
///
/// | Tier | Limit | Resets |
/// |------|-------|--------|
/// | none | 3 (lifetime) | never |
/// | tier_basic | 30 | every period |
/// | tier_mid | 60 | every period |
/// | tier_unlimited | none | n/a |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub free_lifetime_limit: u32,
    pub basic_limit: u32,
    pub mid_limit: u32,
    /// Billing plan (variant) id -> tier.
    pub plan_tiers: HashMap<String, Tier>,
    /// Tier applied when a plan id is not in `plan_tiers`.
    pub fallback_tier: Tier,
    /// Seconds a session must run before it counts.
    pub counting_threshold_secs: i64,
    /// Allowance for client timers firing slightly early.
    pub clock_skew_tolerance_secs: i64,
    pub period_days: i64,
    /// A `processing` claim older than this is considered abandoned.
    pub stale_claim_secs: i64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            free_lifetime_limit: 3,
            basic_limit: 30,
            mid_limit: 60,
            plan_tiers: HashMap::new(),
            fallback_tier: Tier::Basic,
            counting_threshold_secs: 300,
            clock_skew_tolerance_secs: 5,
            period_days: 30,
            stale_claim_secs: 600,
        }
    }
}

impl QuotaPolicy {
    /// Quota ceiling for a tier. `None` means unlimited.
    pub fn limit_for(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::None => Some(self.free_lifetime_limit),
            Tier::Basic => Some(self.basic_limit),
            Tier::Mid => Some(self.mid_limit),
            Tier::Unlimited => None,
        }
    }

    /// Maps a plan id to a tier, falling back when absent or unknown.
    pub fn resolve_tier(&self, plan_id: Option<&str>) -> TierResolution {
        match plan_id.and_then(|id| self.plan_tiers.get(id)) {
            Some(tier) => TierResolution {
                tier: *tier,
                mapped: true,
            },
            None => TierResolution {
                tier: self.fallback_tier,
                mapped: false,
            },
        }
    }

    /// Minimum elapsed whole seconds before a session may be counted.
    pub fn effective_threshold_secs(&self) -> i64 {
        self.counting_threshold_secs - self.clock_skew_tolerance_secs
    }

    /// Registers a plan id mapping.
    pub fn with_plan(mut self, plan_id: impl Into<String>, tier: Tier) -> Self {
        self.plan_tiers.insert(plan_id.into(), tier);
        self
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.counting_threshold_secs <= 0 || self.counting_threshold_secs > 3600 {
            return Err(ValidationError::out_of_range(
                "counting_threshold_secs",
                1,
                3600,
                self.counting_threshold_secs,
            ));
        }
        if self.clock_skew_tolerance_secs < 0
            || self.clock_skew_tolerance_secs >= self.counting_threshold_secs
        {
            return Err(ValidationError::out_of_range(
                "clock_skew_tolerance_secs",
                0,
                self.counting_threshold_secs - 1,
                self.clock_skew_tolerance_secs,
            ));
        }
        if self.period_days <= 0 || self.period_days > 366 {
            return Err(ValidationError::out_of_range(
                "period_days",
                1,
                366,
                self.period_days,
            ));
        }
        if self.stale_claim_secs <= 0 {
            return Err(ValidationError::out_of_range(
                "stale_claim_secs",
                1,
                i64::MAX,
                self.stale_claim_secs,
            ));
        }
        if self.plan_tiers.values().any(|tier| *tier == Tier::None)
            || self.fallback_tier == Tier::None
        {
            return Err(ValidationError::invalid_format(
                "plan_tiers",
                "billing plans must map to a paid tier",
            ));
        }
        Ok(())
    }
}

/// Parses a `variant:tier` comma list such as `"101:tier_basic,102:tier_mid"`.
pub fn parse_plan_tiers(raw: &str) -> Result<HashMap<String, Tier>, ValidationError> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (plan_id, tier) = entry.split_once(':').ok_or_else(|| {
            ValidationError::invalid_format("plan_tiers", format!("expected 'id:tier', got '{}'", entry))
        })?;
        let plan_id = plan_id.trim();
        if plan_id.is_empty() {
            return Err(ValidationError::empty_field("plan_tiers.id"));
        }
        map.insert(plan_id.to_string(), tier.parse::<Tier>()?);
    }
    Ok(map)
}
