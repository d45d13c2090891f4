//! Quota policy configuration
//!
//! Flat, environment-friendly view of [`QuotaPolicy`]. The plan map is a
//! `variant:tier` comma list, e.g.
//! `QUOTA_ENGINE__QUOTA__PLAN_TIERS=101:tier_basic,102:tier_mid,103:tier_unlimited`.

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::subscription::{parse_plan_tiers, QuotaPolicy, Tier};

/// Quota policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_free_lifetime_limit")]
    pub free_lifetime_limit: u32,

    #[serde(default = "default_basic_limit")]
    pub basic_limit: u32,

    #[serde(default = "default_mid_limit")]
    pub mid_limit: u32,

    /// Plan id to tier map as a `variant:tier` comma list
    #[serde(default)]
    pub plan_tiers: String,

    /// Tier for plan ids missing from `plan_tiers`
    #[serde(default = "default_fallback_tier")]
    pub fallback_tier: String,

    #[serde(default = "default_counting_threshold")]
    pub counting_threshold_secs: i64,

    #[serde(default = "default_clock_skew_tolerance")]
    pub clock_skew_tolerance_secs: i64,

    #[serde(default = "default_period_days")]
    pub period_days: i64,

    /// Age after which an unfinished `processing` claim may be taken over
    #[serde(default = "default_stale_claim")]
    pub stale_claim_secs: i64,
}

impl QuotaConfig {
    /// Builds and checks the policy.
    pub fn to_policy(&self) -> Result<QuotaPolicy, ValidationError> {
        let policy = QuotaPolicy {
            free_lifetime_limit: self.free_lifetime_limit,
            basic_limit: self.basic_limit,
            mid_limit: self.mid_limit,
            plan_tiers: parse_plan_tiers(&self.plan_tiers)?,
            fallback_tier: self.fallback_tier.parse::<Tier>()?,
            counting_threshold_secs: self.counting_threshold_secs,
            clock_skew_tolerance_secs: self.clock_skew_tolerance_secs,
            period_days: self.period_days,
            stale_claim_secs: self.stale_claim_secs,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Validate quota configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.to_policy().map(|_| ())
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_lifetime_limit: default_free_lifetime_limit(),
            basic_limit: default_basic_limit(),
            mid_limit: default_mid_limit(),
            plan_tiers: String::new(),
            fallback_tier: default_fallback_tier(),
            counting_threshold_secs: default_counting_threshold(),
            clock_skew_tolerance_secs: default_clock_skew_tolerance(),
            period_days: default_period_days(),
            stale_claim_secs: default_stale_claim(),
        }
    }
}

fn default_free_lifetime_limit() -> u32 {
    3
}

fn default_basic_limit() -> u32 {
    30
}

fn default_mid_limit() -> u32 {
    60
}

fn default_fallback_tier() -> String {
    "tier_basic".to_string()
}

fn default_counting_threshold() -> i64 {
    300
}

fn default_clock_skew_tolerance() -> i64 {
    5
}

fn default_period_days() -> i64 {
    30
}

fn default_stale_claim() -> i64 {
    600
}
