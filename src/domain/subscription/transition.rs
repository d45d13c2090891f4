//! Applying billing events to a subscription.
//!
//! `apply_event` is pure: it takes the current record and returns the next one
//! plus what changed. Persisting the result is the caller's job.

use super::{QuotaPolicy, Subscription, SubscriptionError, SubscriptionStatus, Tier, TierResolution};
use crate::domain::billing::{BillingEvent, BillingEventType};
use crate::domain::foundation::{StateMachine, Timestamp};

/// Outcome of applying one billing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The record to persist.
    pub subscription: Subscription,
    pub previous_tier: Tier,
    pub previous_status: SubscriptionStatus,
    /// Present when the event carried a plan id that was resolved.
    pub tier_resolution: Option<TierResolution>,
    /// A new billing window began with this event.
    pub period_started: bool,
}

impl Transition {
    pub fn tier_changed(&self) -> bool {
        self.subscription.tier != self.previous_tier
    }

    /// True when `consumed_this_period` must be zeroed on write.
    pub fn resets_consumed(&self) -> bool {
        self.tier_changed() || self.period_started
    }

    /// True when the plan id was unknown and the fallback tier was used.
    pub fn used_fallback_tier(&self) -> bool {
        matches!(self.tier_resolution, Some(resolution) if !resolution.mapped)
    }
}

/// Applies `event` to `current`.
///
/// # Errors
///
/// - `UnsupportedEvent` for event types with no subscription effect
/// - `InvalidTransition` when the status change is not allowed from the current status
pub fn apply_event(
    current: &Subscription,
    event: &BillingEvent,
    policy: &QuotaPolicy,
    now: Timestamp,
) -> Result<Transition, SubscriptionError> {
    let target = target_status(current.status, event)?;
    let status = current
        .status
        .transition_to(target)
        .map_err(|_| SubscriptionError::InvalidTransition {
            from: current.status,
            to: target,
        })?;

    let attributes = &event.attributes;
    let tier_resolution = if event.event_type == BillingEventType::SubscriptionCreated
        || (event.event_type.carries_subscription() && attributes.variant_id.is_some())
    {
        Some(policy.resolve_tier(attributes.variant_id.as_deref()))
    } else {
        None
    };
    let tier = tier_resolution.map_or(current.tier, |resolution| resolution.tier);
    let tier_changed = tier != current.tier;

    let mut window = next_window(current, tier, tier_changed, attributes.renews_at, policy, now);
    // A cancelled plan stays usable until the provider's paid-through date.
    if status == SubscriptionStatus::Cancelled && tier.is_paid() {
        if let Some(ends_at) = attributes.ends_at {
            window.end = Some(ends_at);
        }
    }

    let mut next = current.clone();
    next.tier = tier;
    next.status = status;
    next.quota_limit = policy.limit_for(tier);
    next.period_start = window.start;
    next.period_end = window.end;
    next.updated_at = now;

    if event.event_type.carries_subscription() {
        if let Some(id) = &event.object_id {
            next.external_subscription_id = Some(id.clone());
        }
        if let Some(variant) = &attributes.variant_id {
            next.external_variant_id = Some(variant.clone());
        }
    } else if next.external_subscription_id.is_none() {
        next.external_subscription_id = attributes.subscription_id.clone();
    }
    if let Some(email) = &attributes.user_email {
        next.customer_email = Some(email.clone());
    }

    if tier_changed || window.started {
        next.consumed_this_period = 0;
        next.last_reset_at = now;
    }

    Ok(Transition {
        subscription: next,
        previous_tier: current.tier,
        previous_status: current.status,
        tier_resolution,
        period_started: window.started,
    })
}

fn target_status(
    current: SubscriptionStatus,
    event: &BillingEvent,
) -> Result<SubscriptionStatus, SubscriptionError> {
    use SubscriptionStatus::*;

    let reported = event
        .attributes
        .status
        .as_deref()
        .and_then(SubscriptionStatus::from_provider);

    let status = match event.event_type {
        BillingEventType::SubscriptionCreated => reported.unwrap_or(Active),
        BillingEventType::SubscriptionUpdated => reported.unwrap_or(current),
        BillingEventType::SubscriptionCancelled => Cancelled,
        BillingEventType::SubscriptionExpired => Expired,
        BillingEventType::SubscriptionPaused => Paused,
        BillingEventType::SubscriptionResumed
        | BillingEventType::SubscriptionUnpaused
        | BillingEventType::PaymentRecovered => Active,
        BillingEventType::PaymentFailed => PastDue,
        // A final invoice on a cancelled plan must not reactivate it.
        BillingEventType::PaymentSuccess => match current {
            PastDue => Active,
            other => other,
        },
        BillingEventType::Unknown => {
            return Err(SubscriptionError::UnsupportedEvent(event.event_name.clone()))
        }
    };
    Ok(status)
}

struct Window {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    started: bool,
}

/// Decides the billing window after the event.
///
/// A paid tier change opens a fresh window at `now`. Otherwise a provider renewal
/// opens the next window only once the current one has elapsed; a renewal that
/// arrives early leaves the window for the lazy rollover to advance.
fn next_window(
    current: &Subscription,
    tier: Tier,
    tier_changed: bool,
    renews_at: Option<Timestamp>,
    policy: &QuotaPolicy,
    now: Timestamp,
) -> Window {
    let unchanged = Window {
        start: current.period_start,
        end: current.period_end,
        started: false,
    };

    if !tier.is_paid() {
        return unchanged;
    }

    if tier_changed || current.period_end.is_none() {
        let end = renews_at
            .filter(|renews| renews.is_after(&now))
            .unwrap_or_else(|| now.add_days(policy.period_days));
        return Window {
            start: Some(now),
            end: Some(end),
            started: true,
        };
    }

    match (current.period_end, renews_at) {
        (Some(end), Some(renews)) if !end.is_after(&now) && renews.is_after(&end) => Window {
            start: Some(end),
            end: Some(renews),
            started: true,
        },
        _ => unchanged,
    }
}
