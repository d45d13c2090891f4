//! Access evaluation and lazy billing-period rollover.
//!
//! Both functions are pure. The access-check handler persists a rollover through
//! the quota ledger before evaluating.

use serde::Serialize;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{QuotaPolicy, Subscription, SubscriptionStatus, Tier};

/// What a user may do right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSnapshot {
    pub tier: Tier,
    pub status: SubscriptionStatus,
    /// `None` means unlimited.
    pub limit: Option<u32>,
    pub consumed: u32,
    /// `None` means unlimited.
    pub remaining: Option<u32>,
    pub can_start: bool,
    pub period_end: Option<Timestamp>,
}

impl AccessSnapshot {
    /// Evaluates access for an already rolled-over subscription.
    ///
    /// The unlimited tier is gated on `status = active`. The free and metered
    /// tiers are gated on remaining quota, and a metered plan that expired or ran
    /// past its cancelled end date grants nothing.
    pub fn evaluate(subscription: &Subscription, now: Timestamp) -> Self {
        let remaining = subscription.remaining();
        let can_start = match (subscription.tier, remaining) {
            (Tier::Unlimited, _) => subscription.status == SubscriptionStatus::Active,
            _ if subscription.access_ended(now) => false,
            (_, Some(left)) => left > 0,
            (_, None) => subscription.status == SubscriptionStatus::Active,
        };

        Self {
            tier: subscription.tier,
            status: subscription.status,
            limit: subscription.quota_limit,
            consumed: subscription.consumed(),
            remaining,
            can_start,
            period_end: subscription.period_end,
        }
    }
}

/// A due period reset, guarded by the `period_end` it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRollover {
    /// Compare-and-set guard: the reset applies only if the row still has this value.
    pub expected_period_end: Option<Timestamp>,
    pub new_start: Timestamp,
    pub new_end: Timestamp,
}

impl PeriodRollover {
    /// Applies the reset to an in-memory copy.
    pub fn apply_to(&self, subscription: &mut Subscription, now: Timestamp) {
        subscription.consumed_this_period = 0;
        subscription.period_start = Some(self.new_start);
        subscription.period_end = Some(self.new_end);
        subscription.last_reset_at = now;
        subscription.updated_at = now;
    }
}

/// Returns the reset due for a metered subscription, if any.
///
/// The window advances in whole periods from the old end until it covers `now`.
/// Without a `period_end`, the window is measured from `last_reset_at`. The free
/// tier never resets. Only active and past-due subscriptions roll forward; the
/// rest keep their last window until an event reactivates them.
pub fn rollover_due(
    subscription: &Subscription,
    policy: &QuotaPolicy,
    now: Timestamp,
) -> Option<PeriodRollover> {
    if !subscription.tier.is_metered() || !subscription.status.renews() {
        return None;
    }

    let boundary = subscription
        .period_end
        .unwrap_or_else(|| subscription.last_reset_at.add_days(policy.period_days));
    if !now.is_after(&boundary) {
        return None;
    }

    let mut new_start = boundary;
    let mut new_end = boundary.add_days(policy.period_days);
    while !new_end.is_after(&now) {
        new_start = new_end;
        new_end = new_end.add_days(policy.period_days);
    }

    Some(PeriodRollover {
        expected_period_end: subscription.period_end,
        new_start,
        new_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    fn now() -> Timestamp {
        Timestamp::parse_rfc3339("2024-06-01T00:00:00Z").unwrap()
    }

    fn subscription(tier: Tier, consumed: u32) -> Subscription {
        let policy = QuotaPolicy::default();
        let mut sub = Subscription::free_default(UserId::new("u1").unwrap(), &policy, now().minus_days(100));
        sub.tier = tier;
        sub.quota_limit = policy.limit_for(tier);
        if tier == Tier::None {
            sub.free_consumed = consumed;
        } else {
            sub.consumed_this_period = consumed;
            sub.period_start = Some(now().minus_days(10));
            sub.period_end = Some(now().add_days(20));
        }
        sub
    }

    // ══════════════════════════════════════════════════════════════
    // Access Evaluation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn exhausted_metered_tier_cannot_start() {
        let snapshot = AccessSnapshot::evaluate(&subscription(Tier::Basic, 30), now());
        assert_eq!(snapshot.remaining, Some(0));
        assert!(!snapshot.can_start);
    }

    #[test]
    fn one_left_can_start() {
        let snapshot = AccessSnapshot::evaluate(&subscription(Tier::Basic, 29), now());
        assert_eq!(snapshot.remaining, Some(1));
        assert!(snapshot.can_start);
    }

    #[test]
    fn free_tier_uses_lifetime_counter() {
        let snapshot = AccessSnapshot::evaluate(&subscription(Tier::None, 2), now());
        assert_eq!(snapshot.limit, Some(3));
        assert_eq!(snapshot.consumed, 2);
        assert!(snapshot.can_start);
        assert!(!AccessSnapshot::evaluate(&subscription(Tier::None, 3), now()).can_start);
    }

    #[test]
    fn unlimited_requires_active_status() {
        let mut sub = subscription(Tier::Unlimited, 500);
        let snapshot = AccessSnapshot::evaluate(&sub, now());
        assert_eq!(snapshot.remaining, None);
        assert!(snapshot.can_start);

        for status in [
            SubscriptionStatus::Paused,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
            SubscriptionStatus::PastDue,
        ] {
            sub.status = status;
            assert!(!AccessSnapshot::evaluate(&sub, now()).can_start, "{:?}", status);
        }
    }

    #[test]
    fn metered_status_does_not_gate_start() {
        let mut sub = subscription(Tier::Mid, 5);
        sub.status = SubscriptionStatus::PastDue;
        assert!(AccessSnapshot::evaluate(&sub, now()).can_start);
    }

    #[test]
    fn cancelled_plan_keeps_leftover_quota_until_its_end_date() {
        let mut sub = subscription(Tier::Basic, 10);
        sub.status = SubscriptionStatus::Cancelled;
        assert!(AccessSnapshot::evaluate(&sub, now()).can_start);

        let after_end = now().add_days(21);
        let snapshot = AccessSnapshot::evaluate(&sub, after_end);
        assert_eq!(snapshot.remaining, Some(20));
        assert!(!snapshot.can_start);
    }

    #[test]
    fn expired_plan_grants_nothing() {
        let mut sub = subscription(Tier::Mid, 10);
        sub.status = SubscriptionStatus::Expired;
        assert!(!AccessSnapshot::evaluate(&sub, now()).can_start);
    }

    // ══════════════════════════════════════════════════════════════
    // Period Rollover
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn current_period_needs_no_rollover() {
        let sub = subscription(Tier::Basic, 18);
        assert_eq!(rollover_due(&sub, &QuotaPolicy::default(), now()), None);
    }

    #[test]
    fn past_period_rolls_forward_one_period() {
        let mut sub = subscription(Tier::Basic, 18);
        let old_end = now().minus_days(2);
        sub.period_end = Some(old_end);

        let rollover = rollover_due(&sub, &QuotaPolicy::default(), now()).unwrap();

        assert_eq!(rollover.expected_period_end, Some(old_end));
        assert_eq!(rollover.new_start, old_end);
        assert_eq!(rollover.new_end, old_end.add_days(30));

        rollover.apply_to(&mut sub, now());
        let snapshot = AccessSnapshot::evaluate(&sub, now());
        assert_eq!(snapshot.consumed, 0);
        assert_eq!(snapshot.remaining, Some(30));
    }

    #[test]
    fn long_dormancy_skips_whole_periods() {
        let mut sub = subscription(Tier::Mid, 40);
        let old_end = now().minus_days(75);
        sub.period_end = Some(old_end);

        let rollover = rollover_due(&sub, &QuotaPolicy::default(), now()).unwrap();

        assert_eq!(rollover.new_start, old_end.add_days(60));
        assert_eq!(rollover.new_end, old_end.add_days(90));
        assert!(rollover.new_end.is_after(&now()));
    }

    #[test]
    fn exactly_at_period_end_is_not_yet_due() {
        let mut sub = subscription(Tier::Basic, 18);
        sub.period_end = Some(now());
        assert_eq!(rollover_due(&sub, &QuotaPolicy::default(), now()), None);
    }

    #[test]
    fn missing_period_end_uses_last_reset() {
        let mut sub = subscription(Tier::Basic, 10);
        sub.period_end = None;
        sub.last_reset_at = now().minus_days(31);

        let rollover = rollover_due(&sub, &QuotaPolicy::default(), now()).unwrap();

        assert_eq!(rollover.expected_period_end, None);
        assert_eq!(rollover.new_start, now().minus_days(1));
    }

    #[test]
    fn free_tier_never_resets() {
        let mut sub = subscription(Tier::None, 2);
        sub.last_reset_at = now().minus_days(31);

        assert_eq!(rollover_due(&sub, &QuotaPolicy::default(), now()), None);
        assert_eq!(AccessSnapshot::evaluate(&sub, now()).consumed, 2);
    }

    #[test]
    fn ended_subscriptions_are_not_refilled() {
        for status in [
            SubscriptionStatus::Expired,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Paused,
        ] {
            let mut sub = subscription(Tier::Basic, 30);
            sub.status = status;
            sub.period_end = Some(now().minus_days(2));

            assert_eq!(rollover_due(&sub, &QuotaPolicy::default(), now()), None, "{:?}", status);
            assert!(!AccessSnapshot::evaluate(&sub, now()).can_start);
        }
    }

    #[test]
    fn active_and_past_due_roll_over() {
        for status in [SubscriptionStatus::Active, SubscriptionStatus::PastDue] {
            let mut sub = subscription(Tier::Basic, 30);
            sub.status = status;
            sub.period_end = Some(now().minus_days(2));

            assert!(rollover_due(&sub, &QuotaPolicy::default(), now()).is_some(), "{:?}", status);
        }
    }

    #[test]
    fn unlimited_never_resets() {
        let mut sub = subscription(Tier::Unlimited, 2);
        sub.period_end = Some(now().minus_days(5));
        assert_eq!(rollover_due(&sub, &QuotaPolicy::default(), now()), None);
    }
}
