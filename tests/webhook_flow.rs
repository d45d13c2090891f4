//! Integration tests for the billing webhook pipeline against in-memory stores.
//!
//! Covers the subscription lifecycle driven by provider events, replay
//! idempotency and the failed-event reclaim path.

mod common;

use serde_json::json;

use common::*;
use quota_engine::application::handlers::billing::HandleBillingWebhookResult;
use quota_engine::application::handlers::usage::{
    CheckAccessQuery, MarkCountedCommand, StartSessionCommand,
};
use quota_engine::domain::billing::WebhookError;
use quota_engine::domain::subscription::{SubscriptionStatus, Tier};
use quota_engine::ports::{BillingEventStore, ProcessingStatus};

async fn consume_one(h: &Harness, token: &str) {
    h.state
        .start_session_handler()
        .handle(StartSessionCommand {
            user_id: user(),
            session_kind: "osce".into(),
            session_token: Some(token.into()),
        })
        .await
        .unwrap();
    h.clock.advance_secs(300);
    h.state
        .mark_counted_handler()
        .handle(MarkCountedCommand {
            user_id: user(),
            session_token: token.into(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn created_event_grants_basic_tier() {
    let h = Harness::new().await;

    let result = h
        .deliver(subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active"))
        .await
        .unwrap();

    assert!(matches!(result, HandleBillingWebhookResult::Processed { .. }));
    assert_eq!(result.subscription_id(), Some("sub_123"));

    let access = h
        .state
        .check_access_handler()
        .handle(CheckAccessQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(access.tier, Tier::Basic);
    assert_eq!(access.limit, Some(30));
    assert_eq!(access.remaining, Some(30));
    assert!(access.can_start);
}

#[tokio::test]
async fn upgrade_resets_consumed_and_raises_limit() {
    let h = Harness::new().await;
    h.deliver(subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active"))
        .await
        .unwrap();
    consume_one(&h, "tok-1").await;
    consume_one(&h, "tok-2").await;
    assert_eq!(h.subscription().await.consumed_this_period, 2);

    h.deliver(subscription_event("wh_2", "subscription_updated", MID_PLAN, "active"))
        .await
        .unwrap();

    let sub = h.subscription().await;
    assert_eq!(sub.tier, Tier::Mid);
    assert_eq!(sub.quota_limit, Some(60));
    assert_eq!(sub.consumed_this_period, 0);
}

#[tokio::test]
async fn plain_update_keeps_consumed() {
    let h = Harness::new().await;
    h.deliver(subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active"))
        .await
        .unwrap();
    consume_one(&h, "tok-1").await;

    h.deliver(subscription_event("wh_2", "subscription_updated", BASIC_PLAN, "active"))
        .await
        .unwrap();

    assert_eq!(h.subscription().await.consumed_this_period, 1);
}

#[tokio::test]
async fn cancelled_unlimited_cannot_start() {
    let h = Harness::new().await;
    h.deliver(subscription_event("wh_1", "subscription_created", UNLIMITED_PLAN, "active"))
        .await
        .unwrap();

    h.deliver(subscription_event("wh_2", "subscription_cancelled", UNLIMITED_PLAN, "cancelled"))
        .await
        .unwrap();

    let access = h
        .state
        .check_access_handler()
        .handle(CheckAccessQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(access.status, SubscriptionStatus::Cancelled);
    assert!(access.limit.is_none());
    assert!(!access.can_start);
}

#[tokio::test]
async fn payment_failure_and_recovery_move_status() {
    let h = Harness::new().await;
    h.deliver(subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active"))
        .await
        .unwrap();

    h.deliver(payment_event("wh_2", "subscription_payment_failed"))
        .await
        .unwrap();
    assert_eq!(h.subscription().await.status, SubscriptionStatus::PastDue);

    h.deliver(payment_event("wh_3", "subscription_payment_recovered"))
        .await
        .unwrap();
    let sub = h.subscription().await;
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.tier, Tier::Basic);
}

#[tokio::test]
async fn replayed_delivery_is_acknowledged_without_mutation() {
    let h = Harness::new().await;
    let body = subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active");
    h.deliver(body.clone()).await.unwrap();
    consume_one(&h, "tok-1").await;
    let before = h.subscription().await;

    let replay = h.deliver(body).await.unwrap();

    assert!(matches!(replay, HandleBillingWebhookResult::Duplicate { .. }));
    assert_eq!(h.subscription().await, before);
    let record = h.events.find("wh_1").await.unwrap().unwrap();
    assert_eq!(record.processing_status, ProcessingStatus::Processed);
    assert_eq!(record.delivery_count, 2);
}

#[tokio::test]
async fn redelivery_without_provider_id_dedupes_on_derived_id() {
    let h = Harness::new().await;
    let body = json!({
        "meta": { "event_name": "subscription_updated" },
        "data": {
            "id": "sub_123",
            "attributes": {
                "variant_id": BASIC_PLAN,
                "user_email": EMAIL,
                "status": "active",
                "updated_at": "2026-01-01T00:00:00Z"
            }
        }
    })
    .to_string()
    .into_bytes();

    let first = h.deliver(body.clone()).await.unwrap();
    let second = h.deliver(body).await.unwrap();

    assert!(matches!(first, HandleBillingWebhookResult::Processed { .. }));
    assert!(matches!(second, HandleBillingWebhookResult::Duplicate { .. }));
    assert_eq!(first.event_id(), second.event_id());
}

#[tokio::test]
async fn unknown_user_fails_then_succeeds_after_signup() {
    let h = Harness::new().await;
    let body = json!({
        "meta": { "event_name": "subscription_created", "webhook_id": "wh_late" },
        "data": {
            "id": "sub_999",
            "attributes": {
                "variant_id": BASIC_PLAN,
                "user_email": "newcomer@example.com",
                "status": "active"
            }
        }
    })
    .to_string()
    .into_bytes();

    let err = h.deliver(body.clone()).await.unwrap_err();
    assert!(matches!(err, WebhookError::UserNotFound(_)));
    assert!(err.is_retryable());
    let record = h.events.find("wh_late").await.unwrap().unwrap();
    assert_eq!(record.processing_status, ProcessingStatus::Failed);

    let newcomer = quota_engine::domain::foundation::UserId::new("user-2").unwrap();
    h.users.add("newcomer@example.com", newcomer.clone()).await;

    let result = h.deliver(body).await.unwrap();
    assert_eq!(result.user_id(), Some(&newcomer));
    let record = h.events.find("wh_late").await.unwrap().unwrap();
    assert_eq!(record.processing_status, ProcessingStatus::Processed);
}

#[tokio::test]
async fn unsigned_delivery_leaves_no_trace() {
    let h = Harness::new().await;
    let body = subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active");

    let err = h
        .state
        .webhook_handler()
        .handle(
            quota_engine::application::handlers::billing::HandleBillingWebhookCommand {
                payload: body,
                signature: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::MissingSignature));
    assert!(h.events.records().await.is_empty());
}

#[tokio::test]
async fn operator_replay_recovers_failed_events() {
    let h = Harness::new().await;
    h.subscriptions.fail_next_writes(4);

    let err = h
        .deliver(subscription_event("wh_1", "subscription_created", BASIC_PLAN, "active"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::RetriesExhausted(_)));

    let summary = h.state.webhook_handler().reprocess_failed(10).await.unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(h.subscription().await.tier, Tier::Basic);
}
