//! Shared wiring for the integration tests: in-memory stores, a fixed clock
//! and signed webhook payloads.

#![allow(dead_code)]

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::json;
use sha2::Sha256;

use quota_engine::adapters::http::QuotaAppState;
use quota_engine::adapters::memory::{
    FixedClock, InMemoryBillingEventStore, InMemorySubscriptionStore,
    InMemoryUsageSessionRepository, InMemoryUserDirectory,
};
use quota_engine::application::handlers::billing::{
    HandleBillingWebhookCommand, HandleBillingWebhookResult,
};
use quota_engine::application::RetryPolicy;
use quota_engine::domain::billing::{WebhookError, WebhookVerifier};
use quota_engine::domain::foundation::{Timestamp, UserId};
use quota_engine::domain::subscription::{QuotaPolicy, Subscription, Tier};
use quota_engine::ports::SubscriptionRepository;

pub const SECRET: &str = "whsec_integration_secret";
pub const EMAIL: &str = "learner@example.com";
pub const BASIC_PLAN: &str = "var_basic";
pub const MID_PLAN: &str = "var_mid";
pub const UNLIMITED_PLAN: &str = "var_unlimited";

pub fn start_time() -> Timestamp {
    Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").unwrap()
}

pub fn user() -> UserId {
    UserId::new("user-1").unwrap()
}

pub fn policy() -> QuotaPolicy {
    QuotaPolicy::default()
        .with_plan(BASIC_PLAN, Tier::Basic)
        .with_plan(MID_PLAN, Tier::Mid)
        .with_plan(UNLIMITED_PLAN, Tier::Unlimited)
}

/// In-memory wiring of the whole engine.
pub struct Harness {
    pub state: QuotaAppState,
    pub subscriptions: InMemorySubscriptionStore,
    pub events: InMemoryBillingEventStore,
    pub sessions: InMemoryUsageSessionRepository,
    pub users: InMemoryUserDirectory,
    pub clock: FixedClock,
}

impl Harness {
    pub async fn new() -> Self {
        let subscriptions = InMemorySubscriptionStore::new();
        let events = InMemoryBillingEventStore::new();
        let sessions = InMemoryUsageSessionRepository::new();
        let users = InMemoryUserDirectory::new();
        let clock = FixedClock::at(start_time());
        users.add(EMAIL, user()).await;

        let state = QuotaAppState {
            subscriptions: Arc::new(subscriptions.clone()),
            ledger: Arc::new(subscriptions.clone()),
            billing_events: Arc::new(events.clone()),
            sessions: Arc::new(sessions.clone()),
            users: Arc::new(users.clone()),
            clock: Arc::new(clock.clone()),
            verifier: Arc::new(WebhookVerifier::new(Some(SecretString::new(
                SECRET.to_string(),
            )))),
            policy: Arc::new(policy()),
            retry: RetryPolicy::immediate(3),
        };

        Self {
            state,
            subscriptions,
            events,
            sessions,
            users,
            clock,
        }
    }

    /// Delivers a correctly signed webhook.
    pub async fn deliver(&self, payload: Vec<u8>) -> Result<HandleBillingWebhookResult, WebhookError> {
        let signature = sign(&payload);
        self.state
            .webhook_handler()
            .handle(HandleBillingWebhookCommand {
                payload,
                signature: Some(signature),
            })
            .await
    }

    pub async fn subscription(&self) -> Subscription {
        self.subscriptions
            .find_by_user_id(&user())
            .await
            .unwrap()
            .expect("subscription row")
    }
}

pub fn sign(payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// A subscription event in the provider's envelope.
pub fn subscription_event(webhook_id: &str, event_name: &str, variant: &str, status: &str) -> Vec<u8> {
    json!({
        "meta": { "event_name": event_name, "webhook_id": webhook_id },
        "data": {
            "id": "sub_123",
            "attributes": {
                "variant_id": variant,
                "user_email": EMAIL,
                "status": status,
                "renews_at": "2026-02-01T00:00:00Z",
                "updated_at": "2026-01-01T00:00:00Z"
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// A payment (invoice) event referencing the owning subscription.
pub fn payment_event(webhook_id: &str, event_name: &str) -> Vec<u8> {
    json!({
        "meta": { "event_name": event_name, "webhook_id": webhook_id },
        "data": {
            "id": "inv_77",
            "attributes": {
                "subscription_id": "sub_123",
                "user_email": EMAIL,
                "status": "paid"
            }
        }
    })
    .to_string()
    .into_bytes()
}
