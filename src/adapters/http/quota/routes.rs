//! Axum router configuration for the quota engine endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    check_access, end_session, get_session, handle_billing_webhook, mark_counted, start_session,
    QuotaAppState,
};

/// Session and entitlement routes. All require the `X-User-Id` header.
///
/// # Routes
/// - `GET /access` - Current entitlement
/// - `POST /sessions` - Start a session
/// - `GET /sessions/:token` - Read a session
/// - `POST /sessions/:token/counted` - Count a session toward usage
/// - `POST /sessions/:token/end` - End or cancel a session
pub fn usage_routes() -> Router<QuotaAppState> {
    Router::new()
        .route("/access", get(check_access))
        .route("/sessions", post(start_session))
        .route("/sessions/:token", get(get_session))
        .route("/sessions/:token/counted", post(mark_counted))
        .route("/sessions/:token/end", post(end_session))
}

/// Billing webhook routes. No caller identity; the payload signature is verified.
///
/// Any method other than POST is answered with 405.
pub fn webhook_routes() -> Router<QuotaAppState> {
    Router::new().route("/billing", post(handle_billing_webhook))
}

/// The complete quota engine router, ready for `with_state`.
pub fn quota_router() -> Router<QuotaAppState> {
    Router::new()
        .merge(usage_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use crate::adapters::memory::{
        FixedClock, InMemoryBillingEventStore, InMemorySubscriptionStore,
        InMemoryUsageSessionRepository, InMemoryUserDirectory,
    };
    use crate::application::RetryPolicy;
    use crate::domain::billing::{compute_test_signature, WebhookVerifier};
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::QuotaPolicy;

    const SECRET: &str = "whsec_router_test";

    fn test_state() -> QuotaAppState {
        let store = InMemorySubscriptionStore::new();
        QuotaAppState {
            subscriptions: Arc::new(store.clone()),
            ledger: Arc::new(store),
            billing_events: Arc::new(InMemoryBillingEventStore::new()),
            sessions: Arc::new(InMemoryUsageSessionRepository::new()),
            users: Arc::new(InMemoryUserDirectory::new()),
            clock: Arc::new(FixedClock::at(
                Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").unwrap(),
            )),
            verifier: Arc::new(WebhookVerifier::new(Some(SecretString::new(
                SECRET.to_string(),
            )))),
            policy: Arc::new(QuotaPolicy::default()),
            retry: RetryPolicy::immediate(3),
        }
    }

    fn app() -> Router {
        quota_router().with_state(test_state())
    }

    #[tokio::test]
    async fn access_requires_user_header() {
        let response = app()
            .oneshot(Request::get("/access").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn access_returns_free_default() {
        let response = app()
            .oneshot(
                Request::get("/access")
                    .header("X-User-Id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["tier"], "none");
        assert_eq!(json["can_start"], true);
    }

    #[tokio::test]
    async fn webhook_rejects_get_with_405() {
        let response = app()
            .oneshot(Request::get("/webhooks/billing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn webhook_without_signature_is_400() {
        let response = app()
            .oneshot(
                Request::post("/webhooks/billing")
                    .body(Body::from(r#"{"meta":{"event_name":"subscription_created"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_with_wrong_signature_is_401() {
        let payload = br#"{"meta":{"event_name":"subscription_created"}}"#;
        let signature = compute_test_signature("some_other_secret", payload);

        let response = app()
            .oneshot(
                Request::post("/webhooks/billing")
                    .header("X-Signature", signature)
                    .body(Body::from(payload.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let response = app()
            .oneshot(
                Request::get("/sessions/tok-missing")
                    .header("X-User-Id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
