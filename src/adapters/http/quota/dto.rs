//! Data Transfer Objects for the quota engine HTTP API.
//!
//! Request and response shapes are decoupled from domain types so the wire
//! format can stay stable while the domain evolves.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::HandleBillingWebhookResult;
use crate::application::handlers::usage::{
    EndSessionResult, MarkCountedResult, StartSessionResult,
};
use crate::domain::usage::{AccessSnapshot, UsageSession};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a usage session.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    /// Kind of simulation being started (e.g. "osce").
    pub session_kind: String,
    /// Client-generated token; makes retried starts land on the same row.
    #[serde(default)]
    pub session_token: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement returned to the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub event_id: String,
    pub user_id: Option<String>,
    pub subscription_id: Option<String>,
    /// "processed", "duplicate" or "ignored".
    pub outcome: String,
}

impl From<HandleBillingWebhookResult> for WebhookResponse {
    fn from(result: HandleBillingWebhookResult) -> Self {
        let outcome = match &result {
            HandleBillingWebhookResult::Processed { .. } => "processed",
            HandleBillingWebhookResult::Duplicate { .. } => "duplicate",
            HandleBillingWebhookResult::Ignored { .. } => "ignored",
        };
        Self {
            success: true,
            event_id: result.event_id().to_string(),
            user_id: result.user_id().map(|id| id.to_string()),
            subscription_id: result.subscription_id().map(str::to_string),
            outcome: outcome.to_string(),
        }
    }
}

/// Current entitlement of the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    pub tier: String,
    pub status: String,
    /// Absent for the unlimited tier.
    pub limit: Option<u32>,
    pub consumed: u32,
    /// Absent for the unlimited tier.
    pub remaining: Option<u32>,
    pub can_start: bool,
    pub period_end: Option<String>,
}

impl From<AccessSnapshot> for AccessResponse {
    fn from(snapshot: AccessSnapshot) -> Self {
        Self {
            tier: snapshot.tier.as_str().to_string(),
            status: snapshot.status.as_str().to_string(),
            limit: snapshot.limit,
            consumed: snapshot.consumed,
            remaining: snapshot.remaining,
            can_start: snapshot.can_start,
            period_end: snapshot.period_end.map(|t| t.to_string()),
        }
    }
}

/// A usage session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_token: String,
    pub session_kind: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub counted_toward_usage: bool,
    pub counted_at: Option<String>,
    pub duration_seconds: Option<i64>,
}

impl From<UsageSession> for SessionResponse {
    fn from(session: UsageSession) -> Self {
        Self {
            session_token: session.session_token.to_string(),
            session_kind: session.session_kind.to_string(),
            started_at: session.started_at.to_string(),
            ended_at: session.ended_at.map(|t| t.to_string()),
            counted_toward_usage: session.counted_toward_usage,
            counted_at: session.counted_at.map(|t| t.to_string()),
            duration_seconds: session.duration_seconds,
        }
    }
}

/// Response to `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session: SessionResponse,
    /// False when a retried start returned the existing row.
    pub created: bool,
    /// Entitlement evaluated for a newly created session.
    pub access: Option<AccessResponse>,
}

impl From<StartSessionResult> for StartSessionResponse {
    fn from(result: StartSessionResult) -> Self {
        Self {
            session: result.session.into(),
            created: result.created,
            access: result.access.map(AccessResponse::from),
        }
    }
}

/// Response to `POST /sessions/:token/counted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkCountedResponse {
    pub session_token: String,
    pub counted: bool,
    /// True when an earlier call already counted the session.
    pub already_counted: bool,
    /// Ledger value after this call's increment.
    pub consumed: Option<u32>,
}

impl MarkCountedResponse {
    pub fn new(session_token: String, result: MarkCountedResult) -> Self {
        match result {
            MarkCountedResult::Counted { consumed } => Self {
                session_token,
                counted: true,
                already_counted: false,
                consumed: Some(consumed),
            },
            MarkCountedResult::AlreadyCounted => Self {
                session_token,
                counted: true,
                already_counted: true,
                consumed: None,
            },
        }
    }
}

/// Response to `POST /sessions/:token/end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSessionResponse {
    pub session: SessionResponse,
    pub counted_on_end: bool,
    pub already_ended: bool,
}

impl From<EndSessionResult> for EndSessionResponse {
    fn from(result: EndSessionResult) -> Self {
        Self {
            session: result.session.into(),
            counted_on_end: result.counted_on_end,
            already_ended: result.already_ended,
        }
    }
}

/// Error body for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{SessionToken, Timestamp, UserId};
    use crate::domain::subscription::{SubscriptionStatus, Tier};
    use crate::domain::usage::SessionKind;

    #[test]
    fn start_request_token_is_optional() {
        let req: StartSessionRequest = serde_json::from_str(r#"{"session_kind":"osce"}"#).unwrap();
        assert_eq!(req.session_kind, "osce");
        assert!(req.session_token.is_none());
    }

    #[test]
    fn webhook_response_reports_outcome() {
        let response = WebhookResponse::from(HandleBillingWebhookResult::Processed {
            event_id: "evt-1".into(),
            user_id: UserId::new("user-1").unwrap(),
            subscription_id: Some("sub-9".into()),
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["subscription_id"], "sub-9");
        assert_eq!(json["outcome"], "processed");
    }

    #[test]
    fn unlimited_access_serializes_null_limit() {
        let response = AccessResponse::from(AccessSnapshot {
            tier: Tier::Unlimited,
            status: SubscriptionStatus::Active,
            limit: None,
            consumed: 42,
            remaining: None,
            can_start: true,
            period_end: None,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["tier"], "tier_unlimited");
        assert!(json["limit"].is_null());
        assert!(json["remaining"].is_null());
    }

    #[test]
    fn session_response_formats_timestamps() {
        let started = Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").unwrap();
        let session = UsageSession::start(
            SessionToken::new("tok-1").unwrap(),
            UserId::new("user-1").unwrap(),
            SessionKind::new("osce").unwrap(),
            started,
        );

        let response = SessionResponse::from(session);

        assert_eq!(response.session_token, "tok-1");
        assert_eq!(response.started_at, started.to_string());
        assert!(response.ended_at.is_none());
        assert!(!response.counted_toward_usage);
    }

    #[test]
    fn already_counted_is_still_counted() {
        let response = MarkCountedResponse::new("tok-1".into(), MarkCountedResult::AlreadyCounted);
        assert!(response.counted);
        assert!(response.already_counted);
        assert!(response.consumed.is_none());
    }
}
