//! HTTP handlers for the quota engine endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::billing::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler,
};
use crate::application::handlers::usage::{
    CheckAccessHandler, CheckAccessQuery, EndSessionCommand, EndSessionHandler, GetSessionHandler,
    GetSessionQuery, MarkCountedCommand, MarkCountedHandler, StartSessionCommand,
    StartSessionHandler,
};
use crate::application::RetryPolicy;
use crate::domain::billing::{WebhookError, WebhookVerifier};
use crate::domain::foundation::UserId;
use crate::domain::subscription::QuotaPolicy;
use crate::domain::usage::UsageError;
use crate::ports::{
    BillingEventStore, Clock, QuotaLedger, SubscriptionRepository, UsageSessionRepository,
    UserDirectory,
};

use super::dto::{
    AccessResponse, EndSessionResponse, ErrorResponse, MarkCountedResponse, SessionResponse,
    StartSessionRequest, StartSessionResponse, WebhookResponse,
};

/// Header carrying the provider's HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Header carrying the caller identity set by the gateway.
pub const USER_ID_HEADER: &str = "X-User-Id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; handlers are built on demand from the Arc'd ports.
#[derive(Clone)]
pub struct QuotaAppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub ledger: Arc<dyn QuotaLedger>,
    pub billing_events: Arc<dyn BillingEventStore>,
    pub sessions: Arc<dyn UsageSessionRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
    pub verifier: Arc<WebhookVerifier>,
    pub policy: Arc<QuotaPolicy>,
    pub retry: RetryPolicy,
}

impl QuotaAppState {
    pub fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.verifier.clone(),
            self.billing_events.clone(),
            self.subscriptions.clone(),
            self.users.clone(),
            self.clock.clone(),
            self.policy.clone(),
            self.retry,
        )
    }

    pub fn check_access_handler(&self) -> CheckAccessHandler {
        CheckAccessHandler::new(
            self.subscriptions.clone(),
            self.ledger.clone(),
            self.clock.clone(),
            self.policy.clone(),
        )
    }

    pub fn start_session_handler(&self) -> StartSessionHandler {
        StartSessionHandler::new(
            Arc::new(self.check_access_handler()),
            self.sessions.clone(),
            self.clock.clone(),
        )
    }

    pub fn mark_counted_handler(&self) -> MarkCountedHandler {
        MarkCountedHandler::new(
            Arc::new(self.check_access_handler()),
            self.sessions.clone(),
            self.ledger.clone(),
            self.clock.clone(),
            self.policy.clone(),
        )
    }

    pub fn end_session_handler(&self) -> EndSessionHandler {
        EndSessionHandler::new(
            Arc::new(self.check_access_handler()),
            self.sessions.clone(),
            self.ledger.clone(),
            self.clock.clone(),
            self.policy.clone(),
        )
    }

    pub fn get_session_handler(&self) -> GetSessionHandler {
        GetSessionHandler::new(self.sessions.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller Identity
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity extracted from the `X-User-Id` header.
///
/// Authentication happens upstream; the gateway forwards the verified id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s.trim()).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoint (no caller identity, signature verified)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/billing - Handle billing provider webhooks
pub async fn handle_billing_webhook(
    State(state): State<QuotaAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let handler = state.webhook_handler();
    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(WebhookResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /access - Current entitlement of the caller
pub async fn check_access(
    State(state): State<QuotaAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, UsageApiError> {
    let handler = state.check_access_handler();
    let query = CheckAccessQuery {
        user_id: user.user_id,
    };

    let snapshot = handler.handle(query).await?;

    Ok(Json(AccessResponse::from(snapshot)))
}

/// GET /sessions/:token - Read one of the caller's sessions
pub async fn get_session(
    State(state): State<QuotaAppState>,
    user: AuthenticatedUser,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, UsageApiError> {
    let handler = state.get_session_handler();
    let query = GetSessionQuery {
        user_id: user.user_id,
        session_token: token,
    };

    let session = handler.handle(query).await?;

    Ok(Json(SessionResponse::from(session)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /sessions - Start a usage session
///
/// 201 when a row was created, 200 when a retried start found the existing one.
pub async fn start_session(
    State(state): State<QuotaAppState>,
    user: AuthenticatedUser,
    Json(request): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, UsageApiError> {
    let handler = state.start_session_handler();
    let cmd = StartSessionCommand {
        user_id: user.user_id,
        session_kind: request.session_kind,
        session_token: request.session_token,
    };

    let result = handler.handle(cmd).await?;

    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(StartSessionResponse::from(result))))
}

/// POST /sessions/:token/counted - Count a session toward usage
pub async fn mark_counted(
    State(state): State<QuotaAppState>,
    user: AuthenticatedUser,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, UsageApiError> {
    let handler = state.mark_counted_handler();
    let cmd = MarkCountedCommand {
        user_id: user.user_id,
        session_token: token.clone(),
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(MarkCountedResponse::new(token, result)))
}

/// POST /sessions/:token/end - End (or cancel) a session
pub async fn end_session(
    State(state): State<QuotaAppState>,
    user: AuthenticatedUser,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, UsageApiError> {
    let handler = state.end_session_handler();
    let cmd = EndSessionCommand {
        user_id: user.user_id,
        session_token: token,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(EndSessionResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error for the webhook endpoint.
pub struct BillingApiError(WebhookError);

impl From<WebhookError> for BillingApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Webhook processing failed");
        }
        let body = ErrorResponse::new(self.0.code(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}

/// API error for the session endpoints.
pub struct UsageApiError(UsageError);

impl From<UsageError> for UsageApiError {
    fn from(err: UsageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for UsageApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Session request failed");
        }
        let body = ErrorResponse::new(self.0.code(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}
