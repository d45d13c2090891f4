//! HandleBillingWebhookHandler - Command handler for billing provider webhooks.
//!
//! Pipeline: verify signature, parse, claim the event id in the event store,
//! resolve the local user, apply the transition, persist, record the outcome.
//! Every claimed event ends with a recorded status: `processed`, `ignored`
//! or `failed`.

use std::sync::Arc;

use crate::application::retry::{retry_transient, RetryFailure, RetryPolicy};
use crate::domain::billing::{BillingEvent, BillingEventType, WebhookError, WebhookVerifier};
use crate::domain::foundation::{ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{apply_event, QuotaPolicy, Subscription};
use crate::ports::{
    BillingEventStore, Clock, EventOutcome, IngestResult, NewBillingEvent, SubscriptionRepository,
    UserDirectory,
};

/// Reapplications allowed when the stored billing window moves under a transition.
const MAX_STALE_WINDOW_ATTEMPTS: u32 = 3;

/// Command to handle one webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// `X-Signature` header value.
    pub signature: Option<String>,
}

/// Result of webhook processing. All variants are acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleBillingWebhookResult {
    /// The transition was applied.
    Processed {
        event_id: String,
        user_id: UserId,
        subscription_id: Option<String>,
    },
    /// The event id was already handled or is in flight.
    Duplicate {
        event_id: String,
        user_id: Option<UserId>,
        subscription_id: Option<String>,
    },
    /// Recorded but not applied.
    Ignored {
        event_id: String,
        user_id: Option<UserId>,
        reason: String,
    },
}

impl HandleBillingWebhookResult {
    pub fn event_id(&self) -> &str {
        match self {
            Self::Processed { event_id, .. }
            | Self::Duplicate { event_id, .. }
            | Self::Ignored { event_id, .. } => event_id,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Processed { user_id, .. } => Some(user_id),
            Self::Duplicate { user_id, .. } | Self::Ignored { user_id, .. } => user_id.as_ref(),
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::Processed {
                subscription_id, ..
            }
            | Self::Duplicate {
                subscription_id, ..
            } => subscription_id.as_deref(),
            Self::Ignored { .. } => None,
        }
    }
}

/// Summary of a manual replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReprocessSummary {
    pub attempted: usize,
    pub processed: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// Handler for billing provider webhooks.
pub struct HandleBillingWebhookHandler {
    verifier: Arc<WebhookVerifier>,
    events: Arc<dyn BillingEventStore>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    policy: Arc<QuotaPolicy>,
    retry: RetryPolicy,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        verifier: Arc<WebhookVerifier>,
        events: Arc<dyn BillingEventStore>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        policy: Arc<QuotaPolicy>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            verifier,
            events,
            subscriptions,
            users,
            clock,
            policy,
            retry,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<HandleBillingWebhookResult, WebhookError> {
        // 1. Authenticate the exact bytes received
        if let Err(err) = self.verifier.verify(&cmd.payload, cmd.signature.as_deref()) {
            tracing::warn!(error = %err, "Webhook signature rejected");
            return Err(err);
        }

        // 2. Parse
        let event = BillingEvent::parse(&cmd.payload)?;
        let raw_payload = String::from_utf8_lossy(&cmd.payload).into_owned();

        self.process(event, raw_payload).await
    }

    /// Re-runs stored payloads of failed events, oldest first.
    ///
    /// Payloads were authenticated when first received, so the signature is
    /// not checked again.
    pub async fn reprocess_failed(&self, limit: u32) -> Result<ReprocessSummary, WebhookError> {
        let failed = self
            .events
            .list_failed(limit)
            .await
            .map_err(|e| WebhookError::Store(e.to_string()))?;

        let mut summary = ReprocessSummary::default();
        for record in failed {
            summary.attempted += 1;
            let outcome = match BillingEvent::parse(record.raw_payload.as_bytes()) {
                Ok(event) => self.process(event, record.raw_payload.clone()).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(HandleBillingWebhookResult::Processed { .. }) => summary.processed += 1,
                Ok(_) => summary.ignored += 1,
                Err(err) => {
                    tracing::warn!(event_id = %record.event_id, error = %err, "Replay failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            processed = summary.processed,
            failed = summary.failed,
            "Failed billing events replayed"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        event: BillingEvent,
        raw_payload: String,
    ) -> Result<HandleBillingWebhookResult, WebhookError> {
        let now = self.clock.now();
        let event_id = event.event_id.clone();

        // 3. Claim the event id
        let stale_before = now.minus_secs(self.policy.stale_claim_secs);
        let new_event = NewBillingEvent {
            event_id: event_id.clone(),
            event_type: event.event_name.clone(),
            raw_payload,
            received_at: now,
        };
        let ingest = retry_transient(&self.retry, "billing_event.ingest", || {
            self.events.ingest(new_event.clone(), stale_before)
        })
        .await
        .map_err(store_failure)?;

        if let IngestResult::Duplicate(existing) = ingest {
            tracing::info!(
                event_id = %event_id,
                status = %existing.processing_status,
                deliveries = existing.delivery_count,
                "Duplicate billing event delivery"
            );
            return Ok(HandleBillingWebhookResult::Duplicate {
                event_id,
                user_id: existing.user_id,
                subscription_id: existing.subscription_id,
            });
        }

        if event.event_type == BillingEventType::Unknown {
            let reason = format!("unsupported event type '{}'", event.event_name);
            self.record(&event_id, EventOutcome::ignored(reason.clone(), None, now))
                .await?;
            return Ok(HandleBillingWebhookResult::Ignored {
                event_id,
                user_id: None,
                reason,
            });
        }

        // 4. Resolve the local user before any mutation
        let Some(email) = event.attributes.user_email.clone() else {
            let err = WebhookError::MissingField("data.attributes.user_email");
            self.record(&event_id, EventOutcome::failed(err.to_string(), None, now))
                .await?;
            return Err(err);
        };

        let user_id = match retry_transient(&self.retry, "user_directory.lookup", || {
            self.users.find_user_id_by_email(&email)
        })
        .await
        {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                let err = WebhookError::UserNotFound(email);
                tracing::warn!(event_id = %event_id, error = %err, "Billing event for unknown user");
                self.record(&event_id, EventOutcome::failed(err.to_string(), None, now))
                    .await?;
                return Err(err);
            }
            Err(failure) => return self.fail(&event_id, None, failure, now).await,
        };

        // 5-7. Load, apply and persist. The write is guarded on the billing window
        // that was read; if a period rollover moved it meanwhile, reapply.
        let mut attempt = 1;
        let (transition, saved) = loop {
            let current = match retry_transient(&self.retry, "subscription.find", || {
                self.subscriptions.find_by_user_id(&user_id)
            })
            .await
            {
                Ok(Some(subscription)) => subscription,
                Ok(None) => Subscription::free_default(user_id.clone(), &self.policy, now),
                Err(failure) => return self.fail(&event_id, Some(user_id), failure, now).await,
            };

            let transition = match apply_event(&current, &event, &self.policy, now) {
                Ok(transition) => transition,
                Err(err) => {
                    let reason = err.to_string();
                    tracing::info!(event_id = %event_id, user_id = %user_id, reason = %reason, "Billing event ignored");
                    self.record(
                        &event_id,
                        EventOutcome::ignored(reason.clone(), Some(user_id.clone()), now),
                    )
                    .await?;
                    return Ok(HandleBillingWebhookResult::Ignored {
                        event_id,
                        user_id: Some(user_id),
                        reason,
                    });
                }
            };

            let reset = transition.resets_consumed();
            match retry_transient(&self.retry, "subscription.save_transition", || {
                self.subscriptions
                    .save_transition(&transition.subscription, reset, current.period_end)
            })
            .await
            {
                Ok(saved) => break (transition, saved),
                Err(failure)
                    if failure.error.code == ErrorCode::Conflict
                        && attempt < MAX_STALE_WINDOW_ATTEMPTS =>
                {
                    tracing::debug!(event_id = %event_id, user_id = %user_id, attempt, "Billing window changed during transition, reapplying");
                    attempt += 1;
                }
                Err(failure) => return self.fail(&event_id, Some(user_id), failure, now).await,
            }
        };

        if transition.used_fallback_tier() {
            tracing::warn!(
                event_id = %event_id,
                variant_id = ?event.attributes.variant_id,
                fallback = %transition.subscription.tier,
                "Unmapped plan id, using fallback tier"
            );
        }
        let reset = transition.resets_consumed();

        tracing::info!(
            event_id = %event_id,
            user_id = %user_id,
            event_type = %event.event_type,
            tier = %saved.tier,
            status = %saved.status,
            from_tier = %transition.previous_tier,
            from_status = %transition.previous_status,
            consumed_reset = reset,
            "Subscription updated from billing event"
        );

        // 8. Record the outcome
        let subscription_id = saved.external_subscription_id.clone();
        self.record(
            &event_id,
            EventOutcome::processed(user_id.clone(), subscription_id.clone(), now),
        )
        .await?;

        Ok(HandleBillingWebhookResult::Processed {
            event_id,
            user_id,
            subscription_id,
        })
    }

    async fn record(&self, event_id: &str, outcome: EventOutcome) -> Result<(), WebhookError> {
        retry_transient(&self.retry, "billing_event.record_outcome", || {
            self.events.record_outcome(event_id, outcome.clone())
        })
        .await
        .map_err(|failure| {
            tracing::error!(event_id, error = %failure.error, "Could not record billing event outcome");
            store_failure(failure)
        })
    }

    async fn fail(
        &self,
        event_id: &str,
        user_id: Option<UserId>,
        failure: RetryFailure,
        now: Timestamp,
    ) -> Result<HandleBillingWebhookResult, WebhookError> {
        let err = store_failure(failure);
        self.record(event_id, EventOutcome::failed(err.to_string(), user_id, now))
            .await?;
        Err(err)
    }
}

fn store_failure(failure: RetryFailure) -> WebhookError {
    if failure.exhausted {
        WebhookError::RetriesExhausted(failure.error.to_string())
    } else {
        WebhookError::Store(failure.error.to_string())
    }
}
