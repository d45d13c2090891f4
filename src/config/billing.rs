//! Billing webhook configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;
use crate::application::RetryPolicy;

/// Billing webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Shared HMAC secret for webhook signatures. Without it every webhook is
    /// rejected as a server misconfiguration.
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,

    /// Retries after the first attempt for transient store failures
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,

    /// Delay before the first retry, doubling after each
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl BillingConfig {
    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret
            .as_ref()
            .is_some_and(|s| !s.expose_secret().trim().is_empty())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_base_delay_ms)
    }

    /// Validate billing configuration
    ///
    /// A missing secret is tolerated outside production so the engine can run
    /// locally; webhooks then fail with a server error.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if *environment == Environment::Production && !self.has_webhook_secret() {
            return Err(ValidationError::WebhookSecretRequired);
        }
        if self.retry_max_attempts > 10 {
            return Err(ValidationError::InvalidRetry("retry_max_attempts must be at most 10"));
        }
        if self.retry_base_delay_ms > 60_000 {
            return Err(ValidationError::InvalidRetry("retry_base_delay_ms must be at most 60000"));
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_retry_max_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2_000
}
