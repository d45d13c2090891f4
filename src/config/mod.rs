//! Runtime configuration for the quota engine.
//!
//! Sources, lowest precedence first: `.env` (via dotenvy), an optional
//! `quota-engine.toml` in the working directory, then `QUOTA_ENGINE__*`
//! environment variables with `__` separating nested keys.
//!
//! ```no_run
//! use quota_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("config");
//! config.validate().expect("valid config");
//! let policy = config.quota.to_policy().expect("quota policy");
//! assert!(policy.basic_limit > 0);
//! ```

mod billing;
mod database;
mod error;
mod quota;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use quota::QuotaConfig;
pub use server::{Environment, LogFormat, ServerConfig};

use serde::Deserialize;

/// Root configuration, one field per section.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Billing webhook configuration (secret, retry schedule)
    #[serde(default)]
    pub billing: BillingConfig,

    /// Quota policy (tier ceilings, plan map, timing constants)
    #[serde(default)]
    pub quota: QuotaConfig,
}

impl AppConfig {
    /// Read every source and deserialize into typed sections.
    ///
    /// `QUOTA_ENGINE__BILLING__WEBHOOK_SECRET=whsec_x` sets
    /// `billing.webhook_secret`; `QUOTA_ENGINE__QUOTA__PLAN_TIERS=101:tier_basic`
    /// sets `quota.plan_tiers`. Only `database.url` has no default.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("quota-engine").required(false))
            .add_source(
                config::Environment::default()
                    .prefix("QUOTA_ENGINE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Checks each section; the billing section depends on the environment.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.billing.validate(&self.server.environment)?;
        self.quota.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("QUOTA_ENGINE__DATABASE__URL", "postgresql://test@localhost/test");
    }

    fn clear_env() {
        for key in [
            "QUOTA_ENGINE__DATABASE__URL",
            "QUOTA_ENGINE__SERVER__PORT",
            "QUOTA_ENGINE__SERVER__ENVIRONMENT",
            "QUOTA_ENGINE__BILLING__WEBHOOK_SECRET",
            "QUOTA_ENGINE__QUOTA__PLAN_TIERS",
            "QUOTA_ENGINE__QUOTA__BASIC_LIMIT",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert!(config.billing.webhook_secret.is_none());
    }

    #[test]
    fn test_validate_minimal_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.unwrap().validate().is_ok());
    }

    #[test]
    fn test_server_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn test_nested_sections_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("QUOTA_ENGINE__BILLING__WEBHOOK_SECRET", "whsec_abc");
        env::set_var("QUOTA_ENGINE__QUOTA__PLAN_TIERS", "101:tier_basic,102:tier_mid");
        env::set_var("QUOTA_ENGINE__QUOTA__BASIC_LIMIT", "25");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(
            config.billing.webhook_secret.as_ref().map(|s| s.expose_secret().as_str()),
            Some("whsec_abc")
        );
        let policy = config.quota.to_policy().unwrap();
        assert_eq!(policy.basic_limit, 25);
        assert_eq!(policy.plan_tiers.len(), 2);
    }

    #[test]
    fn test_production_requires_webhook_secret() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("QUOTA_ENGINE__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::WebhookSecretRequired)
        ));
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("QUOTA_ENGINE__SERVER__PORT", "3000");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
    }
}
