//! quota-engine server binary.

use std::sync::Arc;

use secrecy::SecretString;
use tracing_subscriber::{fmt, EnvFilter};

use quota_engine::adapters::http::{build_app, QuotaAppState};
use quota_engine::adapters::postgres::{
    PostgresBillingEventStore, PostgresSubscriptionStore, PostgresUsageSessionRepository,
    PostgresUserDirectory,
};
use quota_engine::config::{AppConfig, LogFormat};
use quota_engine::domain::billing::WebhookVerifier;
use quota_engine::ports::SystemClock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let policy = Arc::new(config.quota.to_policy()?);
    let addr = config.server.socket_addr()?;

    tracing::info!(database = %config.database.redacted_url(), "Connecting to database");
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let statement_timeout = config.database.statement_timeout();
    let subscriptions = Arc::new(PostgresSubscriptionStore::new(pool.clone(), statement_timeout));
    let secret: Option<SecretString> = config.billing.webhook_secret.clone();
    if secret.is_none() {
        tracing::warn!("No webhook secret configured; billing webhooks will be rejected");
    }

    let state = QuotaAppState {
        subscriptions: subscriptions.clone(),
        ledger: subscriptions,
        billing_events: Arc::new(PostgresBillingEventStore::new(pool.clone(), statement_timeout)),
        sessions: Arc::new(PostgresUsageSessionRepository::new(
            pool.clone(),
            statement_timeout,
        )),
        users: Arc::new(PostgresUserDirectory::new(pool.clone(), statement_timeout)),
        clock: Arc::new(SystemClock),
        verifier: Arc::new(WebhookVerifier::new(secret)),
        policy,
        retry: config.billing.retry_policy(),
    };

    let app = build_app(state, config.server.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Listening for incoming connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    match config.server.log_format() {
        LogFormat::Json => fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
}
