use anyhow::{Context, Result};
use google_token_broker::api::{create_broker_router, BrokerAppState};
use google_token_broker::config::{load_config, BrokerConfig};
use google_token_broker::credentials::{
    CredentialStore, PlatformCredentialStore, SqliteCredentialStore,
};
use google_token_broker::identity::PlatformIdentityVerifier;
use google_token_broker::metrics::BrokerMetrics;
use google_token_broker::oauth::FlowContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "google_token_broker=info".into()),
        )
        .init();

    info!("Token broker starting...");

    // Optional TOML file, then environment overrides
    let mut config = match std::env::var("BROKER_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => BrokerConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());

    let missing = config.missing_settings();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "Configuration incomplete; broker requests will fail with 500 until it is fixed"
        );
    }

    info!(
        bind_addr = %config.bind_addr,
        provider = %config.provider,
        token_url = %config.token_url,
        sqlite_store = config.credentials_db.is_some(),
        "Configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let store: Arc<dyn CredentialStore> = match &config.credentials_db {
        Some(path) => {
            let store = SqliteCredentialStore::new(path)
                .context("Failed to initialize credential store")?;
            info!(path = %path, "SQLite credential store initialized");
            Arc::new(store)
        }
        None => Arc::new(PlatformCredentialStore::new(
            http.clone(),
            &config.platform_url,
            &config.service_role_key,
        )),
    };

    let verifier = Arc::new(PlatformIdentityVerifier::new(
        http.clone(),
        &config.platform_url,
        &config.service_role_key,
    ));

    let bind_addr = config.bind_addr.clone();
    let ctx = FlowContext {
        config: Arc::new(config),
        verifier,
        store,
        http,
        metrics: BrokerMetrics::new(),
    };

    let router = create_broker_router(BrokerAppState::new(ctx));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "Token broker listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Token broker server error")?;

    info!("Token broker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
