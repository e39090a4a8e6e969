//! broker_server: standalone service broker backed by the bundled static
//! backend. Configuration is read from the environment; see
//! [`broker_server::config`].

use std::sync::Arc;

use anyhow::Context;
use broker_core::{BrokerRegistry, LifecycleOrchestrator};
use broker_server::config::BrokerConfig;
use broker_server::router::build_router;
use broker_server::static_backend::StaticBackingService;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BrokerConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .init();

    if config.credentials.is_empty() {
        tracing::warn!("no broker credentials configured; authentication is disabled");
    }
    if !config.version_check {
        tracing::warn!("X-Broker-Api-Version check is disabled");
    }

    let backend = match &config.catalog_path {
        Some(path) => StaticBackingService::from_path(path)?,
        None => StaticBackingService::sample(),
    };
    let registry = BrokerRegistry::single(Arc::new(backend))?;
    let broker = Arc::new(LifecycleOrchestrator::new(registry));

    let app = build_router(broker, config.settings());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        min_api_version = %config.min_api_version,
        "broker_server listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
