//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::auth::{Authenticator, StaticTokenAuthenticator};
use api::config::{Config, LogFormat};
use domain::{CatalogLookup, InMemoryCatalog};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (json, text) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

async fn load_catalog(config: &Config) -> Result<InMemoryCatalog, BoxError> {
    let Some(path) = &config.catalog_path else {
        tracing::warn!("CATALOG_PATH not set, starting with an empty catalog");
        return Ok(InMemoryCatalog::new());
    };

    let json = tokio::fs::read_to_string(path).await?;
    let catalog = InMemoryCatalog::from_json(&json)?;
    tracing::info!(path = %path.display(), products = catalog.len().await, "catalog loaded");
    Ok(catalog)
}

fn load_authenticator(config: &Config) -> Result<StaticTokenAuthenticator, BoxError> {
    let Some(tokens) = &config.api_tokens else {
        tracing::warn!("API_TOKENS not set, every /api request will be rejected");
        return Ok(StaticTokenAuthenticator::new());
    };

    let authenticator = StaticTokenAuthenticator::parse(tokens)?;
    tracing::info!(tokens = authenticator.len(), "API tokens loaded");
    Ok(authenticator)
}

async fn serve<S: EventStore + Clone + 'static>(
    config: &Config,
    event_store: S,
    catalog: CatalogLookup,
    authenticator: Arc<dyn Authenticator>,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let state = api::create_state(event_store, catalog, authenticator);

    // Replay existing events into the order list before taking traffic.
    let replayed = state.projections.run_catch_up().await?;
    tracing::info!(events = replayed, "projections caught up");

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let catalog = Arc::new(load_catalog(&config).await?);
    let catalog = CatalogLookup::new(catalog, config.catalog_timeout);
    let authenticator: Arc<dyn Authenticator> = Arc::new(load_authenticator(&config)?);

    match &config.database_url {
        Some(url) => {
            let store = PostgresEventStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using Postgres event store");
            serve(&config, store, catalog, authenticator, metrics_handle).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory event store");
            serve(
                &config,
                InMemoryEventStore::new(),
                catalog,
                authenticator,
                metrics_handle,
            )
            .await
        }
    }
}
