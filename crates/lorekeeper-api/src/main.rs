//! Lorekeeper API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use lorekeeper_api::collaborators::{
    HttpCompletionProvider, TemplatePromptRenderer, TracingNotifier,
};
use lorekeeper_api::config::AppConfig;
use lorekeeper_api::error::AppError;
use lorekeeper_api::state::{AppState, Collaborators};
use lorekeeper_core::clock::SystemClock;
use lorekeeper_core::store::DocumentStore;
use lorekeeper_document_store::{InMemoryDocumentStore, PgDocumentStore};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

async fn document_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set; documents are kept in memory");
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    let store = PgDocumentStore::new(pool);
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}

/// Periodically drops settled lifecycle records.
fn spawn_status_eviction(state: &AppState, ttl: std::time::Duration) {
    let tracker = state.tracker.clone();
    let older_than = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::hours(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl.max(std::time::Duration::from_secs(60)));
        loop {
            interval.tick().await;
            tracker.evict_settled(older_than);
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Lorekeeper API server");

    let config = AppConfig::from_env()?;

    let collaborators = Collaborators {
        store: document_store(&config).await?,
        renderer: Arc::new(TemplatePromptRenderer),
        provider: Arc::new(HttpCompletionProvider::new(
            config.completion_url.clone(),
            config.completion_model.clone(),
        )?),
        notifier: Arc::new(TracingNotifier),
        clock: Arc::new(SystemClock),
    };
    let app_state = AppState::assemble(
        collaborators,
        config.queue.clone(),
        config.creation_retry,
        config.poll_timeout,
    )?;
    spawn_status_eviction(&app_state, config.status_ttl);
    let queue = app_state.queue.clone();

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = lorekeeper_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    queue.shutdown();
    Ok(())
}
