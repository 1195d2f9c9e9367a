//! Orchard Server - reconciliation service for farm tree records.
//!
//! This server exposes HTTP endpoints to compare the tree records uploaded
//! from the mobile app against the canonical cloud store, and to migrate
//! mobile-only trees into the cloud using the orchard-engine logic.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod routes;

use crate::config::Config;
use crate::db::{PgCloudStore, PgMobileSource, Pool};
use axum::Router;
use orchard_engine::{CancellationToken, ReconcileEngine};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The engine wired to the Postgres-backed stores.
pub type TreeEngine = ReconcileEngine<PgMobileSource, PgCloudStore>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub engine: Arc<TreeEngine>,
    /// Cancelled on shutdown; in-flight migrations stop between ids
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pool: Pool, config: Config) -> Self {
        let engine = ReconcileEngine::new(
            PgMobileSource::new(pool.clone(), config.cloud_page_size),
            PgCloudStore::new(pool.clone(), config.cloud_page_size),
        )
        .with_policy(config.compare_policy())
        .with_migration_options(config.migration_options());

        Self {
            pool,
            config: Arc::new(config),
            engine: Arc::new(engine),
            shutdown: CancellationToken::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "orchard_server=debug,orchard_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Orchard Server on {}:{}", config.host, config.port);
    tracing::info!(
        float_epsilon = config.float_epsilon,
        ignored_fields = ?config.ignored_fields,
        migration_concurrency = config.migration_concurrency,
        "Reconciliation settings"
    );

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Build application state
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(pool, config);
    let shutdown = state.shutdown.clone();

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down, cancelling in-flight migrations");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
