//! LogSentinel Backend Server
//!
//! Security-log anomaly detection backend: logs come in over REST, get
//! scored by threshold rules plus an optional AI classifier, and fan out
//! to live subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        LOGSENTINEL                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌────────────┐  ┌─────────────────────────┐  │
//! │  │  API      │  │  Ingestion │  │  Analysis Scheduler     │  │
//! │  │  (Axum)   │─▶│  Pipeline  │  │  (AI Classifier)        │  │
//! │  └─────┬─────┘  └─────┬──────┘  └────────────┬────────────┘  │
//! │        │              ├──── fan-out ─────────┤               │
//! │        ▼              ▼                      ▼               │
//! │              ┌─────────────┐                                 │
//! │              │ PostgreSQL  │                                 │
//! │              └─────────────┘                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod analysis;
mod config;
mod db;
mod detection;
mod error;
mod events;
mod handlers;
mod models;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analysis::classifier::AiAnalyzer;
use analysis::scheduler::{AnalysisScheduler, SchedulerSettings};
use anyhow::Context;
use events::AnomalyBroadcaster;
use storage::{MemoryStorage, PgStorage, Storage};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging
    let default_filter = if config.is_production() {
        "logsentinel=info"
    } else {
        "logsentinel=debug,tower_http=debug"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("LogSentinel server starting...");

    let storage: Arc<dyn Storage> = if config.database_url == "memory" {
        tracing::warn!("Using in-memory storage - nothing will survive a restart");
        Arc::new(MemoryStorage::new())
    } else {
        tracing::info!(
            "Database: {}",
            config.database_url.split('@').last().unwrap_or("***")
        );

        let pool = db::create_pool(&config.database_url)
            .await
            .context("Failed to create database pool")?;

        tracing::info!("Running database migrations...");
        db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Arc::new(PgStorage::new(pool))
    };

    let events = AnomalyBroadcaster::new();

    let analyzer = AiAnalyzer::from_config(&config);
    let ai_enabled = analyzer.is_enabled();

    let scheduler = AnalysisScheduler::new(
        Arc::clone(&storage),
        analyzer,
        events.clone(),
        SchedulerSettings::from_config(&config),
    );

    if ai_enabled {
        scheduler.spawn();
    } else {
        tracing::warn!("AI analysis disabled - periodic scheduler not started");
    }

    // Build application state
    let state = AppState {
        storage,
        events,
        scheduler,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub events: AnomalyBroadcaster,
    pub scheduler: Arc<AnalysisScheduler>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        // Log ingestion + queries
        .route("/api/v1/logs", post(handlers::logs::ingest))
        .route("/api/v1/logs", get(handlers::logs::by_ip))
        // Anomalies
        .route("/api/v1/anomalies", get(handlers::anomalies::list))
        .route(
            "/api/v1/anomalies/:id/status",
            put(handlers::anomalies::update_status),
        )
        // AI analysis
        .route("/api/v1/analysis/summary", get(handlers::analysis::summary))
        .route("/api/v1/analysis/trigger", post(handlers::analysis::trigger))
        // Live anomaly stream
        .route(
            "/api/v1/events/anomalies",
            get(handlers::events::stream_anomalies),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("🛑 Shutting down gracefully...");
}
