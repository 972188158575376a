//! Meridian API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use meridian_api::config::ApiConfig;
use meridian_api::routes;
use meridian_api::state::AppState;
use meridian_core::clock::SystemClock;
use meridian_core::jitter::ThreadRngJitter;
use meridian_core::registry::PayloadRegistry;
use meridian_core::store::{DeadLetterStore, EventStore, SnapshotStore, SubscriptionStore};
use meridian_dispatch::Dispatcher;
use meridian_event_store::pg_dead_letter_store::PgDeadLetterStore;
use meridian_event_store::pg_event_store::PgEventStore;
use meridian_event_store::pg_snapshot_store::PgSnapshotStore;
use meridian_event_store::pg_subscription_store::PgSubscriptionStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Meridian event backbone");

    let config = ApiConfig::from_env()?;

    // Create database connection pool and apply migrations. The event
    // log is the audit source of truth; it is always PostgreSQL-backed.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Wire the four stores explicitly.
    let events: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(PgSnapshotStore::new(pool.clone()));
    let subscriptions: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool.clone()));
    let dead_letters: Arc<dyn DeadLetterStore> = Arc::new(PgDeadLetterStore::new(pool));

    // Payload schemas are registered by deployment-specific setup; the
    // registry accepts unknown types.
    let registry = Arc::new(PayloadRegistry::new());

    // Start the delivery workers.
    let transport = config.delivery_mode.transport(config.delivery_timeout);
    let dispatcher = Dispatcher::start(
        events.clone(),
        subscriptions.clone(),
        dead_letters.clone(),
        transport,
        Arc::new(SystemClock),
        Arc::new(ThreadRngJitter),
        config.dispatcher.clone(),
    );
    tracing::info!(transport = dispatcher.transport_name(), "delivery transport selected");

    // Build application state and router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app_state = AppState::new(events, snapshots, subscriptions, dead_letters, registry);
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/events", routes::events::router())
        .nest("/api/v1/snapshots", routes::snapshots::router())
        .nest("/api/v1/subscriptions", routes::subscriptions::router())
        .nest("/api/v1/dead-letters", routes::dead_letters::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight deliveries finish or time out before exiting.
    dispatcher.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
