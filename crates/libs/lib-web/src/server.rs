//! # Server Setup
//!
//! Wires the relay together and runs it:
//!
//! 1. tracing, configuration, database and migrations
//! 2. task queue and result channel (SQLite/in-process or Redis)
//! 3. gateway, result fan-out and worker, sharing one connection registry
//! 4. the HTTP server, until Ctrl-C
//!
//! On shutdown one [`CancellationToken`] stops the fan-out, the worker (between
//! tasks) and every open socket, then the database pool is closed.

// region: --- Imports
use axum::{routing::get, Router};
use lib_auth::{DelegatedTokenMinter, JwtVerifier, TokenVerifier};
use lib_core::{create_pool, migrate, Config, SqliteChatStore};
use lib_dispatch::{connect_transport, WebhookResponder, Worker, WorkerConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::gateway::{spawn_result_fanout, ConnectionRegistry, Gateway};
use crate::handlers;
use crate::middleware::{log_requests, stamp_req};
// endregion: --- Imports

// region: --- AppState
/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Fires when the server shuts down; open sockets close on it
    pub shutdown: CancellationToken,
}
// endregion: --- AppState

// region: --- Server Configuration
/// Server configuration
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8000")
    pub bind_address: String,
    /// Allowed CORS origins
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}
// endregion: --- Server Configuration

// region: --- Server Setup
/// Initialize and run the relay until Ctrl-C.
///
/// # Errors
///
/// This function will return an error if:
/// - Configuration loading or validation fails
/// - Database connection or migrations fail
/// - The queue backend cannot be reached
/// - Server binding fails
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();

    info!("Loading configuration...");
    let app_config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    app_config.validate().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists for SQLite database
    if let Some(db_path) = app_config.database_url.strip_prefix("sqlite:") {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created database directory: {:?}", parent);
            }
        }
    }

    info!("Connecting to database {}...", app_config.database_url);
    let pool = create_pool(&app_config.database_url).await?;
    migrate(&pool).await?;
    info!(" Migrations complete");

    let transport = connect_transport(&app_config, &pool).await?;
    let store = Arc::new(SqliteChatStore::new(pool.clone()));
    let responder = Arc::new(WebhookResponder::new(&app_config.responder_url)?);
    info!(" AI responder: {}", app_config.responder_url);

    let registry = ConnectionRegistry::new();
    let gateway = Gateway::new(
        store.clone(),
        transport.queue.clone(),
        DelegatedTokenMinter::new(&app_config.delegated_token_secret, app_config.delegated_token_ttl()),
        registry.clone(),
    );

    let shutdown = CancellationToken::new();

    let fanout = spawn_result_fanout(
        registry,
        transport.results.clone(),
        shutdown.clone(),
        app_config.worker_backoff(),
    )
    .await?;

    let worker = Worker::new(
        transport.queue.clone(),
        transport.results.clone(),
        store,
        responder,
        WorkerConfig::from_config(&app_config),
    );
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState {
        gateway,
        verifier: Arc::new(JwtVerifier::new(&app_config.access_token_secret)),
        shutdown: shutdown.clone(),
    };
    let app = create_router(state, config.allowed_origins.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(" SERVER READY: http://{}", config.bind_address);
    log_server_info();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = worker.await {
        tracing::error!("Worker task failed: {:?}", e);
    }
    if let Err(e) = fanout.await {
        tracing::error!("Fan-out task failed: {:?}", e);
    }
    pool.close().await;

    info!(" Shutdown complete");
    Ok(())
}

/// Create the application router
pub fn create_router(state: AppState, allowed_origins: Vec<String>) -> Router {
    use axum::http::{HeaderValue, Method};

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([axum::http::header::AUTHORIZATION]);

    info!("[ROUTE SETUP] Registering HTTP routes...");
    Router::new()
        .route("/ws", get(handlers::websocket::chat_websocket))
        .route("/health", get(handlers::health::health))
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "Route not found") })
        .with_state(state)
        // Request stamping (adds request ID) - must be first
        .layer(axum::middleware::from_fn(stamp_req))
        .layer(axum::middleware::from_fn(log_requests))
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .extensions()
                    .get::<crate::middleware::RequestStamp>()
                    .map(|s| s.id.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(cors)
}

/// Configure the global subscriber from `LOG_LEVEL` (default `info`).
///
/// A `RUST_LOG` directive, when set, takes precedence.
fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .try_init();

    if initialized.is_ok() {
        info!(" CHAT RELAY STARTING");
        info!(" Log level: {}", log_level);
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!(" Shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

/// Log server information
fn log_server_info() {
    info!(" CHAT:");
    info!("   • GET  /ws?token={{access_token}}  (WebSocket)");
    info!(" HEALTH:");
    info!("   • GET  /health");
}
// endregion: --- Server Setup
