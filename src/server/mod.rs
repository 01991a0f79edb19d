//! HTTP server: REST endpoints, chat, and WebSocket push.

pub mod chat;
pub mod tasks;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{broadcast, oneshot};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::TaskAgent;
use crate::config::Config;
use crate::db::Database;
use crate::error::ApiResult;
use crate::types::{Page, Task};

/// Capacity of the task-update broadcast channel. Slow subscribers that lag
/// past this many snapshots skip ahead to the most recent state.
const UPDATES_CHANNEL_CAPACITY: usize = 16;

/// How many tasks a pushed snapshot contains.
const SNAPSHOT_LIMIT: i64 = 100;

/// Live WebSocket connection counts, reported by /health.
#[derive(Default)]
pub struct ConnectionCounts {
    pub chat: AtomicI64,
    pub tasks: AtomicI64,
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub agent: Arc<TaskAgent>,
    /// Best-effort push channel carrying most-recent task snapshots.
    pub updates: broadcast::Sender<Arc<Vec<Task>>>,
    pub connections: Arc<ConnectionCounts>,
}

impl AppState {
    pub fn new(db: Arc<Database>, agent: Arc<TaskAgent>) -> Self {
        let (updates, _) = broadcast::channel(UPDATES_CHANNEL_CAPACITY);
        Self {
            db,
            agent,
            updates,
            connections: Arc::new(ConnectionCounts::default()),
        }
    }

    /// Current task snapshot for push updates and chat responses.
    pub fn task_snapshot(&self) -> ApiResult<Vec<Task>> {
        Ok(self.db.list_tasks(&Page::new(None, Some(SNAPSHOT_LIMIT)))?)
    }

    /// Fetch a fresh snapshot and push it to all task-feed subscribers.
    /// Returns the snapshot so callers can reuse it in their own response.
    pub fn broadcast_snapshot(&self) -> ApiResult<Arc<Vec<Task>>> {
        let snapshot = Arc::new(self.task_snapshot()?);
        // No subscribers is not an error.
        let _ = self.updates.send(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    chat_connections: i64,
    task_connections: i64,
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        chat_connections: state.connections.chat.load(Ordering::Relaxed),
        task_connections: state.connections.tasks.load(Ordering::Relaxed),
    })
}

/// Build the CORS layer from the configured allow-list.
fn cors_layer(config: &Config) -> CorsLayer {
    let origin = if config.allow_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .server
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the router with all routes.
pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health))
        // Task resource routes
        .route("/api/tasks", post(tasks::create).get(tasks::list))
        .route("/api/tasks/filter", get(tasks::filter))
        .route("/api/tasks/count", get(tasks::count))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_one)
                .put(tasks::update)
                .delete(tasks::delete),
        )
        // Chat routes
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/ws", get(chat::chat_ws))
        .route("/api/chat/ws/tasks", get(chat::tasks_ws))
        // Middleware
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns a oneshot sender that can be used to signal shutdown, and the
/// actual address the server is bound to.
pub async fn start_server(
    state: AppState,
    config: &Config,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(state, config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let bound_addr = listener.local_addr()?;

    info!("taskpilot listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("server shutting down");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
