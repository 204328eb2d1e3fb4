//! `ChatServer`: axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chatline_hub::Hub;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{CHAT_CONNECTIONS_REJECTED_TOTAL, CHAT_HISTORY_CLEARS_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::serve_socket;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The broadcast hub.
    pub hub: Arc<Hub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for rendering `/metrics`.
    pub metrics_handle: PrometheusHandle,
    /// One permit per allowed session; held for the life of the socket.
    pub connection_slots: Arc<Semaphore>,
    /// Upgrades beyond this many sessions are refused.
    pub max_connections: usize,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
}

/// The chat relay server.
pub struct ChatServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: PrometheusHandle,
    connection_slots: Arc<Semaphore>,
    start_time: Instant,
}

impl ChatServer {
    /// Create a new server around `hub`.
    pub fn new(config: ServerConfig, hub: Arc<Hub>, metrics_handle: PrometheusHandle) -> Self {
        let slots = config.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            config,
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics_handle,
            connection_slots: Arc::new(Semaphore::new(slots)),
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
            connection_slots: Arc::clone(&self.connection_slots),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/api/ws", get(ws_handler))
            .route("/api/info_list", get(info_list_handler))
            .route(
                "/api/empty_info",
                get(empty_info_handler).post(empty_info_handler),
            )
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the listener and serve in a background task.
    ///
    /// Returns the bound address and the serving task. Serving stops once
    /// the shutdown coordinator fires; every session is closed first.
    /// Upgraded sessions outlive the serving task and are awaited through
    /// [`ShutdownCoordinator::graceful_shutdown`].
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let hub = Arc::clone(&self.hub);

        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                info!("shutdown requested, closing sessions");
                hub.shutdown();
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server error");
            }
            info!("server stopped");
        });

        info!(%addr, "chatline server listening");
        Ok((addr, handle))
    }

    /// The broadcast hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /api/ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() || state.hub.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }
    let Ok(slot) = Arc::clone(&state.connection_slots).try_acquire_owned() else {
        counter!(CHAT_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            active = state.hub.session_count(),
            limit = state.max_connections,
            "refusing websocket upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let live = state.shutdown.session_token();
    let hub = state.hub;
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            serve_socket(socket, hub).await;
            drop(slot);
            drop(live);
        })
}

/// GET /api/info_list
async fn info_list_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.hub.history())
}

/// GET|POST /api/empty_info
async fn empty_info_handler(State(state): State<AppState>) -> &'static str {
    state.hub.clear_history();
    counter!(CHAT_HISTORY_CLEARS_TOTAL).increment(1);
    "history cleared"
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.session_count(),
        state.hub.history_len(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}
