//! `RelayServer`: Axum HTTP + WebSocket relay assembly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use switchboard_core::log::{EventLog, LogEntry};
use switchboard_core::tools::ToolRegistry;

use crate::audio::AudioAssembler;
use crate::config::ServerConfig;
use crate::extension::ExtensionBridge;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::status::run_status_broadcaster;
use crate::upstream::{RealtimeConnector, UpstreamConnector, UpstreamEvent, UpstreamManager};
use crate::ws;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Primary console connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Monitor connections.
    pub monitors: Arc<ConnectionRegistry>,
    /// Extension channel bridge.
    pub extension: Arc<ExtensionBridge>,
    /// The upstream session manager.
    pub upstream: Arc<UpstreamManager>,
    /// Per-connection audio buffers.
    pub assembler: Arc<AudioAssembler>,
    /// Console frame router.
    pub router: Arc<MessageRouter>,
    /// Application event log.
    pub event_log: Arc<EventLog>,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl RelayServer {
    /// Create a server speaking the production upstream protocol.
    pub fn new(config: ServerConfig, api_key: String, tools: ToolRegistry) -> Self {
        Self::with_connector(config, api_key, tools, Arc::new(RealtimeConnector))
    }

    /// Create a server with a custom upstream connector.
    pub fn with_connector(
        config: ServerConfig,
        api_key: String,
        tools: ToolRegistry,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Self {
        let event_log = Arc::new(EventLog::new(config.max_retained_logs));
        let upstream = Arc::new(UpstreamManager::new(
            config.upstream.clone(),
            api_key,
            connector,
            tools,
            Arc::clone(&event_log),
        ));
        let assembler = Arc::new(AudioAssembler::new(Arc::clone(&event_log)));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&assembler),
            Arc::clone(&upstream),
            Arc::clone(&event_log),
        ));
        let state = AppState {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            monitors: Arc::new(ConnectionRegistry::new()),
            extension: Arc::new(ExtensionBridge::new(Arc::clone(&event_log))),
            upstream,
            assembler,
            router,
            event_log,
            start_time: Instant::now(),
        };
        Self {
            state,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/logs", get(logs_handler))
            .route("/ws", get(ws::console_handler))
            .route("/extension", get(ws::extension_handler))
            .route("/monitor", get(ws::monitor_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the event log.
    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.state.event_log
    }

    /// Get the tool-facing upstream manager.
    pub fn upstream(&self) -> &Arc<UpstreamManager> {
        &self.state.upstream
    }

    /// Bind and serve until the shutdown token fires.
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %listener.local_addr()?, "relay listening");
        self.state.event_log.log("server", "listening", json!({"addr": addr}));

        let token = self.shutdown.token();
        let status = tokio::spawn(run_status_broadcaster(
            Arc::clone(&self.state.registry),
            Arc::clone(&self.state.monitors),
            Arc::clone(&self.state.extension),
            Arc::clone(&self.state.upstream),
            Duration::from_secs(self.state.config.status_interval_secs),
            token.clone(),
        ));
        let fanout = tokio::spawn(run_event_fanout(
            Arc::clone(&self.state.registry),
            Arc::clone(&self.state.extension),
            self.state.upstream.subscribe(),
            token.clone(),
        ));

        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await?;
        self.shutdown.drain(vec![status, fanout]).await;
        Ok(())
    }
}

/// Route upstream session events to the console registry and the
/// extension channel.
pub async fn run_event_fanout(
    registry: Arc<ConnectionRegistry>,
    extension: Arc<ExtensionBridge>,
    mut events: broadcast::Receiver<UpstreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = events.recv() => match result {
                Ok(UpstreamEvent::ItemCreated { item }) => {
                    registry.broadcast(&json!({"type": "conversation.item.create", "item": item}));
                }
                Ok(UpstreamEvent::ItemUpdated { item, delta }) => {
                    registry.broadcast(
                        &json!({"type": "conversation.item.update", "item": item, "delta": delta}),
                    );
                }
                // Clients already saw the function-call item through its
                // `conversation.item.created`; only the extension needs the
                // completed call.
                Ok(UpstreamEvent::FunctionCall { item }) => {
                    extension.forward_function_call(&item);
                }
                Ok(UpstreamEvent::Error { error }) => {
                    registry.broadcast(&json!({"type": "error", "error": error}));
                }
                Ok(UpstreamEvent::Closed) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event fan-out lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            () = cancel.cancelled() => return,
        }
    }
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current console connection count.
    pub connections: usize,
    /// Whether the extension channel is attached.
    pub extension_connected: bool,
    /// Whether an upstream session is live.
    pub session_connected: bool,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.registry.count(),
        extension_connected: state.extension.is_attached(),
        session_connected: state.upstream.is_connected(),
    })
}

/// GET /logs
async fn logs_handler(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(state.event_log.entries())
}
