//! WebSocket upgrade handlers for the console, extension, and monitor
//! channels.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use switchboard_core::frames::ExtensionFrame;

use crate::registry::ClientConnection;
use crate::server::AppState;

/// `GET /ws`: primary console channel.
pub async fn console_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_console(socket, state))
}

/// `GET /extension`: simulation extension channel.
pub async fn extension_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_extension(socket, state))
}

/// `GET /monitor`: log and status sink.
pub async fn monitor_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_monitor(socket, state))
}

/// Spawn the write half: outbound channel to socket sink.
fn spawn_writer(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<String>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text((*text).clone().into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_console(socket: WebSocket, state: AppState) {
    let id = uuid::Uuid::now_v7().to_string();
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.outbound_capacity);
    let connection = Arc::new(ClientConnection::new(id.clone(), tx));
    state.registry.add(Arc::clone(&connection));
    state
        .event_log
        .log("client", "connected", json!({"connectionId": id}));
    info!(conn_id = %id, "console client connected");

    let writer = spawn_writer(sink, rx);

    // Lazy session creation. A failed connect closes this socket only;
    // every other client is untouched.
    match state.upstream.ensure_started().await {
        Ok(created) => {
            if created {
                state.extension.flush_queue(&state.upstream).await;
            }
        }
        Err(e) => {
            state.event_log.log(
                "server",
                "connect_rejected",
                json!({"connectionId": id, "error": e.to_string()}),
            );
            state.registry.remove(&id);
            writer.abort();
            return;
        }
    }

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Binary(data) => state.router.handle_binary(&id, &data).await,
            Message::Text(text) => state.router.handle_text(&id, text.as_str()).await,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    state.registry.remove(&id);
    state.assembler.remove(&id);
    state
        .event_log
        .log("client", "disconnected", json!({"connectionId": id}));
    info!(conn_id = %id, drops = connection.drop_count(), "console client disconnected");
    writer.abort();
    maybe_teardown(&state);
}

async fn handle_extension(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.outbound_capacity);
    state.extension.attach(tx);
    info!("extension connected");

    let writer = spawn_writer(sink, rx);

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match ExtensionFrame::parse(text.as_str()) {
            Ok(ExtensionFrame::Message { text }) => {
                if let Err(e) = state.extension.deliver(text, &state.upstream).await {
                    state.event_log.log(
                        "extension",
                        "message_failed",
                        json!({"error": e.to_string()}),
                    );
                }
            }
            Ok(ExtensionFrame::FunctionCallOutput { call_id, output }) => {
                if let Err(e) = state
                    .extension
                    .submit_output(&call_id, &output, &state.upstream)
                    .await
                {
                    state.event_log.log(
                        "extension",
                        "output_failed",
                        json!({"callId": call_id, "error": e.to_string()}),
                    );
                }
            }
            Ok(ExtensionFrame::Unknown(frame_type)) => {
                state.event_log.log(
                    "extension",
                    "unknown_type",
                    json!({"messageType": frame_type}),
                );
            }
            Err(e) => {
                state
                    .event_log
                    .log("extension", "parse_error", json!({"error": e.to_string()}));
            }
        }
    }

    state.extension.detach();
    info!("extension disconnected");
    writer.abort();
    maybe_teardown(&state);
}

async fn handle_monitor(socket: WebSocket, state: AppState) {
    let id = uuid::Uuid::now_v7().to_string();
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.outbound_capacity);
    let connection = Arc::new(ClientConnection::new(id.clone(), tx));
    state.monitors.add(Arc::clone(&connection));
    debug!(conn_id = %id, "monitor attached");

    let writer = spawn_writer(sink, rx);

    // Live log fan-out; a lagging monitor just misses entries.
    let mut entries = state.event_log.subscribe();
    let log_pump = tokio::spawn(async move {
        loop {
            match entries.recv().await {
                Ok(entry) => {
                    let _ = connection.send_json(&json!({"type": "log", "entry": entry}));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Monitors are write-only; drain until the peer goes away.
    while let Some(Ok(message)) = stream.next().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }

    state.monitors.remove(&id);
    debug!(conn_id = %id, "monitor detached");
    log_pump.abort();
    writer.abort();
}

/// Tear the upstream session down when both sides are gone.
fn maybe_teardown(state: &AppState) {
    if state.registry.is_empty() && !state.extension.is_attached() {
        state.upstream.teardown("no clients or extension");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{ServerConfig, UpstreamConfig};
    use crate::upstream::transport::testing::MockConnector;
    use crate::upstream::{SessionState, UpstreamConnector, UpstreamManager};
    use switchboard_core::log::EventLog;
    use switchboard_core::tools::ToolRegistry;

    fn make_state(connector: Arc<MockConnector>) -> AppState {
        let log = Arc::new(EventLog::default());
        let upstream = Arc::new(UpstreamManager::new(
            UpstreamConfig::default(),
            "sk-test".into(),
            Arc::clone(&connector) as Arc<dyn UpstreamConnector>,
            ToolRegistry::new(),
            Arc::clone(&log),
        ));
        let assembler = Arc::new(crate::audio::AudioAssembler::new(Arc::clone(&log)));
        AppState {
            config: Arc::new(ServerConfig::default()),
            registry: Arc::new(crate::registry::ConnectionRegistry::new()),
            monitors: Arc::new(crate::registry::ConnectionRegistry::new()),
            extension: Arc::new(crate::extension::ExtensionBridge::new(Arc::clone(&log))),
            router: Arc::new(crate::router::MessageRouter::new(
                Arc::clone(&assembler),
                Arc::clone(&upstream),
                Arc::clone(&log),
            )),
            assembler,
            upstream,
            event_log: log,
            start_time: std::time::Instant::now(),
        }
    }

    #[tokio::test]
    async fn teardown_requires_both_sides_gone() {
        let connector = Arc::new(MockConnector::new());
        let state = make_state(Arc::clone(&connector));
        state.upstream.ensure_started().await.unwrap();

        // Extension still attached: session survives an empty registry.
        let (tx, _rx) = mpsc::channel(8);
        state.extension.attach(tx);
        maybe_teardown(&state);
        assert_eq!(state.upstream.state(), SessionState::Connected);

        // Both gone: session torn down.
        state.extension.detach();
        maybe_teardown(&state);
        assert_eq!(state.upstream.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn teardown_skipped_while_clients_remain() {
        let connector = Arc::new(MockConnector::new());
        let state = make_state(connector);
        state.upstream.ensure_started().await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        state
            .registry
            .add(Arc::new(ClientConnection::new("c1".into(), tx)));
        maybe_teardown(&state);
        assert_eq!(state.upstream.state(), SessionState::Connected);
    }
}
