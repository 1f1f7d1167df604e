//! The single upstream realtime session: lifecycle, outbound operations,
//! and event fan-out.

pub mod events;
pub mod transport;

pub use events::UpstreamEvent;
pub use transport::{RealtimeConnector, UpstreamChannel, UpstreamConnector};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use switchboard_core::errors::{RelayError, Result};
use switchboard_core::log::EventLog;
use switchboard_core::tools::ToolRegistry;

use crate::config::UpstreamConfig;

/// Connection state of the upstream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The session is live.
    Connected,
}

/// Owner of the one upstream session.
///
/// Created lazily by the first console client and torn down when the last
/// console client and the extension are both gone. All state transitions
/// go through the internal gate, so racing attaches never spawn a second
/// connect.
pub struct UpstreamManager {
    config: UpstreamConfig,
    api_key: String,
    connector: Arc<dyn UpstreamConnector>,
    tools: ToolRegistry,
    log: Arc<EventLog>,
    state: Mutex<SessionState>,
    /// Bumped each time a session becomes Connected. Read loops capture
    /// their session's generation so a stale loop outliving a
    /// teardown/reconnect cannot reset the replacement session.
    generation: AtomicU64,
    outbound: Mutex<Option<mpsc::Sender<Value>>>,
    overrides: Mutex<serde_json::Map<String, Value>>,
    events: broadcast::Sender<UpstreamEvent>,
}

impl UpstreamManager {
    /// Create a manager; no connection is made until [`Self::ensure_started`].
    pub fn new(
        config: UpstreamConfig,
        api_key: String,
        connector: Arc<dyn UpstreamConnector>,
        tools: ToolRegistry,
        log: Arc<EventLog>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            api_key,
            connector,
            tools,
            log,
            state: Mutex::new(SessionState::Disconnected),
            generation: AtomicU64::new(0),
            outbound: Mutex::new(None),
            overrides: Mutex::new(serde_json::Map::new()),
            events,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent> {
        self.events.subscribe()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session is live.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Start the session if none exists.
    ///
    /// Returns `Ok(true)` when this call created the connection,
    /// `Ok(false)` when a session already exists or is being established.
    /// On failure the state reverts to `Disconnected` and the error is
    /// returned so the initiating connection can be closed; there is no
    /// automatic retry.
    pub async fn ensure_started(self: &Arc<Self>) -> Result<bool> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Connected | SessionState::Connecting => return Ok(false),
                SessionState::Disconnected => *state = SessionState::Connecting,
            }
        }
        self.log.log(
            "server",
            "session_connecting",
            json!({"model": self.config.model}),
        );
        match self.connector.connect(&self.config, &self.api_key).await {
            Ok(channel) => {
                let outbound = channel.outbound.clone();
                *self.outbound.lock() = Some(channel.outbound);
                let generation = {
                    let mut state = self.state.lock();
                    *state = SessionState::Connected;
                    self.generation.fetch_add(1, Ordering::SeqCst) + 1
                };

                let manager = Arc::clone(self);
                let _ = tokio::spawn(manager.read_loop(channel.inbound, generation));

                let session = self.session_payload();
                if outbound
                    .send(json!({"type": "session.update", "session": session}))
                    .await
                    .is_err()
                {
                    warn!("upstream closed before session configuration was applied");
                }
                self.log.log("server", "session_connected", json!({}));
                Ok(true)
            }
            Err(e) => {
                *self.state.lock() = SessionState::Disconnected;
                self.log.log(
                    "server",
                    "session_connect_failed",
                    json!({"error": e.to_string()}),
                );
                Err(e)
            }
        }
    }

    /// Tear the session down (last client and extension both gone).
    pub fn teardown(&self, reason: &str) {
        let _ = self.reset(reason);
    }

    /// Send user text upstream and request a response.
    pub async fn send_user_text(&self, text: &str) -> Result<()> {
        self.send(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{"type": "input_text", "text": text}],
            },
        }))
        .await?;
        self.send(json!({"type": "response.create"})).await
    }

    /// Stream raw PCM16 samples into the upstream input buffer.
    ///
    /// A no-op while not connected; local buffering in the assembler is
    /// the caller's concern.
    pub async fn append_audio(&self, samples: &[i16]) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let audio = base64::engine::general_purpose::STANDARD.encode(&bytes);
        self.send(json!({"type": "input_audio_buffer.append", "audio": audio}))
            .await
    }

    /// Commit the upstream input buffer and request a response.
    pub async fn commit_and_respond(&self) -> Result<()> {
        self.send(json!({"type": "input_audio_buffer.commit"})).await?;
        self.request_response().await
    }

    /// Request a response turn without touching the input buffer.
    pub async fn request_response(&self) -> Result<()> {
        self.send(json!({"type": "response.create"})).await
    }

    /// Apply a session-configuration patch.
    ///
    /// The patch is remembered so a future reconnect carries it, and sent
    /// upstream immediately when a session is live.
    pub async fn update_session(&self, patch: Value) -> Result<()> {
        if let Value::Object(map) = &patch {
            let mut overrides = self.overrides.lock();
            for (key, value) in map {
                let _ = overrides.insert(key.clone(), value.clone());
            }
        }
        if self.is_connected() {
            self.send(json!({"type": "session.update", "session": patch}))
                .await
        } else {
            Ok(())
        }
    }

    /// Submit a function-call result upstream and request a response.
    pub async fn send_function_output(&self, call_id: &str, output: &str) -> Result<()> {
        self.send(json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            },
        }))
        .await?;
        self.send(json!({"type": "response.create"})).await
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn send(&self, event: Value) -> Result<()> {
        let outbound = self.outbound.lock().clone();
        match outbound {
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| RelayError::UpstreamClosed),
            None => Err(RelayError::UpstreamNotConnected),
        }
    }

    /// Initial `session.update` payload: configuration, registered tool
    /// definitions, and any remembered patches.
    fn session_payload(&self) -> Value {
        let turn_detection = if self.config.turn_detection == "none" {
            Value::Null
        } else {
            json!({"type": self.config.turn_detection})
        };
        let mut session = json!({
            "instructions": self.config.instructions,
            "voice": self.config.voice,
            "input_audio_format": self.config.input_audio_format,
            "input_audio_transcription": {"model": self.config.transcription_model},
            "turn_detection": turn_detection,
            "tools": self.tools.definitions(),
        });
        if let Value::Object(target) = &mut session {
            for (key, value) in self.overrides.lock().iter() {
                let _ = target.insert(key.clone(), value.clone());
            }
        }
        session
    }

    async fn read_loop(self: Arc<Self>, mut inbound: mpsc::Receiver<Value>, generation: u64) {
        while let Some(raw) = inbound.recv().await {
            match events::map_event(&raw) {
                Some(UpstreamEvent::FunctionCall { item }) => {
                    let manager = Arc::clone(&self);
                    let call = item.clone();
                    let _ = tokio::spawn(async move {
                        manager.run_function_call(call).await;
                    });
                    let _ = self.events.send(UpstreamEvent::FunctionCall { item });
                }
                Some(UpstreamEvent::Error { error }) => {
                    self.log.log("upstream", "error", error.clone());
                    let _ = self.events.send(UpstreamEvent::Error { error });
                }
                Some(event) => {
                    let _ = self.events.send(event);
                }
                None => {}
            }
        }
        // Transport gone; a later attach builds a fresh session. Only the
        // loop of the currently live session may reset.
        if self.reset_if_current(generation, "transport closed") {
            let _ = self.events.send(UpstreamEvent::Closed);
        }
    }

    /// Dispatch a completed function call to the local tool registry and
    /// submit the result. Failures become `{"error": ...}` outputs, never
    /// session faults.
    async fn run_function_call(&self, item: Value) {
        let name = item["name"].as_str().unwrap_or_default().to_owned();
        let call_id = item["call_id"].as_str().unwrap_or_default().to_owned();
        let args = match item["arguments"].as_str() {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| json!({})),
            None => json!({}),
        };
        debug!(tool = %name, call_id = %call_id, "running function call");
        let result = self.tools.dispatch(&name, args).await;
        self.log.log(
            "server",
            "function_call_result",
            json!({"name": name, "callId": call_id}),
        );
        if let Err(e) = self.send_function_output(&call_id, &result.to_string()).await {
            warn!(tool = %name, error = %e, "could not submit function output");
        }
    }

    fn reset(&self, reason: &str) -> bool {
        self.reset_inner(None, reason)
    }

    fn reset_if_current(&self, generation: u64, reason: &str) -> bool {
        self.reset_inner(Some(generation), reason)
    }

    fn reset_inner(&self, generation: Option<u64>, reason: &str) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Disconnected {
                return false;
            }
            // A generation-scoped reset comes from a read loop, and a read
            // loop only exists for a session that reached Connected. If the
            // state is Connecting, or the generation moved on, the caller
            // is a stale loop and must not touch the current session.
            if let Some(generation) = generation {
                if *state != SessionState::Connected
                    || self.generation.load(Ordering::SeqCst) != generation
                {
                    return false;
                }
            }
            *state = SessionState::Disconnected;
        }
        *self.outbound.lock() = None;
        self.log.log("server", "session_closed", json!({"reason": reason}));
        true
    }
}
