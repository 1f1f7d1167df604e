//! The secondary channel used by the simulation extension.
//!
//! Holds the outbound sender for the (at most one) attached extension
//! client and the FIFO queue of messages received while the upstream
//! session is not yet connected.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use switchboard_core::errors::Result;
use switchboard_core::log::EventLog;

use crate::upstream::UpstreamManager;

/// Bridge between the extension channel and the upstream session.
pub struct ExtensionBridge {
    /// Outbound sender to the attached extension, if any.
    sender: SyncMutex<Option<mpsc::Sender<Arc<String>>>>,
    /// Messages held while the upstream is not Connected.
    ///
    /// The async lock also orders deliveries: queued messages always reach
    /// the upstream before any direct message sent after the flush.
    queue: Mutex<VecDeque<String>>,
    log: Arc<EventLog>,
}

impl ExtensionBridge {
    /// Create a bridge with an empty queue and no extension attached.
    pub fn new(log: Arc<EventLog>) -> Self {
        Self {
            sender: SyncMutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            log,
        }
    }

    /// Attach an extension connection, replacing any previous one.
    pub fn attach(&self, tx: mpsc::Sender<Arc<String>>) {
        let previous = self.sender.lock().replace(tx);
        if previous.is_some() {
            warn!("extension reattached, dropping previous channel");
        }
        self.log.log("extension", "connected", json!({}));
    }

    /// Detach the extension connection.
    pub fn detach(&self) {
        let _ = self.sender.lock().take();
        self.log.log("extension", "disconnected", json!({}));
    }

    /// Whether an extension is currently attached.
    pub fn is_attached(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Number of queued messages.
    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Deliver an extension text message upstream, or queue it while the
    /// session is not Connected.
    ///
    /// Any messages still queued are drained first, so queue order is
    /// preserved even when a flush races a direct delivery.
    pub async fn deliver(&self, text: String, upstream: &UpstreamManager) -> Result<()> {
        let mut queue = self.queue.lock().await;
        if upstream.is_connected() {
            while let Some(queued) = queue.pop_front() {
                upstream.send_user_text(&queued).await?;
            }
            upstream.send_user_text(&text).await
        } else {
            debug!("upstream not connected, queueing extension message");
            queue.push_back(text);
            self.log.log(
                "extension",
                "message_queued",
                json!({"pending": queue.len()}),
            );
            Ok(())
        }
    }

    /// Drain the queue to a freshly connected upstream, FIFO.
    ///
    /// Draining removes each message before sending, so a second flush (or
    /// a racing `deliver`) can never replay one.
    pub async fn flush_queue(&self, upstream: &UpstreamManager) {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return;
        }
        let count = queue.len();
        while let Some(queued) = queue.pop_front() {
            if let Err(e) = upstream.send_user_text(&queued).await {
                warn!(error = %e, "lost queued extension message during flush");
            }
        }
        self.log.log("extension", "queue_flushed", json!({"count": count}));
    }

    /// Forward a function-call result from the extension upstream.
    ///
    /// Unlike plain messages these are never queued: a result for a call
    /// that belonged to a session that no longer exists is useless, so it
    /// is logged and dropped.
    pub async fn submit_output(
        &self,
        call_id: &str,
        output: &str,
        upstream: &UpstreamManager,
    ) -> Result<()> {
        if upstream.is_connected() {
            upstream.send_function_output(call_id, output).await
        } else {
            self.log.log(
                "extension",
                "function_call_output_dropped",
                json!({"callId": call_id}),
            );
            Ok(())
        }
    }

    /// Push a function-call item to the attached extension, raw.
    pub fn forward_function_call(&self, item: &Value) {
        self.send_json(&json!({"type": "function_call", "item": item}));
    }

    /// Push a JSON frame to the attached extension, if any.
    pub fn send_json(&self, value: &Value) {
        let sender = self.sender.lock().clone();
        let Some(tx) = sender else { return };
        match serde_json::to_string(value) {
            Ok(text) => {
                if tx.try_send(Arc::new(text)).is_err() {
                    warn!("extension channel full or closed, frame dropped");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize extension frame"),
        }
    }
}
