//! Classification and routing of inbound console frames.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use switchboard_core::frames::ClientFrame;
use switchboard_core::log::EventLog;

use crate::audio::AudioAssembler;
use crate::upstream::UpstreamManager;

/// Routes frames from primary console connections.
pub struct MessageRouter {
    assembler: Arc<AudioAssembler>,
    upstream: Arc<UpstreamManager>,
    log: Arc<EventLog>,
}

impl MessageRouter {
    /// Create a router over the shared assembler and upstream manager.
    pub fn new(
        assembler: Arc<AudioAssembler>,
        upstream: Arc<UpstreamManager>,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            assembler,
            upstream,
            log,
        }
    }

    /// Handle a binary frame: raw little-endian PCM16 mono samples.
    ///
    /// Samples are buffered locally for the eventual recording and, when a
    /// session is live, streamed into the upstream input buffer. A frame
    /// whose length is not sample aligned is a recoverable parse error;
    /// the whole frame is dropped and the connection stays open.
    pub async fn handle_binary(&self, connection_id: &str, data: &[u8]) {
        if data.len() % 2 != 0 {
            self.log.log(
                "client",
                "parse_error",
                json!({
                    "connectionId": connection_id,
                    "error": "binary frame is not sample aligned",
                }),
            );
            return;
        }
        let samples: Vec<i16> = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if samples.is_empty() {
            return;
        }
        self.assembler.append(connection_id, &samples);
        if let Err(e) = self.upstream.append_audio(&samples).await {
            warn!(conn_id = connection_id, error = %e, "failed to stream audio upstream");
        }
    }

    /// Handle a text frame: JSON discriminated by `type`.
    ///
    /// Malformed input is logged as a recoverable `parse_error`; the
    /// connection stays open.
    pub async fn handle_text(&self, connection_id: &str, text: &str) {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.log.log(
                    "client",
                    "parse_error",
                    json!({"connectionId": connection_id, "error": e.to_string()}),
                );
                return;
            }
        };
        match frame {
            ClientFrame::AudioCommit => self.handle_audio_commit(connection_id).await,
            ClientFrame::ItemCreate { item } => {
                let Some(text) = item.get("text").and_then(serde_json::Value::as_str) else {
                    self.log.log(
                        "client",
                        "parse_error",
                        json!({"connectionId": connection_id, "error": "item without text"}),
                    );
                    return;
                };
                if let Err(e) = self.upstream.send_user_text(text).await {
                    self.log.log(
                        "client",
                        "message_failed",
                        json!({"connectionId": connection_id, "error": e.to_string()}),
                    );
                }
            }
            ClientFrame::SessionUpdate { session } => {
                if let Err(e) = self.upstream.update_session(session).await {
                    warn!(conn_id = connection_id, error = %e, "session update failed");
                }
            }
            ClientFrame::Unknown(frame_type) => {
                self.log.log(
                    "client",
                    "unknown_type",
                    json!({"connectionId": connection_id, "messageType": frame_type}),
                );
            }
        }
    }

    /// Finalize the recording, commit the upstream input buffer when
    /// anything was buffered, and request a response either way.
    async fn handle_audio_commit(&self, connection_id: &str) {
        match self.assembler.commit(connection_id) {
            Ok(Some(_wav)) => {
                if let Err(e) = self.upstream.commit_and_respond().await {
                    warn!(conn_id = connection_id, error = %e, "upstream commit failed");
                }
            }
            // An empty buffer skips the input commit, but a commit after
            // text-only context still asks for a response turn.
            Ok(None) => {
                if let Err(e) = self.upstream.request_response().await {
                    warn!(conn_id = connection_id, error = %e, "response request failed");
                }
            }
            Err(e) => {
                self.log.log(
                    "client",
                    "audio_encode_error",
                    json!({"connectionId": connection_id, "error": e.to_string()}),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::config::UpstreamConfig;
    use crate::upstream::transport::testing::MockConnector;
    use switchboard_core::tools::ToolRegistry;

    struct Fixture {
        router: MessageRouter,
        connector: Arc<MockConnector>,
        upstream: Arc<UpstreamManager>,
        log: Arc<EventLog>,
    }

    fn make_fixture() -> Fixture {
        let log = Arc::new(EventLog::default());
        let connector = Arc::new(MockConnector::new());
        let upstream = Arc::new(UpstreamManager::new(
            UpstreamConfig::default(),
            "sk-test".into(),
            Arc::clone(&connector) as Arc<dyn crate::upstream::UpstreamConnector>,
            ToolRegistry::new(),
            Arc::clone(&log),
        ));
        let assembler = Arc::new(AudioAssembler::new(Arc::clone(&log)));
        Fixture {
            router: MessageRouter::new(assembler, Arc::clone(&upstream), Arc::clone(&log)),
            connector,
            upstream,
            log,
        }
    }

    async fn settle(connector: &MockConnector, min_sent: usize) {
        for _ in 0..200 {
            if connector.sent.lock().len() >= min_sent {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("upstream never received {min_sent} events");
    }

    #[tokio::test]
    async fn binary_frame_buffers_samples() {
        let fx = make_fixture();
        // [1, 0, 2, 0] is the samples [1, 2] little-endian.
        fx.router.handle_binary("c1", &[1, 0, 2, 0]).await;
        assert!(fx.connector.sent.lock().is_empty());
        // Committing proves the samples landed in the assembler.
        fx.router
            .handle_text("c1", r#"{"type":"audio_commit"}"#)
            .await;
        assert!(fx
            .log
            .entries()
            .iter()
            .any(|e| e.entry_type == "audio_recording" && e.data["samples"] == 2));
    }

    #[tokio::test]
    async fn binary_frame_streams_upstream_when_connected() {
        let fx = make_fixture();
        fx.upstream.ensure_started().await.unwrap();

        fx.router.handle_binary("c1", &[1, 0]).await;
        settle(&fx.connector, 2).await;

        let types = fx.connector.sent_types();
        assert!(types.contains(&"input_audio_buffer.append".to_owned()));
    }

    #[tokio::test]
    async fn misaligned_binary_frame_is_parse_error() {
        let fx = make_fixture();
        fx.router.handle_binary("c1", &[1, 0, 7]).await;
        let entries = fx.log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, "parse_error");
        assert_eq!(entries[0].source, "client");

        // The whole frame was dropped; nothing reached the buffer.
        fx.router
            .handle_text("c1", r#"{"type":"audio_commit"}"#)
            .await;
        assert!(fx
            .log
            .entries()
            .iter()
            .any(|e| e.entry_type == "audio_commit_empty"));
    }

    #[tokio::test]
    async fn audio_commit_commits_upstream_buffer() {
        let fx = make_fixture();
        fx.upstream.ensure_started().await.unwrap();

        fx.router.handle_binary("c1", &[1, 0]).await;
        fx.router
            .handle_text("c1", r#"{"type":"audio_commit"}"#)
            .await;
        settle(&fx.connector, 4).await;

        let types = fx.connector.sent_types();
        assert!(types.contains(&"input_audio_buffer.commit".to_owned()));
        assert!(types.contains(&"response.create".to_owned()));
    }

    #[tokio::test]
    async fn empty_commit_skips_buffer_but_still_requests_response() {
        let fx = make_fixture();
        fx.upstream.ensure_started().await.unwrap();

        fx.router
            .handle_text("c1", r#"{"type":"audio_commit"}"#)
            .await;
        settle(&fx.connector, 2).await;

        let types = fx.connector.sent_types();
        assert!(!types.contains(&"input_audio_buffer.commit".to_owned()));
        assert!(types.contains(&"response.create".to_owned()));
    }

    #[tokio::test]
    async fn item_create_forwards_user_text() {
        let fx = make_fixture();
        fx.upstream.ensure_started().await.unwrap();

        fx.router
            .handle_text(
                "c1",
                r#"{"type":"conversation.item.create","item":{"text":"hi"}}"#,
            )
            .await;
        settle(&fx.connector, 3).await;

        let sent = fx.connector.sent.lock().clone();
        let item = sent
            .iter()
            .find(|e| e["type"] == "conversation.item.create")
            .cloned()
            .unwrap();
        assert_eq!(item["item"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn item_create_without_session_logs_failure() {
        let fx = make_fixture();
        fx.router
            .handle_text(
                "c1",
                r#"{"type":"conversation.item.create","item":{"text":"hi"}}"#,
            )
            .await;
        assert!(fx
            .log
            .entries()
            .iter()
            .any(|e| e.entry_type == "message_failed"));
    }

    #[tokio::test]
    async fn malformed_json_is_recoverable_parse_error() {
        let fx = make_fixture();
        fx.router.handle_text("c1", "{nope").await;
        let entries = fx.log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, "parse_error");
        assert_eq!(entries[0].source, "client");
    }

    #[tokio::test]
    async fn unknown_type_is_logged_not_an_error() {
        let fx = make_fixture();
        fx.router.handle_text("c1", r#"{"type":"telemetry"}"#).await;
        let entries = fx.log.entries();
        assert_eq!(entries[0].entry_type, "unknown_type");
        assert_eq!(entries[0].data["messageType"], "telemetry");
    }

    #[tokio::test]
    async fn session_update_is_forwarded() {
        let fx = make_fixture();
        fx.upstream.ensure_started().await.unwrap();

        fx.router
            .handle_text("c1", r#"{"type":"session.update","session":{"voice":"verse"}}"#)
            .await;
        settle(&fx.connector, 2).await;

        let sent = fx.connector.sent.lock().clone();
        assert_eq!(sent[1]["type"], "session.update");
        assert_eq!(sent[1]["session"]["voice"], "verse");
    }
}
