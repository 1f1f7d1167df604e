//! Wire-format frames for the console, extension, and monitor channels.
//!
//! Text frames on every channel are JSON objects discriminated by a `type`
//! field. Binary frames (raw little-endian PCM16 mono samples, no envelope)
//! never reach these types; the router decodes them directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;

// ── Inbound: primary console ────────────────────────────────────────

/// A parsed text frame from a primary console connection.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    /// Finalize the buffered audio for this connection.
    AudioCommit,
    /// Create a conversation item (user text) upstream.
    ItemCreate {
        /// Item payload, e.g. `{"text": "hello"}`.
        item: Value,
    },
    /// Patch the upstream session configuration.
    SessionUpdate {
        /// Partial session object.
        session: Value,
    },
    /// A well-formed frame with an unrecognized `type`.
    Unknown(String),
}

impl ClientFrame {
    /// Parse a console text frame.
    ///
    /// Unrecognized `type` values are not an error; they come back as
    /// [`ClientFrame::Unknown`] so the router can log and move on.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::Parse(e.to_string()))?;
        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Parse("missing `type` field".into()))?;
        match frame_type {
            "audio_commit" => Ok(Self::AudioCommit),
            "conversation.item.create" => {
                let item = value
                    .get("item")
                    .cloned()
                    .ok_or_else(|| RelayError::Parse("item.create without `item`".into()))?;
                Ok(Self::ItemCreate { item })
            }
            "session.update" => {
                let session = value
                    .get("session")
                    .cloned()
                    .ok_or_else(|| RelayError::Parse("session.update without `session`".into()))?;
                Ok(Self::SessionUpdate { session })
            }
            other => Ok(Self::Unknown(other.to_owned())),
        }
    }
}

// ── Inbound: simulation extension ───────────────────────────────────

/// A parsed text frame from the extension channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtensionFrame {
    /// Free text to deliver upstream as a user message.
    Message {
        /// Message body.
        text: String,
    },
    /// Result of a function call previously forwarded to the extension.
    FunctionCallOutput {
        /// Call id echoed from the function-call item.
        call_id: String,
        /// Serialized tool output.
        output: String,
    },
    /// A well-formed frame with an unrecognized `type`.
    Unknown(String),
}

impl ExtensionFrame {
    /// Parse an extension text frame.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::Parse(e.to_string()))?;
        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Parse("missing `type` field".into()))?;
        match frame_type {
            "message" => {
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RelayError::Parse("message without `text`".into()))?;
                Ok(Self::Message {
                    text: text.to_owned(),
                })
            }
            "function_call_output" => {
                let call_id = value
                    .get("call_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RelayError::Parse("output without `call_id`".into()))?;
                let output = value
                    .get("output")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RelayError::Parse("output without `output`".into()))?;
                Ok(Self::FunctionCallOutput {
                    call_id: call_id.to_owned(),
                    output: output.to_owned(),
                })
            }
            other => Ok(Self::Unknown(other.to_owned())),
        }
    }
}

// ── Outbound: status ────────────────────────────────────────────────

/// Periodic status frame published to every channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    /// Always `status`.
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Whether an upstream session is connected.
    pub is_connected: bool,
    /// Number of primary console connections.
    pub connected_clients: usize,
    /// Whether the extension channel is attached.
    pub extension_connected: bool,
    /// ISO-8601 timestamp.
    pub timestamp: String,
}

impl StatusFrame {
    /// Build a status frame stamped with the current UTC time.
    #[must_use]
    pub fn new(is_connected: bool, connected_clients: usize, extension_connected: bool) -> Self {
        Self {
            frame_type: "status".to_owned(),
            is_connected,
            connected_clients,
            extension_connected,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── ClientFrame parsing ─────────────────────────────────────────

    #[test]
    fn client_audio_commit() {
        let frame = ClientFrame::parse(r#"{"type":"audio_commit"}"#).unwrap();
        assert_eq!(frame, ClientFrame::AudioCommit);
    }

    #[test]
    fn client_item_create_keeps_item_payload() {
        let frame =
            ClientFrame::parse(r#"{"type":"conversation.item.create","item":{"text":"hi"}}"#)
                .unwrap();
        assert_eq!(
            frame,
            ClientFrame::ItemCreate {
                item: json!({"text": "hi"})
            }
        );
    }

    #[test]
    fn client_session_update() {
        let frame =
            ClientFrame::parse(r#"{"type":"session.update","session":{"voice":"verse"}}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::SessionUpdate {
                session: json!({"voice": "verse"})
            }
        );
    }

    #[test]
    fn client_unknown_type_is_not_an_error() {
        let frame = ClientFrame::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Unknown("ping".into()));
    }

    #[test]
    fn client_invalid_json_is_parse_error() {
        let err = ClientFrame::parse("not json").unwrap_err();
        assert!(matches!(err, RelayError::Parse(_)));
    }

    #[test]
    fn client_missing_type_is_parse_error() {
        let err = ClientFrame::parse(r#"{"item":{}}"#).unwrap_err();
        assert!(err.to_string().contains("missing `type`"));
    }

    #[test]
    fn client_item_create_without_item_is_parse_error() {
        let err = ClientFrame::parse(r#"{"type":"conversation.item.create"}"#).unwrap_err();
        assert!(matches!(err, RelayError::Parse(_)));
    }

    // ── ExtensionFrame parsing ──────────────────────────────────────

    #[test]
    fn extension_message() {
        let frame = ExtensionFrame::parse(r#"{"type":"message","text":"status ok"}"#).unwrap();
        assert_eq!(
            frame,
            ExtensionFrame::Message {
                text: "status ok".into()
            }
        );
    }

    #[test]
    fn extension_function_call_output() {
        let frame = ExtensionFrame::parse(
            r#"{"type":"function_call_output","call_id":"call_1","output":"{\"ok\":true}"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ExtensionFrame::FunctionCallOutput {
                call_id: "call_1".into(),
                output: r#"{"ok":true}"#.into()
            }
        );
    }

    #[test]
    fn extension_unknown_type() {
        let frame = ExtensionFrame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(frame, ExtensionFrame::Unknown("heartbeat".into()));
    }

    // ── StatusFrame serde ───────────────────────────────────────────

    #[test]
    fn status_frame_wire_shape() {
        let frame = StatusFrame::new(true, 2, false);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["isConnected"], true);
        assert_eq!(json["connectedClients"], 2);
        assert_eq!(json["extensionConnected"], false);
        assert!(json["timestamp"].is_string());
    }
}
