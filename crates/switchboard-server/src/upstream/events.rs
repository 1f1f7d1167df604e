//! Mapping of raw upstream protocol events to relay events.

use serde_json::{Value, json};

/// An upstream session event, after protocol-level mapping.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamEvent {
    /// A conversation item was created.
    ItemCreated {
        /// The raw item payload.
        item: Value,
    },
    /// An existing item received streamed content.
    ItemUpdated {
        /// Minimal item reference (`{"id": ...}`).
        item: Value,
        /// The streamed delta.
        delta: Value,
    },
    /// A function call completed its arguments and is ready to execute.
    FunctionCall {
        /// Synthesized function-call item with `name`, `call_id`, and
        /// `arguments`.
        item: Value,
    },
    /// The session reported an error; it remains open.
    Error {
        /// The raw error payload.
        error: Value,
    },
    /// The transport closed; the session is gone.
    Closed,
}

/// Map a raw upstream event to a relay event.
///
/// Returns `None` for protocol chatter the relay does not forward
/// (acknowledgements, rate-limit notices, speech markers, ...).
pub fn map_event(raw: &Value) -> Option<UpstreamEvent> {
    let event_type = raw.get("type")?.as_str()?;
    match event_type {
        "error" => Some(UpstreamEvent::Error {
            error: raw.get("error").cloned().unwrap_or(Value::Null),
        }),
        // `response.output_item.added` announces the same item again and is
        // deliberately left to the chatter arm; one create per item.
        "conversation.item.created" => Some(UpstreamEvent::ItemCreated {
            item: raw.get("item").cloned()?,
        }),
        "response.function_call_arguments.done" => Some(UpstreamEvent::FunctionCall {
            item: json!({
                "type": "function_call",
                "name": raw.get("name").cloned().unwrap_or(Value::Null),
                "call_id": raw.get("call_id").cloned().unwrap_or(Value::Null),
                "arguments": raw.get("arguments").cloned().unwrap_or(Value::Null),
            }),
        }),
        t if t.ends_with(".delta") => Some(UpstreamEvent::ItemUpdated {
            item: json!({"id": raw.get("item_id").cloned().unwrap_or(Value::Null)}),
            delta: raw.get("delta").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_item_created() {
        let raw = json!({
            "type": "conversation.item.created",
            "item": {"id": "item_1", "type": "message", "role": "assistant"}
        });
        let event = map_event(&raw).unwrap();
        assert_eq!(
            event,
            UpstreamEvent::ItemCreated {
                item: json!({"id": "item_1", "type": "message", "role": "assistant"})
            }
        );
    }

    #[test]
    fn output_item_added_is_not_a_second_create() {
        let raw = json!({
            "type": "response.output_item.added",
            "item": {"id": "item_2", "type": "message"}
        });
        assert!(map_event(&raw).is_none());
    }

    #[test]
    fn maps_delta_events_as_updates() {
        let raw = json!({
            "type": "response.audio_transcript.delta",
            "item_id": "item_3",
            "delta": "hel"
        });
        let event = map_event(&raw).unwrap();
        assert_eq!(
            event,
            UpstreamEvent::ItemUpdated {
                item: json!({"id": "item_3"}),
                delta: json!("hel"),
            }
        );
    }

    #[test]
    fn maps_completed_function_call() {
        let raw = json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_9",
            "name": "get_weather",
            "arguments": "{\"city\":\"Oslo\"}"
        });
        let event = map_event(&raw).unwrap();
        let UpstreamEvent::FunctionCall { item } = event else {
            panic!("expected function call");
        };
        assert_eq!(item["name"], "get_weather");
        assert_eq!(item["call_id"], "call_9");
        assert_eq!(item["type"], "function_call");
    }

    #[test]
    fn maps_error_event() {
        let raw = json!({"type": "error", "error": {"message": "bad session"}});
        assert_eq!(
            map_event(&raw).unwrap(),
            UpstreamEvent::Error {
                error: json!({"message": "bad session"})
            }
        );
    }

    #[test]
    fn ignores_protocol_chatter() {
        assert!(map_event(&json!({"type": "session.created"})).is_none());
        assert!(map_event(&json!({"type": "rate_limits.updated"})).is_none());
        assert!(map_event(&json!({"no_type": true})).is_none());
    }

    #[test]
    fn created_without_item_is_ignored() {
        assert!(map_event(&json!({"type": "conversation.item.created"})).is_none());
    }
}
