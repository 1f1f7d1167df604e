//! Built-in tool registrations.
//!
//! The three simulation task tools are placeholders at this level: the real
//! work happens in the simulation client, which receives every function
//! call over the extension channel. The handlers here acknowledge the task
//! after a short simulated latency so the conversation can move on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use switchboard_core::errors::{RelayError, Result};
use switchboard_core::tools::{ToolDefinition, ToolHandler, ToolParameterSchema, ToolRegistry};

const TASK_LATENCY: Duration = Duration::from_secs(1);

const SIM_OBJECTS: [&str; 4] = [
    "Bottle_Kmno4",
    "Bottle_Fecl2",
    "beaker_Fecl2",
    "beaker_Kmno4",
];

/// Register every built-in tool on the given registry.
pub fn register_builtin(registry: &ToolRegistry) {
    registry.register(
        pickmove_definition(),
        Arc::new(TaskStub {
            name: "add_pickmove_task",
            message: "PickMove task added successfully.",
        }),
    );
    registry.register(
        pour_definition(),
        Arc::new(TaskStub {
            name: "add_pour_task",
            message: "Pour task added successfully.",
        }),
    );
    registry.register(
        return_definition(),
        Arc::new(TaskStub {
            name: "add_return_task",
            message: "Return task added successfully.",
        }),
    );
    registry.register(
        set_memory_definition(),
        Arc::new(SetMemory {
            store: Arc::new(Mutex::new(HashMap::new())),
        }),
    );
    registry.register(get_weather_definition(), Arc::new(GetWeather));
}

// ── Handlers ────────────────────────────────────────────────────────

/// Acknowledges a simulation task after a short delay.
struct TaskStub {
    name: &'static str,
    message: &'static str,
}

#[async_trait]
impl ToolHandler for TaskStub {
    async fn call(&self, args: Value) -> Result<Value> {
        tracing::info!(task = self.name, %args, "simulation task accepted");
        tokio::time::sleep(TASK_LATENCY).await;
        Ok(json!({"message": self.message}))
    }
}

/// Stores key-value pairs for the assistant.
struct SetMemory {
    store: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl ToolHandler for SetMemory {
    async fn call(&self, args: Value) -> Result<Value> {
        let key = args
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Tool {
                name: "set_memory".into(),
                message: "missing `key`".into(),
            })?;
        let value = args
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Tool {
                name: "set_memory".into(),
                message: "missing `value`".into(),
            })?;
        let _ = self
            .store
            .lock()
            .insert(key.to_owned(), value.to_owned());
        Ok(json!({"ok": true, "key": key}))
    }
}

/// Canned weather stub; the console client does real lookups itself.
struct GetWeather;

#[async_trait]
impl ToolHandler for GetWeather {
    async fn call(&self, args: Value) -> Result<Value> {
        let location = args
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::Tool {
                name: "get_weather".into(),
                message: "missing `location`".into(),
            })?;
        Ok(json!({
            "location": location,
            "conditions": "clear",
            "temperature_c": 20,
        }))
    }
}

// ── Schemas ─────────────────────────────────────────────────────────

fn object_schema(properties: Value, required: &[&str]) -> ToolParameterSchema {
    let properties = match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let mut extra = serde_json::Map::new();
    let _ = extra.insert("additionalProperties".to_owned(), json!(false));
    ToolParameterSchema {
        schema_type: "object".to_owned(),
        properties: Some(properties),
        required: Some(required.iter().map(|s| (*s).to_owned()).collect()),
        extra,
    }
}

fn position_schema(description: &str) -> Value {
    json!({
        "oneOf": [
            {
                "type": "string",
                "enum": SIM_OBJECTS,
                "description": "The name of the target object.",
            },
            {
                "type": "array",
                "items": {"type": "number"},
                "description": "The numeric target position.",
            },
        ],
        "description": description,
    })
}

fn pickmove_definition() -> ToolDefinition {
    ToolDefinition::function(
        "add_pickmove_task",
        "Adds a pick-and-move task to the controller manager. Picks up an \
         object, moves it to a target position and hold. To release the \
         object, follow this task with an \"add_return_task\".",
        object_schema(
            json!({
                "picking_object": {
                    "type": "string",
                    "enum": SIM_OBJECTS,
                    "description": "The name of the object to pick. This defines the initial position of the task.",
                },
                "target": position_schema("The target object name or position."),
            }),
            &["picking_object", "target"],
        ),
    )
}

fn pour_definition() -> ToolDefinition {
    ToolDefinition::function(
        "add_pour_task",
        "Adds a pour task to the controller manager. This task performs a \
         pouring action at the robot's current position. The \
         \"picked_object\" must match the \"picking_object\" of the last step.",
        object_schema(
            json!({
                "picked_object": {
                    "type": "string",
                    "enum": SIM_OBJECTS,
                    "description": "The name of the holding object. This defines the pour direction of the task.",
                },
            }),
            &["picked_object"],
        ),
    )
}

fn return_definition() -> ToolDefinition {
    ToolDefinition::function(
        "add_return_task",
        "Adds a return task to the controller manager. Assumes the robot is \
         holding an object and performs a return action to the specified \
         position. The \"pour_position\" must match the final position of \
         the last step.",
        object_schema(
            json!({
                "pour_position": position_schema("The pour position as object name or numeric position."),
                "return_position": position_schema("The return position as object name or numeric position."),
            }),
            &["pour_position", "return_position"],
        ),
    )
}

fn set_memory_definition() -> ToolDefinition {
    ToolDefinition::function(
        "set_memory",
        "Stores a key-value pair in the assistant's memory.",
        object_schema(
            json!({
                "key": {
                    "type": "string",
                    "description": "The key under which to store the value.",
                },
                "value": {
                    "type": "string",
                    "description": "The value to store.",
                },
            }),
            &["key", "value"],
        ),
    )
}

fn get_weather_definition() -> ToolDefinition {
    ToolDefinition::function(
        "get_weather",
        "Retrieves weather information for a given location.",
        object_schema(
            json!({
                "location": {
                    "type": "string",
                    "description": "The location to get weather data for.",
                },
            }),
            &["location"],
        ),
    )
}
