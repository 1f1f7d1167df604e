//! Tool schemas and the async handler registry.
//!
//! Tool definitions are advertised to the upstream session; when the
//! upstream completes a function call, the registry dispatches to the bound
//! handler. Dispatch never propagates a failure: handler errors and panics
//! are converted to an `{"error": ...}` result object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::RelayError;

// ─────────────────────────────────────────────────────────────────────────────
// Tool schema
// ─────────────────────────────────────────────────────────────────────────────

/// JSON Schema-compatible parameter definition for a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParameterSchema {
    /// Top-level JSON Schema type.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions (when type is `object`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, Value>>,
    /// Required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Catch-all for additional JSON Schema properties.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ToolParameterSchema {
    /// An `object` schema with the given properties, none required.
    #[must_use]
    pub fn object(properties: serde_json::Map<String, Value>) -> Self {
        Self {
            schema_type: "object".to_owned(),
            properties: Some(properties),
            required: None,
            extra: serde_json::Map::new(),
        }
    }

    /// An empty `object` schema for parameterless tools.
    #[must_use]
    pub fn empty() -> Self {
        Self::object(serde_json::Map::new())
    }
}

/// A tool definition advertised to the upstream session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Wire discriminator, always `function`.
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: ToolParameterSchema,
}

impl ToolDefinition {
    /// Create a `function`-typed tool definition.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameterSchema,
    ) -> Self {
        Self {
            tool_type: "function".to_owned(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler trait and registry
// ─────────────────────────────────────────────────────────────────────────────

/// Async handler bound to a tool definition.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the parsed call arguments.
    async fn call(&self, args: Value) -> Result<Value, RelayError>;
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of tool definitions with their handler bindings.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, RegisteredTool>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing binding with the same name.
    pub fn register(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let name = definition.name.clone();
        let _ = self.tools.write().insert(
            name,
            RegisteredTool {
                definition,
                handler,
            },
        );
    }

    /// Snapshot of all registered definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .read()
            .values()
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Dispatch a completed function call to its handler.
    ///
    /// Always returns a result object: unknown tools, handler errors, and
    /// handler panics all come back as `{"error": <description>}` so a
    /// single misbehaving tool never takes down the session.
    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        let handler = {
            let tools = self.tools.read();
            match tools.get(name) {
                Some(tool) => Arc::clone(&tool.handler),
                None => {
                    tracing::warn!(tool = name, "dispatch to unregistered tool");
                    return json!({"error": format!("unknown tool: {name}")});
                }
            }
        };
        // Spawn so a panicking handler is contained to its own task.
        let task = tokio::spawn(async move { handler.call(args).await });
        match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::warn!(tool = name, error = %err, "tool handler failed");
                json!({"error": err.to_string()})
            }
            Err(join_err) => {
                tracing::error!(tool = name, error = %join_err, "tool handler panicked");
                json!({"error": format!("tool `{name}` panicked")})
            }
        }
    }
}
