//! # switchboard-core
//!
//! Shared vocabulary for the switchboard relay.
//!
//! This crate provides the types every other switchboard crate depends on:
//!
//! - **Frames**: typed wire-format frames for the console, extension, and
//!   monitor channels (`ClientFrame`, `ExtensionFrame`, `StatusFrame`)
//! - **Tools**: `ToolDefinition` schemas, the async `ToolHandler` trait, and
//!   the `ToolRegistry` with error-containing dispatch
//! - **Event log**: `LogEntry` and the in-memory `EventLog` with live
//!   monitor fan-out
//! - **Errors**: the `RelayError` hierarchy via `thiserror`

#![deny(unsafe_code)]

pub mod errors;
pub mod frames;
pub mod log;
pub mod tools;

pub use errors::{RelayError, Result};
pub use frames::{ClientFrame, ExtensionFrame, StatusFrame};
pub use log::{EventLog, LogEntry};
pub use tools::{ToolDefinition, ToolHandler, ToolParameterSchema, ToolRegistry};
