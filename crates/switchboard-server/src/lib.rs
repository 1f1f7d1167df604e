//! # switchboard-server
//!
//! The relay: Axum HTTP + `WebSocket` server bridging many console clients
//! and one simulation extension to a single upstream realtime session.
//!
//! - `WebSocket` endpoints: `/ws` (console), `/extension` (simulation
//!   client), `/monitor` (log/status sink)
//! - HTTP endpoints: `/health`, `/logs`
//! - Lazy upstream session creation with a race-safe connect gate
//! - Audio chunk buffering and WAV assembly per console connection
//! - FIFO queuing of extension messages while the upstream is not ready
//! - Periodic status fan-out and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod audio;
pub mod config;
pub mod extension;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod upstream;
mod ws;

pub use config::{ServerConfig, UpstreamConfig};
pub use server::RelayServer;
