//! Periodic status fan-out to every channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use switchboard_core::frames::StatusFrame;

use crate::extension::ExtensionBridge;
use crate::registry::ConnectionRegistry;
use crate::upstream::UpstreamManager;

/// Run the status broadcast loop.
///
/// Every `interval` a status frame goes to the console registry, the
/// extension channel, and the monitor registry. The loop runs for the life
/// of the process; only the shutdown token stops it, never connection
/// churn.
pub async fn run_status_broadcaster(
    registry: Arc<ConnectionRegistry>,
    monitors: Arc<ConnectionRegistry>,
    extension: Arc<ExtensionBridge>,
    upstream: Arc<UpstreamManager>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    // The first tick fires immediately; skip it so status cadence starts
    // one interval after boot.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = StatusFrame::new(
                    upstream.is_connected(),
                    registry.count(),
                    extension.is_attached(),
                );
                let value = match serde_json::to_value(&frame) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                debug!(
                    connected = frame.is_connected,
                    clients = frame.connected_clients,
                    extension = frame.extension_connected,
                    "status broadcast"
                );
                registry.broadcast(&value);
                monitors.broadcast(&value);
                extension.send_json(&value);
            }
            () = cancel.cancelled() => {
                debug!("status broadcaster stopping");
                return;
            }
        }
    }
}
