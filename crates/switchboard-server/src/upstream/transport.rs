//! Upstream transport: the connector seam and the realtime WebSocket client.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, warn};

use switchboard_core::errors::{RelayError, Result};

use crate::config::UpstreamConfig;

/// One live upstream connection, as a pair of JSON event channels.
///
/// Dropping `outbound` closes the connection; `inbound` closing means the
/// transport went away.
pub struct UpstreamChannel {
    /// Events to send upstream.
    pub outbound: mpsc::Sender<Value>,
    /// Events received from upstream.
    pub inbound: mpsc::Receiver<Value>,
}

/// Seam between the session manager and the wire.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open a connection to the upstream endpoint.
    async fn connect(&self, config: &UpstreamConfig, api_key: &str) -> Result<UpstreamChannel>;
}

/// Production connector speaking the realtime WebSocket protocol.
pub struct RealtimeConnector;

#[async_trait]
impl UpstreamConnector for RealtimeConnector {
    async fn connect(&self, config: &UpstreamConfig, api_key: &str) -> Result<UpstreamChannel> {
        let url = format!("{}?model={}", config.endpoint, config.model);
        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
        let headers = request.headers_mut();
        let _ = headers.insert("Authorization", auth);
        let _ = headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
        debug!(endpoint = %config.endpoint, model = %config.model, "upstream connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Value>(256);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Value>(256);

        // Write task: JSON events out until the sender side is dropped.
        let _ = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let text = event.to_string();
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "upstream send failed, closing write task");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Read task: parse inbound frames; dropping `inbound_tx` signals close.
        let _ = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(event) => {
                            if inbound_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "unparseable upstream frame, skipping");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        debug!("upstream sent close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "upstream read failed");
                        break;
                    }
                }
            }
        });

        Ok(UpstreamChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
