//! OpenAI Realtime API WebSocket client.
//!
//! [`OpenAIRealtime`] opens one socket per call and hands the bridge an
//! [`UpstreamConnection`]. A spawned pump task owns the socket: it writes
//! every [`ClientEvent`] from the send channel, forwards text frames to the
//! event channel, answers pings, and reports close or failure exactly once.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use super::config::{OPENAI_BETA_HEADER, realtime_url};
use super::messages::ClientEvent;
use crate::core::realtime::base::{
    RealtimeConfig, RealtimeError, RealtimeResult, UpstreamConnection, UpstreamConnector,
    UpstreamSignal,
};

/// Connector for the OpenAI Realtime API.
#[derive(Debug, Clone)]
pub struct OpenAIRealtime {
    config: RealtimeConfig,
    endpoint: String,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "OpenAI API key is required".to_string(),
            ));
        }
        let endpoint = realtime_url(&config.model);
        Ok(Self { config, endpoint })
    }

    /// Point the connector at a different endpoint (local relays, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(http::header::AUTHORIZATION, bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static(OPENAI_BETA_HEADER));
        Ok(request)
    }
}

#[async_trait]
impl UpstreamConnector for OpenAIRealtime {
    async fn connect(&self) -> RealtimeResult<UpstreamConnection> {
        let request = self.build_request()?;

        let (ws_stream, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| {
            RealtimeError::Timeout(format!(
                "connect did not complete within {:?}",
                self.config.connect_timeout
            ))
        })?
        .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        tracing::info!(model = %self.config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel::<UpstreamSignal>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = event_rx.recv() => {
                        let Some(event) = outgoing else {
                            // The bridge dropped its sender: close our side.
                            let _ = ws_sink.send(Message::Close(None)).await;
                            let _ = ws_sink.close().await;
                            tracing::debug!("Upstream connection closed by bridge");
                            break;
                        };

                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            let _ = signal_tx.send(UpstreamSignal::Error(
                                RealtimeError::WebSocketError(e.to_string()),
                            ));
                            break;
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if signal_tx
                                    .send(UpstreamSignal::Message(text.as_str().to_owned()))
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                let reason = frame
                                    .map(|f| f.reason.as_str().to_owned())
                                    .filter(|r| !r.is_empty());
                                tracing::info!(?reason, "WebSocket closed by server");
                                let _ = signal_tx.send(UpstreamSignal::Closed { reason });
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                let _ = signal_tx.send(UpstreamSignal::Error(
                                    RealtimeError::WebSocketError(e.to_string()),
                                ));
                                break;
                            }
                            None => {
                                let _ = signal_tx.send(UpstreamSignal::Closed { reason: None });
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(UpstreamConnection {
            sender: event_tx,
            events: signal_rx,
        })
    }
}
