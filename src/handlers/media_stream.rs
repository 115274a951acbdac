//! Telephony media stream WebSocket handler
//!
//! Each accepted socket becomes one call: a writer task drains
//! [`TelephonyRoute`]s onto the socket while [`run_call`] drives the bridge
//! from the socket's inbound frames and the upstream connection.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::bridge::run_call;
use crate::core::telephony::{TelephonyInput, TelephonyRoute};
use crate::state::AppState;

/// Maximum WebSocket frame size (1 MB); media frames are a few hundred bytes
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Telephony media stream handler
///
/// Upgrades the connection and bridges it to a new upstream realtime session.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("Telephony media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state))
}

async fn handle_media_stream(socket: WebSocket, app_state: Arc<AppState>) {
    info!("Telephony client connected");

    let (mut sender, receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::unbounded_channel::<TelephonyRoute>();

    // Sender task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                TelephonyRoute::Frame(frame) => match serde_json::to_string(&frame) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize telephony frame: {}", e);
                        continue;
                    }
                },
                TelephonyRoute::Close => {
                    debug!("Closing telephony WebSocket connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Failed to send telephony frame: {}", e);
                break;
            }
        }
    });

    let inbound = receiver.filter_map(|frame| async move {
        match frame {
            Ok(Message::Text(text)) => Some(TelephonyInput::Text(text.as_str().to_owned())),
            Ok(Message::Close(_)) => Some(TelephonyInput::Closed),
            Ok(Message::Binary(data)) => {
                debug!(bytes = data.len(), "Ignoring binary telephony frame");
                None
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Telephony WebSocket error: {}", e);
                Some(TelephonyInput::Closed)
            }
        }
    });

    run_call(app_state.call_context(), Box::pin(inbound), route_tx).await;

    // The bridge queued a close; let the writer flush it.
    if let Err(e) = sender_task.await {
        error!("Telephony sender task failed: {}", e);
    }

    info!("Telephony client disconnected");
}
