//! Observer WebSocket handler
//!
//! An observer connects with `?blueprintPIN=<key>` (or `?key=<key>`) and
//! receives every non-delta upstream event of the call configured with that
//! key. A newer observer for the same key replaces the older one.

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::registry::ObserverHandle;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ObserverQuery {
    #[serde(default, rename = "blueprintPIN", alias = "key")]
    pub key: Option<String>,
}

pub async fn observer_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ObserverQuery>,
) -> Response {
    let key = query.key.unwrap_or_default();
    info!(call_key = %key, "Observer upgrade requested");
    ws.on_upgrade(move |socket| handle_observer_socket(socket, state, key))
}

async fn handle_observer_socket(socket: WebSocket, app_state: Arc<AppState>, key: String) {
    let (mut sender, mut receiver) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();

    let handle = ObserverHandle::new(event_tx);
    let connection_id = handle.connection_id();

    if let Err(e) = app_state.observers.register(&key, handle) {
        warn!(error = %e, "Refusing observer connection");
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: e.to_string().into(),
            })))
            .await;
        return;
    }

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    debug!(call_key = %key, "Observer superseded by a newer connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = sender.send(Message::Text(event.into())).await {
                    warn!(call_key = %key, "Failed to send audit event: {}", e);
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(call_key = %key, "Observer WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    app_state.observers.unregister_connection(&key, connection_id);
    info!(call_key = %key, "Observer disconnected");
}
