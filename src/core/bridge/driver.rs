//! The per-call task that owns a [`CallBridge`].
//!
//! One `select!` loop multiplexes the telephony socket, the upstream connect
//! future, the upstream event stream, the pending prompt fetch and any
//! running function calls, feeding each result to the bridge in turn. The
//! loop ends when the bridge closes.

use futures::future::BoxFuture;
use futures::stream::FuturesOrdered;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::call_bridge::{BridgeSettings, CallBridge};
use super::tools::{PendingToolCall, SharedToolHandler};
use crate::core::audit::AuditRelay;
use crate::core::prompt::{PromptConfig, PromptError, PromptResult, SharedPromptFetcher};
use crate::core::realtime::{
    RealtimeResult, SharedConnector, UpstreamConnection, UpstreamSignal,
};
use crate::core::registry::{ActiveCalls, ObserverRegistry};
use crate::core::telephony::{TelephonyInput, TelephonyRoute};

/// Everything a call needs from the application.
#[derive(Clone)]
pub struct CallContext {
    pub connector: SharedConnector,
    pub prompts: SharedPromptFetcher,
    pub tools: SharedToolHandler,
    pub observers: ObserverRegistry,
    pub active_calls: ActiveCalls,
    pub settings: BridgeSettings,
    /// Pause between upstream open and session configuration
    pub configure_delay: Duration,
    pub prompt_fetch_timeout: Duration,
}

fn fetch_prompt(
    prompts: SharedPromptFetcher,
    key: String,
    delay: Duration,
    timeout: Duration,
) -> BoxFuture<'static, PromptResult<PromptConfig>> {
    Box::pin(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        debug!(store = prompts.name(), config_key = %key, "Fetching prompt configuration");
        tokio::time::timeout(timeout, prompts.fetch(&key))
            .await
            .map_err(|_| PromptError::Timeout(timeout))?
    })
}

/// Await an optional future; `None` never resolves.
async fn pending_or<F>(future: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match future {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn recv_or_pending<T>(events: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Run one call to completion.
///
/// `telephony_in` yields frames from the telephony socket; frames for it are
/// written to `telephony_out`, ending with [`TelephonyRoute::Close`].
pub async fn run_call<S>(
    ctx: CallContext,
    mut telephony_in: S,
    telephony_out: mpsc::UnboundedSender<TelephonyRoute>,
) where
    S: Stream<Item = TelephonyInput> + Unpin + Send,
{
    let mut bridge = CallBridge::new(
        telephony_out,
        AuditRelay::new(ctx.observers.clone()),
        ctx.active_calls.clone(),
        ctx.tools.clone(),
        ctx.settings.clone(),
    );
    info!(bridge_id = %bridge.id(), "Call started");

    let connector = ctx.connector.clone();
    let mut connect: Option<BoxFuture<'static, RealtimeResult<UpstreamConnection>>> =
        Some(Box::pin(async move { connector.connect().await }));
    bridge.begin_upstream_connect();

    let mut upstream_events: Option<mpsc::UnboundedReceiver<UpstreamSignal>> = None;
    let mut configure: Option<BoxFuture<'static, PromptResult<PromptConfig>>> = None;
    // Outputs resolve in the order the assistant requested the calls.
    let mut tool_calls: FuturesOrdered<PendingToolCall> = FuturesOrdered::new();

    let start_fetch = |key: String| {
        fetch_prompt(
            ctx.prompts.clone(),
            key,
            ctx.configure_delay,
            ctx.prompt_fetch_timeout,
        )
    };

    while !bridge.is_closed() {
        tokio::select! {
            result = pending_or(&mut connect), if connect.is_some() => {
                connect = None;
                match result {
                    Ok(connection) => {
                        upstream_events = Some(connection.events);
                        if let Some(key) = bridge.on_upstream_open(connection.sender) {
                            configure = Some(start_fetch(key));
                        }
                    }
                    Err(e) => bridge.on_upstream_failed(e),
                }
            }

            frame = telephony_in.next() => {
                match frame {
                    Some(TelephonyInput::Text(text)) => {
                        if let Some(key) = bridge.on_telephony_text(&text) {
                            configure = Some(start_fetch(key));
                        }
                    }
                    Some(TelephonyInput::Closed) | None => bridge.on_telephony_closed(),
                }
            }

            signal = recv_or_pending(&mut upstream_events), if upstream_events.is_some() => {
                match signal {
                    Some(UpstreamSignal::Message(text)) => {
                        tool_calls.extend(bridge.on_upstream_text(&text));
                    }
                    Some(UpstreamSignal::Closed { reason }) => bridge.on_upstream_closed(reason),
                    Some(UpstreamSignal::Error(e)) => bridge.on_upstream_failed(e),
                    None => bridge.on_upstream_closed(None),
                }
            }

            result = pending_or(&mut configure), if configure.is_some() => {
                configure = None;
                bridge.on_prompt_config(result);
            }

            Some(finished) = tool_calls.next(), if !tool_calls.is_empty() => {
                bridge.on_tool_output(finished);
            }
        }
    }

    if !tool_calls.is_empty() {
        debug!(pending = tool_calls.len(), "Abandoning unfinished function calls");
    }
    info!(
        bridge_id = %bridge.id(),
        call_id = ?bridge.session().call_id,
        upstream = %bridge.session().upstream_state,
        "Call finished"
    );
}
