//! Integration tests for the call driver
//!
//! `run_call` is exercised end to end with an in-memory upstream connector,
//! so no network access is needed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as stream_mpsc;
use serde_json::{Value, json};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;

use call_relay::core::bridge::{
    AcknowledgeToolCalls, BridgeSettings, CallContext, ToolCall, ToolCallHandler, ToolError,
    run_call,
};
use call_relay::core::prompt::{
    BuiltinPromptStore, PromptConfig, PromptConfigFetcher, PromptResult,
};
use call_relay::core::realtime::openai::ClientEvent;
use call_relay::core::realtime::{
    RealtimeError, RealtimeResult, UpstreamConnection, UpstreamConnector, UpstreamSignal,
};
use call_relay::core::telephony::{TelephonyInput, TelephonyOutbound, TelephonyRoute};
use call_relay::core::{ActiveCalls, ObserverHandle, ObserverRegistry};

const WAIT: Duration = Duration::from_secs(2);

/// Test-side ends of one upstream connection.
struct FakeUpstream {
    client_events: mpsc::UnboundedReceiver<ClientEvent>,
    signals: mpsc::UnboundedSender<UpstreamSignal>,
}

impl FakeUpstream {
    async fn next_event(&mut self) -> Value {
        let event = timeout(WAIT, self.client_events.recv())
            .await
            .expect("timed out waiting for upstream event")
            .expect("upstream channel closed");
        serde_json::to_value(&event).unwrap()
    }

    fn send(&self, event: Value) {
        self.signals
            .send(UpstreamSignal::Message(event.to_string()))
            .unwrap();
    }
}

/// Hands each connection's far ends to the test.
struct ChannelConnector {
    handoff: mpsc::UnboundedSender<FakeUpstream>,
}

#[async_trait]
impl UpstreamConnector for ChannelConnector {
    async fn connect(&self) -> RealtimeResult<UpstreamConnection> {
        let (sender, client_events) = mpsc::unbounded_channel();
        let (signals, events) = mpsc::unbounded_channel();
        self.handoff
            .send(FakeUpstream {
                client_events,
                signals,
            })
            .map_err(|_| RealtimeError::ConnectionFailed("test dropped handoff".to_string()))?;
        Ok(UpstreamConnection { sender, events })
    }
}

struct RefusingConnector;

#[async_trait]
impl UpstreamConnector for RefusingConnector {
    async fn connect(&self) -> RealtimeResult<UpstreamConnection> {
        Err(RealtimeError::ConnectionFailed("connection refused".to_string()))
    }
}

/// Never answers within any reasonable timeout.
struct StalledPromptStore;

#[async_trait]
impl PromptConfigFetcher for StalledPromptStore {
    async fn fetch(&self, _key: &str) -> PromptResult<PromptConfig> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        BuiltinPromptStore::default().fetch("default").await
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

/// Holds `hold` calls until the test releases the gate.
struct GatedTools {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ToolCallHandler for GatedTools {
    async fn handle(&self, call: &ToolCall) -> Result<String, ToolError> {
        if call.name == "hold" {
            let _permit = self.gate.acquire().await.map_err(|_| ToolError::Failed {
                name: call.name.clone(),
                reason: "gate closed".to_string(),
            })?;
        }
        Ok(json!({ "success": true, "tool": call.name }).to_string())
    }
}

struct Call {
    telephony_in: stream_mpsc::UnboundedSender<TelephonyInput>,
    telephony_out: mpsc::UnboundedReceiver<TelephonyRoute>,
    task: tokio::task::JoinHandle<()>,
}

impl Call {
    fn spawn(ctx: CallContext) -> Self {
        let (telephony_in, inbound) = stream_mpsc::unbounded();
        let (route_tx, telephony_out) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_call(ctx, inbound, route_tx));
        Self {
            telephony_in,
            telephony_out,
            task,
        }
    }

    fn send_text(&self, frame: Value) {
        self.telephony_in
            .unbounded_send(TelephonyInput::Text(frame.to_string()))
            .unwrap();
    }

    async fn next_route(&mut self) -> TelephonyRoute {
        timeout(WAIT, self.telephony_out.recv())
            .await
            .expect("timed out waiting for telephony frame")
            .expect("telephony channel closed")
    }

    async fn finished(self) {
        timeout(WAIT, self.task)
            .await
            .expect("call did not finish")
            .unwrap();
    }
}

fn context(
    connector: Arc<dyn UpstreamConnector>,
    prompts: Arc<dyn PromptConfigFetcher>,
) -> CallContext {
    CallContext {
        connector,
        prompts,
        tools: Arc::new(AcknowledgeToolCalls),
        observers: ObserverRegistry::new(),
        active_calls: ActiveCalls::new(),
        settings: BridgeSettings::default(),
        configure_delay: Duration::ZERO,
        prompt_fetch_timeout: Duration::from_secs(1),
    }
}

fn channel_context() -> (CallContext, mpsc::UnboundedReceiver<FakeUpstream>) {
    let (handoff, upstreams) = mpsc::unbounded_channel();
    let ctx = context(
        Arc::new(ChannelConnector { handoff }),
        Arc::new(BuiltinPromptStore::default()),
    );
    (ctx, upstreams)
}

fn start_frame(stream_sid: &str, key: &str) -> Value {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {
            "streamSid": stream_sid,
            "accountSid": "AC1",
            "callSid": "CA1",
            "tracks": ["inbound"],
            "customParameters": { "blueprintPIN": key },
            "mediaFormat": { "encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1 }
        },
        "streamSid": stream_sid
    })
}

async fn accept_upstream(upstreams: &mut mpsc::UnboundedReceiver<FakeUpstream>) -> FakeUpstream {
    timeout(WAIT, upstreams.recv())
        .await
        .expect("no upstream connection attempted")
        .expect("connector dropped")
}

#[tokio::test]
async fn test_call_end_to_end() {
    let (ctx, mut upstreams) = channel_context();
    let active_calls = ctx.active_calls.clone();
    let mut call = Call::spawn(ctx);
    let mut upstream = accept_upstream(&mut upstreams).await;

    call.send_text(json!({ "event": "connected", "protocol": "Call", "version": "1.0.0" }));
    call.send_text(start_frame("MZ7", "4321"));

    let update = upstream.next_event().await;
    assert_eq!(update["type"], "session.update");
    assert!(
        update["session"]["instructions"]
            .as_str()
            .unwrap()
            .contains("U+ Bank")
    );
    assert_eq!(upstream.next_event().await["type"], "conversation.item.create");
    assert_eq!(upstream.next_event().await["type"], "response.create");
    assert!(active_calls.contains("MZ7"));

    // Caller audio goes up untouched.
    call.send_text(json!({
        "event": "media",
        "streamSid": "MZ7",
        "media": { "track": "inbound", "chunk": "1", "timestamp": "20", "payload": "fn5+fn5+" }
    }));
    assert_eq!(
        upstream.next_event().await,
        json!({ "type": "input_audio_buffer.append", "audio": "fn5+fn5+" })
    );

    // Assistant audio comes down with a playback mark.
    upstream.send(json!({
        "type": "response.audio.delta",
        "response_id": "resp_1",
        "item_id": "item_1",
        "delta": "//8A"
    }));
    assert_eq!(
        call.next_route().await,
        TelephonyRoute::Frame(TelephonyOutbound::media("MZ7", "//8A"))
    );
    assert_eq!(
        call.next_route().await,
        TelephonyRoute::Frame(TelephonyOutbound::playback_mark("MZ7"))
    );

    call.send_text(json!({ "event": "stop", "streamSid": "MZ7", "stop": { "callSid": "CA1" } }));
    call.telephony_in
        .unbounded_send(TelephonyInput::Closed)
        .unwrap();
    assert_eq!(call.next_route().await, TelephonyRoute::Close);

    // The bridge dropped its upstream sender.
    assert!(
        timeout(WAIT, upstream.client_events.recv())
            .await
            .unwrap()
            .is_none()
    );
    call.finished().await;
    assert!(!active_calls.contains("MZ7"));
}

#[tokio::test]
async fn test_start_before_upstream_open_configures_once_open() {
    let (ctx, mut upstreams) = channel_context();
    let mut call = Call::spawn(ctx);

    call.send_text(start_frame("MZ8", "1"));
    let mut upstream = accept_upstream(&mut upstreams).await;

    assert_eq!(upstream.next_event().await["type"], "session.update");
    assert_eq!(upstream.next_event().await["type"], "conversation.item.create");
    assert_eq!(upstream.next_event().await["type"], "response.create");

    drop(upstream.signals);
    assert_eq!(call.next_route().await, TelephonyRoute::Close);
    call.finished().await;
}

#[tokio::test]
async fn test_upstream_connect_failure_closes_telephony() {
    let ctx = context(
        Arc::new(RefusingConnector),
        Arc::new(BuiltinPromptStore::default()),
    );
    let mut call = Call::spawn(ctx);

    assert_eq!(call.next_route().await, TelephonyRoute::Close);
    call.finished().await;
}

#[tokio::test]
async fn test_prompt_fetch_timeout_tears_down_call() {
    let (handoff, mut upstreams) = mpsc::unbounded_channel();
    let mut ctx = context(
        Arc::new(ChannelConnector { handoff }),
        Arc::new(StalledPromptStore),
    );
    ctx.prompt_fetch_timeout = Duration::from_millis(50);
    let active_calls = ctx.active_calls.clone();

    let mut call = Call::spawn(ctx);
    let mut upstream = accept_upstream(&mut upstreams).await;
    call.send_text(start_frame("MZ9", "777"));

    assert_eq!(call.next_route().await, TelephonyRoute::Close);
    assert!(
        timeout(WAIT, upstream.client_events.recv())
            .await
            .unwrap()
            .is_none()
    );
    call.finished().await;
    assert!(!active_calls.contains("MZ9"));
}

#[tokio::test]
async fn test_upstream_close_ends_call() {
    let (ctx, mut upstreams) = channel_context();
    let mut call = Call::spawn(ctx);
    let upstream = accept_upstream(&mut upstreams).await;
    call.send_text(start_frame("MZ10", "1"));

    upstream
        .signals
        .send(UpstreamSignal::Closed {
            reason: Some("server shutting down".to_string()),
        })
        .unwrap();

    assert_eq!(call.next_route().await, TelephonyRoute::Close);
    call.finished().await;
}

#[tokio::test]
async fn test_telephony_stream_end_ends_call() {
    let (ctx, mut upstreams) = channel_context();
    let mut call = Call::spawn(ctx);
    let _upstream = accept_upstream(&mut upstreams).await;

    call.telephony_in.close_channel();
    assert_eq!(call.next_route().await, TelephonyRoute::Close);
    call.finished().await;
}

#[tokio::test]
async fn test_observer_receives_audited_events() {
    let (ctx, mut upstreams) = channel_context();
    let observers = ctx.observers.clone();
    let (observer_tx, mut observer_rx) = mpsc::unbounded_channel();
    observers
        .register("2468", ObserverHandle::new(observer_tx))
        .unwrap();

    let call = Call::spawn(ctx);
    let mut upstream = accept_upstream(&mut upstreams).await;
    call.send_text(start_frame("MZ11", "2468"));
    for _ in 0..3 {
        upstream.next_event().await;
    }

    upstream.send(json!({ "type": "response.audio.delta", "item_id": "i", "delta": "AAAA" }));
    upstream.send(json!({ "type": "response.done", "response": { "id": "r", "output": [] } }));

    let audited = timeout(WAIT, observer_rx.recv()).await.unwrap().unwrap();
    let audited: Value = serde_json::from_str(&audited).unwrap();
    assert_eq!(audited["type"], "response.done");
}

#[tokio::test]
async fn test_duplicate_stream_is_refused() {
    let (ctx, mut upstreams) = channel_context();
    let first = Call::spawn(ctx.clone());
    let _first_upstream = accept_upstream(&mut upstreams).await;
    first.send_text(start_frame("MZ12", "1"));

    let mut second = Call::spawn(ctx.clone());
    let _second_upstream = accept_upstream(&mut upstreams).await;

    // Wait until the first call has claimed the stream.
    timeout(WAIT, async {
        while !ctx.active_calls.contains("MZ12") {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    second.send_text(start_frame("MZ12", "1"));
    assert_eq!(second.next_route().await, TelephonyRoute::Close);
    second.finished().await;
    assert!(ctx.active_calls.contains("MZ12"));
}

#[tokio::test]
async fn test_slow_function_call_does_not_stall_media() {
    let (mut ctx, mut upstreams) = channel_context();
    let gate = Arc::new(Semaphore::new(0));
    ctx.tools = Arc::new(GatedTools { gate: gate.clone() });

    let call = Call::spawn(ctx);
    let mut upstream = accept_upstream(&mut upstreams).await;
    call.send_text(start_frame("MZ13", "1"));
    for _ in 0..3 {
        upstream.next_event().await;
    }

    upstream.send(json!({
        "type": "response.done",
        "response": {
            "id": "resp_5",
            "output": [
                { "type": "function_call", "call_id": "call_slow", "name": "hold", "arguments": "{}" },
                { "type": "function_call", "call_id": "call_fast", "name": "change_address", "arguments": "{}" }
            ]
        }
    }));
    call.send_text(json!({
        "event": "media",
        "streamSid": "MZ13",
        "media": { "track": "inbound", "timestamp": "60", "payload": "fn5+" }
    }));

    // Caller audio is relayed while the first handler is still running.
    assert_eq!(
        upstream.next_event().await,
        json!({ "type": "input_audio_buffer.append", "audio": "fn5+" })
    );
    // The finished second call waits for the first one.
    assert!(
        timeout(Duration::from_millis(100), upstream.client_events.recv())
            .await
            .is_err()
    );

    gate.add_permits(1);
    let first = upstream.next_event().await;
    assert_eq!(first["type"], "conversation.item.create");
    assert_eq!(first["item"]["call_id"], "call_slow");
    assert_eq!(upstream.next_event().await["type"], "response.create");
    let second = upstream.next_event().await;
    assert_eq!(second["item"]["call_id"], "call_fast");
    assert_eq!(upstream.next_event().await["type"], "response.create");
}
