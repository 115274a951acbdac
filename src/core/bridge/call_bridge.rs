//! The per-call relay between telephony and the realtime AI service.
//!
//! A [`CallBridge`] is pure state plus outbound channels. It never awaits
//! I/O of its own; function calls are handed back to the call driver as
//! pending futures. The driver feeds it inbound frames and lifecycle signals
//! one at a time, so no locking is needed.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::state::{BridgeState, CallSession};
use super::tools::{PendingToolCall, SharedToolHandler, ToolCall, ToolOutput, start_tool_call};
use crate::core::audit::{AuditRelay, is_audited_event};
use crate::core::prompt::{PromptConfig, PromptError, PromptResult};
use crate::core::realtime::openai::{
    ClientEvent, ConversationItem, DEFAULT_TEMPERATURE, Modality, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeVoice, Response, ServerEvent, SessionConfig, TEMPERATURE_RANGE, TurnDetection,
    validate_audio_delta,
};
use crate::core::realtime::{RealtimeError, UpstreamState};
use crate::core::registry::ActiveCalls;
use crate::core::telephony::{
    MediaPayload, StartPayload, TelephonyInbound, TelephonyOutbound, TelephonyRoute,
};

/// Configuration key fetched when the stream did not supply one.
pub const DEFAULT_CONFIG_KEY: &str = "default";

/// `{organization}` is replaced with the prompt's organization name.
pub const DEFAULT_GREETING_TEMPLATE: &str = "Greet the user with \"Thank you for contacting {organization}, how can I assist you today?\" Then briefly summarize the tasks you can help with.";

/// Upstream event types logged when `log_upstream_events` is on.
pub const LOGGED_EVENT_TYPES: &[&str] = &[
    "error",
    "response.content.done",
    "rate_limits.updated",
    "response.done",
    "input_audio_buffer.committed",
    "input_audio_buffer.speech_stopped",
    "input_audio_buffer.speech_started",
    "session.created",
];

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Upstream connection failed: {0}")]
    Upstream(#[from] RealtimeError),

    #[error("Prompt configuration for '{key}' unavailable: {source}")]
    Prompt {
        key: String,
        #[source]
        source: PromptError,
    },

    #[error("Call {0} already has an active bridge")]
    DuplicateCall(String),
}

/// Per-call session settings taken from the server configuration.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub voice: OpenAIRealtimeVoice,
    /// Used when the prompt configuration has no temperature of its own
    pub temperature: f32,
    pub greeting_template: String,
    pub log_upstream_events: bool,
    pub show_timing_math: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            voice: OpenAIRealtimeVoice::default(),
            temperature: DEFAULT_TEMPERATURE,
            greeting_template: DEFAULT_GREETING_TEMPLATE.to_string(),
            log_upstream_events: false,
            show_timing_math: false,
        }
    }
}

impl BridgeSettings {
    pub fn greeting(&self, organization: &str) -> String {
        self.greeting_template.replace("{organization}", organization)
    }
}

pub struct CallBridge {
    id: Uuid,
    state: BridgeState,
    session: CallSession,
    upstream: Option<mpsc::UnboundedSender<ClientEvent>>,
    telephony: mpsc::UnboundedSender<TelephonyRoute>,
    audit: AuditRelay,
    active_calls: ActiveCalls,
    tools: SharedToolHandler,
    settings: BridgeSettings,
    /// Set once the prompt fetch has been requested
    requested_config_key: Option<String>,
}

impl CallBridge {
    pub fn new(
        telephony: mpsc::UnboundedSender<TelephonyRoute>,
        audit: AuditRelay,
        active_calls: ActiveCalls,
        tools: SharedToolHandler,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: BridgeState::Idle,
            session: CallSession::default(),
            upstream: None,
            telephony,
            audit,
            active_calls,
            tools,
            settings,
            requested_config_key: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn is_closed(&self) -> bool {
        self.state == BridgeState::Closed
    }

    // -------------------------------------------------------------------------
    // Upstream lifecycle
    // -------------------------------------------------------------------------

    /// Note that the driver has started connecting upstream.
    pub fn begin_upstream_connect(&mut self) {
        if self.state == BridgeState::Idle {
            self.state = BridgeState::AwaitingUpstreamOpen;
            self.session.upstream_state = UpstreamState::Connecting;
        }
    }

    /// Attach the open upstream connection.
    ///
    /// Returns the configuration key to fetch when the call is ready to be
    /// configured.
    pub fn on_upstream_open(
        &mut self,
        sender: mpsc::UnboundedSender<ClientEvent>,
    ) -> Option<String> {
        if self.is_closed() {
            // Dropping the sender closes the late connection.
            return None;
        }
        if self.upstream.is_some() {
            warn!(bridge_id = %self.id, "Upstream already open, ignoring second connection");
            return None;
        }

        info!(bridge_id = %self.id, call_id = ?self.session.call_id, "Upstream connection open");
        self.upstream = Some(sender);
        self.session.upstream_state = UpstreamState::Open;
        self.request_configuration()
    }

    pub fn on_upstream_closed(&mut self, reason: Option<String>) {
        if self.is_closed() {
            return;
        }
        info!(call_id = ?self.session.call_id, ?reason, "Upstream connection closed");
        self.session.upstream_state = UpstreamState::Closed;
        self.close();
    }

    pub fn on_upstream_failed(&mut self, error: RealtimeError) {
        if self.is_closed() {
            return;
        }
        self.session.upstream_state = UpstreamState::Failed;
        self.fail(BridgeError::Upstream(error));
    }

    fn request_configuration(&mut self) -> Option<String> {
        if self.state != BridgeState::AwaitingUpstreamOpen
            || self.session.upstream_state != UpstreamState::Open
            || self.requested_config_key.is_some()
        {
            return None;
        }
        // The stream must have started before we know which prompt to load.
        self.session.call_id.as_ref()?;

        let key = self
            .session
            .config_key
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_KEY.to_string());
        info!(call_id = ?self.session.call_id, config_key = %key, "Requesting prompt configuration");

        self.requested_config_key = Some(key.clone());
        self.state = BridgeState::ConfiguringSession;
        Some(key)
    }

    /// Apply the prompt fetch result. A failure tears the call down.
    pub fn on_prompt_config(&mut self, result: PromptResult<PromptConfig>) {
        if self.state != BridgeState::ConfiguringSession {
            debug!(state = %self.state, "Ignoring prompt configuration outside session setup");
            return;
        }

        match result {
            Ok(config) => self.configure_session(config),
            Err(source) => {
                let key = self.requested_config_key.clone().unwrap_or_default();
                self.fail(BridgeError::Prompt { key, source });
            }
        }
    }

    /// The prompt's temperature when the service would accept it.
    fn session_temperature(&self, config: &PromptConfig) -> f32 {
        match config.temperature {
            Some(t) if TEMPERATURE_RANGE.contains(&t) => t,
            Some(t) => {
                warn!(
                    call_id = ?self.session.call_id,
                    temperature = t,
                    fallback = self.settings.temperature,
                    "Prompt temperature out of range, using server default"
                );
                self.settings.temperature
            }
            None => self.settings.temperature,
        }
    }

    fn configure_session(&mut self, config: PromptConfig) {
        let temperature = self.session_temperature(&config);
        let session = SessionConfig {
            turn_detection: Some(TurnDetection::server_vad()),
            input_audio_format: Some(OpenAIRealtimeAudioFormat::G711Ulaw),
            output_audio_format: Some(OpenAIRealtimeAudioFormat::G711Ulaw),
            voice: Some(self.settings.voice),
            instructions: Some(config.prompt.clone()),
            modalities: Some(vec![Modality::Text, Modality::Audio]),
            temperature: Some(temperature),
            tools: Some(config.functions.clone()),
            tool_choice: Some("auto".to_string()),
        };

        info!(
            call_id = ?self.session.call_id,
            organization = %config.organization,
            tools = config.functions.len(),
            "Configuring upstream session"
        );

        self.send_upstream(ClientEvent::SessionUpdate { session });
        self.send_upstream(ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text(self.settings.greeting(&config.organization)),
        });
        self.send_upstream(ClientEvent::ResponseCreate);

        self.session.prompt_config = Some(config);
        self.state = BridgeState::Active;
    }

    // -------------------------------------------------------------------------
    // Telephony -> upstream
    // -------------------------------------------------------------------------

    /// Handle one text frame from the telephony socket.
    ///
    /// Returns the configuration key to fetch when this frame made the call
    /// ready to be configured.
    pub fn on_telephony_text(&mut self, text: &str) -> Option<String> {
        if self.is_closed() {
            return None;
        }

        let frame = match TelephonyInbound::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(call_id = ?self.session.call_id, error = %e, "Dropping telephony frame");
                return None;
            }
        };

        match frame {
            TelephonyInbound::Start { start } => return self.handle_start(start),
            TelephonyInbound::Media { media } => self.handle_media(media),
            TelephonyInbound::Mark { .. } => {
                self.session.playback.ack_mark();
            }
            TelephonyInbound::Connected { protocol, version } => {
                debug!(?protocol, ?version, "Telephony stream connected");
            }
            TelephonyInbound::Stop { .. } => {
                info!(call_id = ?self.session.call_id, "Telephony stream stopped");
            }
            TelephonyInbound::Other => {
                trace!("Ignoring telephony event");
            }
        }
        None
    }

    fn handle_start(&mut self, start: StartPayload) -> Option<String> {
        if let Some(existing) = &self.session.call_id
            && existing != &start.stream_sid
        {
            warn!(
                call_id = %existing,
                new_stream_sid = %start.stream_sid,
                "Ignoring start for a different stream"
            );
            return None;
        }

        if !self.active_calls.claim(&start.stream_sid, self.id) {
            self.fail(BridgeError::DuplicateCall(start.stream_sid));
            return None;
        }

        info!(
            call_id = %start.stream_sid,
            call_sid = ?start.call_sid,
            config_key = ?start.config_key(),
            "Incoming stream has started"
        );

        if self.session.config_key.is_none() {
            self.session.config_key = start.config_key().map(str::to_string);
        }
        self.session.call_id = Some(start.stream_sid);
        self.session.latest_media_timestamp_ms = 0;
        self.session.playback.response_start_timestamp_ms = None;

        self.request_configuration()
    }

    fn handle_media(&mut self, media: MediaPayload) {
        self.session.observe_media_timestamp(media.timestamp);
        if self.session.upstream_state == UpstreamState::Open {
            self.send_upstream(ClientEvent::InputAudioBufferAppend {
                audio: media.payload,
            });
        }
    }

    /// The telephony socket is gone.
    pub fn on_telephony_closed(&mut self) {
        if self.is_closed() {
            return;
        }
        info!(call_id = ?self.session.call_id, "Telephony connection closed");
        self.close();
    }

    // -------------------------------------------------------------------------
    // Upstream -> telephony
    // -------------------------------------------------------------------------

    /// Handle one text frame from the upstream connection.
    ///
    /// Returns the function calls requested by a `response.done`, in item
    /// order. Each one must be polled to completion and its result passed to
    /// [`CallBridge::on_tool_output`].
    #[must_use = "pending function calls must be driven to completion"]
    pub fn on_upstream_text(&mut self, text: &str) -> Vec<PendingToolCall> {
        if self.is_closed() {
            return Vec::new();
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(call_id = ?self.session.call_id, error = %e, "Dropping upstream frame");
                return Vec::new();
            }
        };
        let event_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        if is_audited_event(&event_type)
            && let Some(key) = self.session.audit_key()
        {
            self.audit.publish(key, text);
        }

        if self.settings.log_upstream_events && LOGGED_EVENT_TYPES.contains(&event_type.as_str()) {
            info!(event_type = %event_type, event = %text, "Received upstream event");
        }

        let event = match serde_json::from_value::<ServerEvent>(value) {
            Ok(event) => event,
            Err(e) => {
                warn!(event_type = %event_type, error = %e, "Unrecognized upstream event payload");
                return Vec::new();
            }
        };

        match event {
            ServerEvent::AudioDelta { item_id, delta, .. } => self.handle_audio_delta(item_id, delta),
            ServerEvent::SpeechStarted { .. } => self.handle_speech_started(),
            ServerEvent::ResponseDone { response } => return self.handle_response_done(response),
            ServerEvent::Error { error } => {
                error!(call_id = ?self.session.call_id, error = %error, "Upstream reported an error");
            }
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                debug!(
                    event_type = %event_type,
                    session_id = ?session.and_then(|s| s.id),
                    "Upstream session event"
                );
            }
            ServerEvent::Other => {}
        }
        Vec::new()
    }

    fn handle_audio_delta(&mut self, item_id: Option<String>, delta: Option<String>) {
        let Some(delta) = delta.filter(|d| !d.is_empty()) else {
            return;
        };
        let Some(stream_sid) = self.session.call_id.clone() else {
            debug!("Dropping assistant audio before the stream started");
            return;
        };
        if let Err(e) = validate_audio_delta(&delta) {
            warn!(call_id = %stream_sid, error = %e, "Dropping undecodable assistant audio");
            return;
        }

        let latest = self.session.latest_media_timestamp_ms;
        if self.settings.show_timing_math && self.session.playback.response_start_timestamp_ms.is_none() {
            debug!(call_id = %stream_sid, response_start_ms = latest, "Assistant response started");
        }
        self.session.playback.record_delta(item_id.as_deref(), latest);

        self.send_telephony(TelephonyOutbound::media(&stream_sid, delta));
        self.send_telephony(TelephonyOutbound::playback_mark(&stream_sid));
        if self.session.playback.push_mark() {
            debug!(
                call_id = %stream_sid,
                pending_marks = self.session.playback.pending_marks.len(),
                "Telephony is not acknowledging playback marks"
            );
        }
    }

    fn handle_speech_started(&mut self) {
        let latest = self.session.latest_media_timestamp_ms;
        let response_start = self.session.playback.response_start_timestamp_ms;
        let Some(interruption) = self.session.playback.interrupt(latest) else {
            return;
        };

        if self.settings.show_timing_math {
            debug!(
                latest_ms = latest,
                response_start_ms = ?response_start,
                elapsed_ms = interruption.elapsed_ms,
                "Truncation timing: {} - {:?} = {}",
                latest,
                response_start,
                interruption.elapsed_ms
            );
        }

        if let Some(item_id) = interruption.item_id {
            self.send_upstream(ClientEvent::ConversationItemTruncate {
                item_id,
                content_index: 0,
                audio_end_ms: interruption.elapsed_ms,
            });
        }
        if let Some(stream_sid) = &self.session.call_id {
            self.send_telephony(TelephonyOutbound::clear(stream_sid));
        }
        info!(
            call_id = ?self.session.call_id,
            audio_end_ms = interruption.elapsed_ms,
            "Caller interrupted assistant playback"
        );
    }

    fn handle_response_done(&self, response: Response) -> Vec<PendingToolCall> {
        let mut pending = Vec::new();
        for item in response.function_calls() {
            let Some(call_id) = item.call_id.clone() else {
                warn!(tool = ?item.name, "Function call without call_id, skipping");
                continue;
            };
            let call = ToolCall {
                call_id,
                name: item.name.clone().unwrap_or_default(),
                arguments: item.arguments.clone().unwrap_or_default(),
            };
            debug!(call_id = %call.call_id, tool = %call.name, "Dispatching function call");
            pending.push(start_tool_call(self.tools.clone(), call));
        }
        pending
    }

    /// Return a finished function call to the assistant and ask it to continue.
    pub fn on_tool_output(&mut self, finished: ToolOutput) {
        if self.is_closed() {
            debug!(call_id = %finished.call_id, "Call closed, dropping function call output");
            return;
        }
        self.send_upstream(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(finished.call_id, finished.output),
        });
        self.send_upstream(ClientEvent::ResponseCreate);
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Tear the call down. Idempotent.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = BridgeState::Closed;

        self.upstream = None;
        if !self.session.upstream_state.is_terminal() {
            self.session.upstream_state = UpstreamState::Closed;
        }

        let _ = self.telephony.send(TelephonyRoute::Close);
        if let Some(call_id) = &self.session.call_id {
            self.active_calls.release(call_id, self.id);
        }
        info!(bridge_id = %self.id, call_id = ?self.session.call_id, "Call bridge closed");
    }

    fn fail(&mut self, error: BridgeError) {
        error!(call_id = ?self.session.call_id, error = %error, "Tearing down call");
        self.close();
    }

    fn send_upstream(&self, event: ClientEvent) {
        if self.is_closed() {
            return;
        }
        let Some(sender) = &self.upstream else {
            trace!(event_type = event.event_type(), "No upstream connection, event dropped");
            return;
        };
        let event_type = event.event_type();
        if sender.send(event).is_err() {
            debug!(event_type, "Upstream channel closed, event dropped");
        }
    }

    fn send_telephony(&self, frame: TelephonyOutbound) {
        if self.is_closed() {
            return;
        }
        if self.telephony.send(TelephonyRoute::Frame(frame)).is_err() {
            debug!("Telephony channel closed, frame dropped");
        }
    }
}

impl Drop for CallBridge {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::tools::AcknowledgeToolCalls;
    use crate::core::registry::ObserverRegistry;
    use std::sync::Arc;

    fn bridge() -> (
        CallBridge,
        mpsc::UnboundedReceiver<TelephonyRoute>,
        ActiveCalls,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let calls = ActiveCalls::new();
        let bridge = CallBridge::new(
            tx,
            AuditRelay::new(ObserverRegistry::new()),
            calls.clone(),
            Arc::new(AcknowledgeToolCalls),
            BridgeSettings::default(),
        );
        (bridge, rx, calls)
    }

    const START: &str =
        r#"{"event":"start","start":{"streamSid":"MZ1","customParameters":{"blueprintPIN":"123"}}}"#;

    #[test]
    fn test_fetch_waits_for_both_open_and_start() {
        let (mut bridge, _rx, _calls) = bridge();
        bridge.begin_upstream_connect();
        assert_eq!(bridge.state(), BridgeState::AwaitingUpstreamOpen);
        assert_eq!(bridge.session().upstream_state, UpstreamState::Connecting);

        assert_eq!(bridge.on_telephony_text(START), None);

        let (up_tx, _up_rx) = mpsc::unbounded_channel();
        assert_eq!(bridge.on_upstream_open(up_tx).as_deref(), Some("123"));
        assert_eq!(bridge.state(), BridgeState::ConfiguringSession);

        // A repeated start does not trigger a second fetch.
        assert_eq!(bridge.on_telephony_text(START), None);
    }

    #[test]
    fn test_missing_key_uses_default() {
        let (mut bridge, _rx, _calls) = bridge();
        bridge.begin_upstream_connect();
        let (up_tx, _up_rx) = mpsc::unbounded_channel();
        assert_eq!(bridge.on_upstream_open(up_tx), None);
        assert_eq!(
            bridge
                .on_telephony_text(r#"{"event":"start","start":{"streamSid":"MZ2"}}"#)
                .as_deref(),
            Some(DEFAULT_CONFIG_KEY)
        );
        assert_eq!(bridge.session().audit_key(), Some("MZ2"));
    }

    #[test]
    fn test_duplicate_call_is_refused() {
        let (mut first, _rx1, calls) = bridge();
        first.begin_upstream_connect();
        first.on_telephony_text(START);
        assert!(calls.contains("MZ1"));

        let (tx, mut rx2) = mpsc::unbounded_channel();
        let mut second = CallBridge::new(
            tx,
            AuditRelay::new(ObserverRegistry::new()),
            calls.clone(),
            Arc::new(AcknowledgeToolCalls),
            BridgeSettings::default(),
        );
        second.begin_upstream_connect();
        second.on_telephony_text(START);
        assert!(second.is_closed());
        assert_eq!(rx2.try_recv().unwrap(), TelephonyRoute::Close);
        // The first bridge still owns the call.
        assert!(calls.contains("MZ1"));

        first.close();
        assert!(!calls.contains("MZ1"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut bridge, mut rx, _calls) = bridge();
        bridge.begin_upstream_connect();
        bridge.close();
        bridge.close();
        bridge.on_telephony_closed();
        assert_eq!(rx.try_recv().unwrap(), TelephonyRoute::Close);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.session().upstream_state, UpstreamState::Closed);
    }

    #[test]
    fn test_late_upstream_open_after_close_is_dropped() {
        let (mut bridge, _rx, _calls) = bridge();
        bridge.begin_upstream_connect();
        bridge.on_telephony_closed();

        let (up_tx, mut up_rx) = mpsc::unbounded_channel();
        assert_eq!(bridge.on_upstream_open(up_tx), None);
        assert!(matches!(
            up_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_greeting_template() {
        let settings = BridgeSettings::default();
        assert!(
            settings
                .greeting("Acme")
                .starts_with("Greet the user with \"Thank you for contacting Acme, how can I assist you today?\"")
        );
    }
}
