//! OpenAI Realtime API module.
//!
//! Speaks the realtime event protocol over a WebSocket at
//! `wss://api.openai.com/v1/realtime?model=...`, authenticated with a bearer
//! key and the `OpenAI-Beta: realtime=v1` header. Calls use G.711 u-law in
//! both directions so telephony audio passes through without transcoding.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TEMPERATURE, Modality, OPENAI_BETA_HEADER,
    OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice, TEMPERATURE_RANGE,
    realtime_url,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, Response, ServerEvent, Session,
    SessionConfig, TurnDetection, validate_audio_delta,
};
