//! Upstream realtime AI connection.
//!
//! [`UpstreamConnector`] is the seam between a call and the AI service:
//! production uses [`OpenAIRealtime`], tests substitute in-memory channels.

mod base;
pub mod openai;

pub use base::{
    RealtimeConfig, RealtimeError, RealtimeResult, SharedConnector, UpstreamConnection,
    UpstreamConnector, UpstreamSignal, UpstreamState,
};
pub use openai::OpenAIRealtime;
