pub mod audit;
pub mod bridge;
pub mod prompt;
pub mod realtime;
pub mod registry;
pub mod telephony;

// Re-export commonly used types for convenience
pub use audit::{AuditRelay, is_audited_event};
pub use bridge::{BridgeSettings, CallBridge, CallContext, run_call};
pub use prompt::{PromptConfig, PromptConfigFetcher, PromptError, SharedPromptFetcher};
pub use realtime::{OpenAIRealtime, RealtimeConfig, RealtimeError, RealtimeResult};
pub use registry::{ActiveCalls, ObserverHandle, ObserverRegistry};
