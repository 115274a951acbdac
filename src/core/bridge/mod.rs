//! Per-call relay between a telephony media stream and the realtime AI service.
//!
//! - [`CallBridge`]: state machine and frame translation for one call
//! - [`run_call`]: the task that drives a bridge from its sockets
//! - [`ToolCallHandler`]: answers the assistant's function calls

mod call_bridge;
mod driver;
mod state;
mod tools;

pub use call_bridge::{
    BridgeError, BridgeSettings, CallBridge, DEFAULT_CONFIG_KEY, DEFAULT_GREETING_TEMPLATE,
    LOGGED_EVENT_TYPES,
};
pub use driver::{CallContext, run_call};
pub use state::{BridgeState, CallSession, Interruption, PENDING_MARK_BACKLOG, PlaybackState};
pub use tools::{
    AcknowledgeToolCalls, PendingToolCall, SharedToolHandler, ToolCall, ToolCallHandler,
    ToolError, ToolOutput, failure_output, start_tool_call,
};
