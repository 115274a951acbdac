//! Function-call handling for `response.done`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// A function call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments as the service sent them
    pub arguments: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' is not supported")]
    Unsupported(String),

    #[error("Tool '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Produces the output string returned to the assistant for a function call.
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    async fn handle(&self, call: &ToolCall) -> Result<String, ToolError>;
}

pub type SharedToolHandler = Arc<dyn ToolCallHandler>;

/// Acknowledges every call as successful without doing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcknowledgeToolCalls;

#[async_trait]
impl ToolCallHandler for AcknowledgeToolCalls {
    async fn handle(&self, call: &ToolCall) -> Result<String, ToolError> {
        info!(
            call_id = %call.call_id,
            tool = %call.name,
            arguments = %call.arguments,
            "Acknowledging function call"
        );
        Ok(serde_json::json!({ "success": true }).to_string())
    }
}

/// Output sent back when a handler fails, so the assistant can recover.
pub fn failure_output(error: &ToolError) -> String {
    serde_json::json!({ "success": false, "error": error.to_string() }).to_string()
}

/// A finished function call, ready to be returned to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

/// A function call still running in its handler.
pub type PendingToolCall = BoxFuture<'static, ToolOutput>;

/// Run `call` through `handler` without borrowing the bridge.
///
/// Handler failures become a [`failure_output`] so every call gets an answer.
pub fn start_tool_call(handler: SharedToolHandler, call: ToolCall) -> PendingToolCall {
    Box::pin(async move {
        let output = match handler.handle(&call).await {
            Ok(output) => output,
            Err(e) => {
                warn!(call_id = %call.call_id, tool = %call.name, error = %e, "Function call failed");
                failure_output(&e)
            }
        };
        ToolOutput {
            call_id: call.call_id,
            output,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acknowledge_reports_success() {
        let call = ToolCall {
            call_id: "c1".to_string(),
            name: "change_address".to_string(),
            arguments: r#"{"city":"Springfield"}"#.to_string(),
        };
        let output = AcknowledgeToolCalls.handle(&call).await.unwrap();
        assert_eq!(output, r#"{"success":true}"#);
    }

    struct Unavailable;

    #[async_trait]
    impl ToolCallHandler for Unavailable {
        async fn handle(&self, call: &ToolCall) -> Result<String, ToolError> {
            Err(ToolError::Unsupported(call.name.clone()))
        }
    }

    #[tokio::test]
    async fn test_pending_call_reports_handler_failure() {
        let call = ToolCall {
            call_id: "c2".to_string(),
            name: "teleport".to_string(),
            arguments: "{}".to_string(),
        };
        let finished = start_tool_call(Arc::new(Unavailable), call).await;
        assert_eq!(finished.call_id, "c2");
        let value: serde_json::Value = serde_json::from_str(&finished.output).unwrap();
        assert_eq!(value["success"], false);
    }

    #[test]
    fn test_failure_output() {
        let output = failure_output(&ToolError::Unsupported("teleport".to_string()));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Tool 'teleport' is not supported");
    }
}
