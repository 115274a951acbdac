//! Base traits and types for the upstream realtime connection.
//!
//! A call's bridge never touches the upstream socket directly. It receives an
//! [`UpstreamConnection`] from an [`UpstreamConnector`]: a send half that
//! accepts [`ClientEvent`]s and a receive half that yields raw server frames
//! and the end-of-connection signal. Dropping the send half closes the socket.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::openai::ClientEvent;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the upstream connection.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Settings needed to open an upstream connection.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub api_key: String,
    pub model: String,
    pub connect_timeout: Duration,
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a call's upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamState {
    /// Connect requested, socket not yet open
    #[default]
    Connecting,
    /// Open and accepting events
    Open,
    /// Closed by either side
    Closed,
    /// Connect or transport failure
    Failed,
}

impl UpstreamState {
    /// Whether the connection is finished, cleanly or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpstreamState::Closed | UpstreamState::Failed)
    }
}

impl fmt::Display for UpstreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamState::Connecting => write!(f, "Connecting"),
            UpstreamState::Open => write!(f, "Open"),
            UpstreamState::Closed => write!(f, "Closed"),
            UpstreamState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Connection Handles
// =============================================================================

/// What the connection task reports back to the call driver.
#[derive(Debug)]
pub enum UpstreamSignal {
    /// A text frame, exactly as received
    Message(String),
    /// The server closed the socket
    Closed { reason: Option<String> },
    /// Transport failure; the connection is gone
    Error(RealtimeError),
}

/// An open upstream connection.
#[derive(Debug)]
pub struct UpstreamConnection {
    pub sender: mpsc::UnboundedSender<ClientEvent>,
    pub events: mpsc::UnboundedReceiver<UpstreamSignal>,
}

/// Opens upstream connections, one per call.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> RealtimeResult<UpstreamConnection>;
}

/// Shared connector handle stored in application state.
pub type SharedConnector = Arc<dyn UpstreamConnector>;
