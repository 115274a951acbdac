//! Error types for the HTTP surface.
//!
//! Domain modules define their own `thiserror` enums (`RealtimeError`,
//! `PromptError`, `BridgeError`, ...). Handlers convert failures into
//! [`AppError`], which renders as a JSON `{"error": ...}` response.

pub mod app_error;

pub use app_error::{AppError, AppResult};
