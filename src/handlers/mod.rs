//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `ingest` - JSON forwarding to the processing service
//! - `media_stream` - Telephony media stream WebSocket (one call per socket)
//! - `observer` - Audit event WebSocket for a call key

pub mod api;
pub mod ingest;
pub mod media_stream;
pub mod observer;

pub use media_stream::media_stream_handler;
pub use observer::observer_handler;
