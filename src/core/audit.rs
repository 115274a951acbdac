//! Audit fan-out of upstream events to observers.

use tracing::trace;

use super::registry::ObserverRegistry;

/// Whether an upstream event type is forwarded to observers.
///
/// Streaming deltas (audio, transcript, text, function arguments) are
/// excluded; everything else is audited.
pub fn is_audited_event(event_type: &str) -> bool {
    !event_type.contains("delta")
}

/// Forwards raw upstream events to the observer registered for a call.
#[derive(Debug, Clone)]
pub struct AuditRelay {
    observers: ObserverRegistry,
}

impl AuditRelay {
    pub fn new(observers: ObserverRegistry) -> Self {
        Self { observers }
    }

    /// Forward `raw_event` unchanged to the observer for `call_key`.
    ///
    /// Never blocks and never retries. Returns true when the event was queued.
    pub fn publish(&self, call_key: &str, raw_event: &str) -> bool {
        let Some(observer) = self.observers.get(call_key) else {
            return false;
        };
        let delivered = observer.send(raw_event.to_string());
        if !delivered {
            trace!(call_key, "Observer queue closed, audit event dropped");
        }
        delivered
    }
}
