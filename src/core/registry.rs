//! Process-wide call registries.
//!
//! [`ObserverRegistry`] maps a call key to the one observer socket watching
//! that call; [`ActiveCalls`] guarantees a single bridge per call identifier.
//! Both are created once in application state and cloned into handlers.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Observer registration requires a non-empty call key")]
    EmptyKey,
}

/// Canonical form of a call key: surrounding whitespace removed, empty is `None`.
///
/// Every lookup and every publisher goes through this, so `"123 "` and
/// `"123"` name the same call.
pub fn normalize_call_key(call_key: &str) -> Option<&str> {
    Some(call_key.trim()).filter(|key| !key.is_empty())
}

/// Sending half of an observer connection.
///
/// Each handle carries the id of the socket it belongs to, so a socket that
/// has been superseded can unregister without evicting its replacement.
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<String>,
}

impl ObserverHandle {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            sender,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queue a JSON text frame for the observer. Returns false if the socket is gone.
    pub fn send(&self, text: String) -> bool {
        self.sender.send(text).is_ok()
    }
}

/// Call key to observer connection. Last registration for a key wins.
#[derive(Debug, Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<DashMap<String, ObserverHandle>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, returning the handle it replaced.
    ///
    /// The replaced handle is returned rather than dropped here so callers
    /// can decide; once it goes out of scope the old socket's queue ends.
    pub fn register(
        &self,
        call_key: &str,
        handle: ObserverHandle,
    ) -> Result<Option<ObserverHandle>, RegistryError> {
        let call_key = normalize_call_key(call_key).ok_or(RegistryError::EmptyKey)?;

        info!(call_key, connection_id = %handle.connection_id, "Observer registered");
        let previous = self.observers.insert(call_key.to_string(), handle);
        if let Some(previous) = &previous {
            debug!(
                call_key,
                connection_id = %previous.connection_id,
                "Observer replaced"
            );
        }
        Ok(previous)
    }

    /// Remove whatever observer is registered for the key.
    pub fn unregister(&self, call_key: &str) -> Option<ObserverHandle> {
        let call_key = normalize_call_key(call_key)?;
        self.observers.remove(call_key).map(|(_, handle)| handle)
    }

    /// Remove the key only if it still belongs to `connection_id`.
    pub fn unregister_connection(&self, call_key: &str, connection_id: Uuid) -> bool {
        let Some(call_key) = normalize_call_key(call_key) else {
            return false;
        };
        let removed = self
            .observers
            .remove_if(call_key, |_, handle| {
                handle.connection_id == connection_id
            })
            .is_some();
        if removed {
            info!(call_key, %connection_id, "Observer unregistered");
        }
        removed
    }

    /// Look up the observer for a call.
    pub fn get(&self, call_key: &str) -> Option<ObserverHandle> {
        let call_key = normalize_call_key(call_key)?;
        self.observers.get(call_key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, call_key: &str) -> bool {
        normalize_call_key(call_key).is_some_and(|key| self.observers.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// Call identifier to the bridge that owns it.
#[derive(Debug, Clone, Default)]
pub struct ActiveCalls {
    calls: Arc<DashMap<String, Uuid>>,
}

impl ActiveCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a call for a bridge. Re-claiming by the same bridge succeeds;
    /// a different bridge is refused while the call is held.
    pub fn claim(&self, call_id: &str, bridge_id: Uuid) -> bool {
        let entry = self.calls.entry(call_id.to_string()).or_insert(bridge_id);
        *entry.value() == bridge_id
    }

    /// Release a call, only if `bridge_id` holds it.
    pub fn release(&self, call_id: &str, bridge_id: Uuid) -> bool {
        self.calls
            .remove_if(call_id, |_, owner| *owner == bridge_id)
            .is_some()
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.calls.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
