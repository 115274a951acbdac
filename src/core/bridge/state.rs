//! Per-call state records.

use std::collections::VecDeque;
use std::fmt;

use crate::core::prompt::PromptConfig;
use crate::core::realtime::UpstreamState;
use crate::core::telephony::PLAYBACK_MARK_NAME;

/// Unacknowledged marks past which a stalled telephony side is reported.
pub const PENDING_MARK_BACKLOG: usize = 256;

/// Lifecycle of a call bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// Telephony socket accepted, upstream connect not yet requested
    #[default]
    Idle,
    /// Upstream connecting, or open and waiting for the configuration key
    AwaitingUpstreamOpen,
    /// Prompt configuration requested, session not yet configured
    ConfiguringSession,
    /// Steady-state relay
    Active,
    /// Terminal
    Closed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Idle => write!(f, "Idle"),
            BridgeState::AwaitingUpstreamOpen => write!(f, "AwaitingUpstreamOpen"),
            BridgeState::ConfiguringSession => write!(f, "ConfiguringSession"),
            BridgeState::Active => write!(f, "Active"),
            BridgeState::Closed => write!(f, "Closed"),
        }
    }
}

/// Where the caller is in hearing the assistant's current response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub last_assistant_item_id: Option<String>,
    /// Marks sent to telephony and not yet acknowledged, oldest first
    pub pending_marks: VecDeque<String>,
    /// Inbound media timestamp when the current response started playing
    pub response_start_timestamp_ms: Option<u64>,
    /// Set once the mark backlog has been reported, until the next reset
    pub backlog_reported: bool,
}

/// A barge-in that needs the assistant item truncated and playback cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    /// Audio of the current response the caller actually heard
    pub elapsed_ms: u64,
    pub item_id: Option<String>,
}

impl PlaybackState {
    /// Record an outgoing audio delta.
    pub fn record_delta(&mut self, item_id: Option<&str>, latest_media_timestamp_ms: u64) {
        if self.response_start_timestamp_ms.is_none() {
            self.response_start_timestamp_ms = Some(latest_media_timestamp_ms);
        }
        if let Some(item_id) = item_id {
            self.last_assistant_item_id = Some(item_id.to_string());
        }
    }

    /// Queue a mark. Returns true the first time the queue reaches
    /// [`PENDING_MARK_BACKLOG`] since the last reset.
    pub fn push_mark(&mut self) -> bool {
        self.pending_marks.push_back(PLAYBACK_MARK_NAME.to_string());
        if self.backlog_reported || self.pending_marks.len() < PENDING_MARK_BACKLOG {
            return false;
        }
        self.backlog_reported = true;
        true
    }

    /// Acknowledge the oldest mark. No-op on an empty queue.
    pub fn ack_mark(&mut self) -> Option<String> {
        self.pending_marks.pop_front()
    }

    /// Compute the interruption for a caller who started speaking, and reset.
    ///
    /// Returns `None` (and leaves state untouched) unless audio is still
    /// queued on the telephony side and a response start was recorded.
    pub fn interrupt(&mut self, latest_media_timestamp_ms: u64) -> Option<Interruption> {
        if self.pending_marks.is_empty() {
            return None;
        }
        let start = self.response_start_timestamp_ms?;
        let interruption = Interruption {
            elapsed_ms: latest_media_timestamp_ms.saturating_sub(start),
            item_id: self.last_assistant_item_id.clone(),
        };
        self.reset();
        Some(interruption)
    }

    pub fn reset(&mut self) {
        self.pending_marks.clear();
        self.last_assistant_item_id = None;
        self.response_start_timestamp_ms = None;
        self.backlog_reported = false;
    }
}

/// Everything a bridge knows about its call.
#[derive(Debug, Clone, Default)]
pub struct CallSession {
    /// Telephony stream identifier, fixed by the first `start` frame
    pub call_id: Option<String>,
    /// Prompt configuration key; observers subscribe under it
    pub config_key: Option<String>,
    pub latest_media_timestamp_ms: u64,
    pub playback: PlaybackState,
    pub prompt_config: Option<PromptConfig>,
    pub upstream_state: UpstreamState,
}

impl CallSession {
    /// Key that audit events are published under.
    pub fn audit_key(&self) -> Option<&str> {
        self.config_key.as_deref().or(self.call_id.as_deref())
    }

    /// Advance the media clock; it never moves backwards.
    pub fn observe_media_timestamp(&mut self, timestamp_ms: u64) {
        self.latest_media_timestamp_ms = self.latest_media_timestamp_ms.max(timestamp_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delta_sets_response_start() {
        let mut playback = PlaybackState::default();
        playback.record_delta(Some("item1"), 500);
        playback.record_delta(None, 900);
        assert_eq!(playback.response_start_timestamp_ms, Some(500));
        assert_eq!(playback.last_assistant_item_id.as_deref(), Some("item1"));
    }

    #[test]
    fn test_interrupt_computes_elapsed_and_resets() {
        let mut playback = PlaybackState::default();
        playback.record_delta(Some("item1"), 1000);
        playback.push_mark();
        playback.push_mark();

        let interruption = playback.interrupt(2500).unwrap();
        assert_eq!(interruption.elapsed_ms, 1500);
        assert_eq!(interruption.item_id.as_deref(), Some("item1"));
        assert_eq!(playback, PlaybackState::default());
    }

    #[test]
    fn test_interrupt_requires_pending_marks() {
        let mut playback = PlaybackState::default();
        playback.record_delta(Some("item1"), 1000);
        assert!(playback.interrupt(2000).is_none());
        assert_eq!(playback.last_assistant_item_id.as_deref(), Some("item1"));
    }

    #[test]
    fn test_interrupt_requires_response_start() {
        let mut playback = PlaybackState::default();
        playback.push_mark();
        assert!(playback.interrupt(2000).is_none());
        assert_eq!(playback.pending_marks.len(), 1);
    }

    #[test]
    fn test_ack_mark_on_empty_queue() {
        let mut playback = PlaybackState::default();
        assert!(playback.ack_mark().is_none());
        playback.push_mark();
        assert_eq!(playback.ack_mark().as_deref(), Some(PLAYBACK_MARK_NAME));
        assert!(playback.pending_marks.is_empty());
    }

    #[test]
    fn test_mark_backlog_is_reported_once() {
        let mut playback = PlaybackState::default();
        let reported: Vec<usize> = (1..=PENDING_MARK_BACKLOG * 2)
            .filter(|_| playback.push_mark())
            .collect();
        assert_eq!(reported, vec![PENDING_MARK_BACKLOG]);

        // Hovering around the threshold does not report again.
        playback.ack_mark();
        assert!(!playback.push_mark());

        playback.reset();
        let reported = (1..=PENDING_MARK_BACKLOG).filter(|_| playback.push_mark()).count();
        assert_eq!(reported, 1);
    }

    #[test]
    fn test_media_clock_is_monotonic() {
        let mut session = CallSession::default();
        session.observe_media_timestamp(500);
        session.observe_media_timestamp(300);
        assert_eq!(session.latest_media_timestamp_ms, 500);
    }

    #[test]
    fn test_audit_key_falls_back_to_call_id() {
        let mut session = CallSession::default();
        assert_eq!(session.audit_key(), None);
        session.call_id = Some("MZ1".to_string());
        assert_eq!(session.audit_key(), Some("MZ1"));
        session.config_key = Some("123".to_string());
        assert_eq!(session.audit_key(), Some("123"));
    }
}
