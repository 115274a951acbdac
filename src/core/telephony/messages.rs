//! Telephony media stream frame types.
//!
//! Inbound frames arrive as JSON text tagged by `event`:
//! `connected`, `start`, `media`, `mark`, `stop`. The relay answers with
//! `media`, `mark` and `clear` frames addressed to the call's `streamSid`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::registry::normalize_call_key;

/// Name of every playback mark the relay sends.
pub const PLAYBACK_MARK_NAME: &str = "responsePart";

/// Custom parameter carrying the prompt configuration key.
pub const CONFIG_KEY_PARAMETER: &str = "blueprintPIN";

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("Invalid telephony frame: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// Inbound Frames (telephony -> relay)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyInbound {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        start: StartPayload,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    Stop {
        #[serde(default)]
        stop: Option<serde_json::Value>,
    },
    #[serde(other)]
    Other,
}

impl TelephonyInbound {
    pub fn parse(text: &str) -> Result<Self, TelephonyError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartPayload {
    /// The normalized prompt configuration key, when the caller supplied one.
    pub fn config_key(&self) -> Option<&str> {
        self.custom_parameters
            .get(CONFIG_KEY_PARAMETER)
            .and_then(|key| normalize_call_key(key))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Milliseconds since the stream started
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
    /// Base64 G.711 u-law audio
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

/// Media timestamps are sent as decimal strings but numbers are accepted too.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Integer(u64),
        Float(f64),
        Text(String),
    }

    fn from_float<E: serde::de::Error>(value: f64) -> Result<u64, E> {
        if value.is_finite() && value >= 0.0 {
            Ok(value as u64)
        } else {
            Err(E::custom(format!("invalid media timestamp {value}")))
        }
    }

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Integer(value) => Ok(value),
        RawTimestamp::Float(value) => from_float(value),
        RawTimestamp::Text(text) => {
            let text = text.trim();
            match text.parse::<u64>() {
                Ok(value) => Ok(value),
                Err(_) => text
                    .parse::<f64>()
                    .map_err(|_| serde::de::Error::custom(format!("invalid media timestamp {text:?}")))
                    .and_then(from_float),
            }
        }
    }
}

// =============================================================================
// Outbound Frames (relay -> telephony)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    /// Flush audio the telephony side has buffered but not yet played
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TelephonyOutbound {
    pub fn media(stream_sid: &str, payload: impl Into<String>) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn playback_mark(stream_sid: &str) -> Self {
        TelephonyOutbound::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkPayload {
                name: PLAYBACK_MARK_NAME.to_string(),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        TelephonyOutbound::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }
}

/// Work items for the telephony socket's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyRoute {
    Frame(TelephonyOutbound),
    Close,
}

/// What the call driver reads from the telephony socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyInput {
    Text(String),
    Closed,
}
