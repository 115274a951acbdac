//! Telephony media stream framing (Twilio Media Streams JSON).

mod messages;

pub use messages::{
    CONFIG_KEY_PARAMETER, MarkPayload, MediaPayload, OutboundMedia, PLAYBACK_MARK_NAME,
    StartPayload, TelephonyError, TelephonyInbound, TelephonyInput, TelephonyOutbound,
    TelephonyRoute,
};
