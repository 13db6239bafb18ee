//! Twilio Media Streams WebSocket message types.
//!
//! Inbound (Twilio to us): `connected`, `start`, `media`, `mark`, `stop`,
//! `dtmf`. Outbound (us to Twilio): `media`, `clear`, `mark`.
//!
//! All numeric fields Twilio sends (`sequenceNumber`, `chunk`, `timestamp`)
//! arrive as JSON strings.

use std::collections::HashMap;

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound
// =============================================================================

/// Events received from Twilio.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },

    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartMetadata,
    },

    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },

    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        mark: MarkPayload,
    },

    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stop: Option<StopMetadata>,
    },

    Dtmf {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        dtmf: DtmfPayload,
    },

    #[serde(other)]
    Unknown,
}

/// `start.mediaFormat`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaFormat {
    /// e.g. `audio/x-mulaw`
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// `start` metadata describing the stream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartMetadata {
    pub stream_sid: String,
    pub account_sid: Option<String>,
    pub call_sid: String,
    pub tracks: Vec<String>,
    pub custom_parameters: HashMap<String, String>,
    pub media_format: MediaFormat,
}

/// `media` payload: one chunk of base64 audio.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaPayload {
    /// `inbound` or `outbound`
    pub track: Option<String>,
    pub chunk: Option<String>,
    /// Milliseconds since the stream started
    pub timestamp: Option<String>,
    pub payload: String,
}

impl MediaPayload {
    pub fn is_inbound(&self) -> bool {
        self.track.as_deref().is_none_or(|track| track == "inbound")
    }

    pub fn timestamp_ms(&self) -> Option<u64> {
        self.timestamp.as_deref().and_then(|ts| ts.parse().ok())
    }

    pub fn chunk_number(&self) -> Option<u64> {
        self.chunk.as_deref().and_then(|chunk| chunk.parse().ok())
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.payload)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StopMetadata {
    pub account_sid: Option<String>,
    pub call_sid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DtmfPayload {
    pub track: Option<String>,
    pub digit: String,
}

// =============================================================================
// Outbound
// =============================================================================

/// Commands sent to Twilio.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioCommand {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: OutboundMark,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    /// Base64 µ-law audio
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMark {
    pub name: String,
}

impl TwilioCommand {
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: BASE64_STANDARD.encode(audio),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.into(),
            mark: OutboundMark { name: name.into() },
        }
    }
}
