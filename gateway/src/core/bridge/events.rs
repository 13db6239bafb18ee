//! Provider-neutral event model shared by every adapter.
//!
//! Adapters translate their provider's framing into [`Inbound`] values and
//! accept [`Outbound`] commands; the session never sees provider JSON.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use crate::core::codec::MediaFrame;

/// One side of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The telephony provider (the caller).
    Telephony,
    /// The realtime AI provider.
    Ai,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telephony => "telephony",
            Self::Ai => "ai",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Telephony => Self::Ai,
            Self::Ai => Self::Telephony,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of non-audio events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    CallStarted,
    CallEnded,
    SpeechStarted,
    SpeechStopped,
    ProviderError,
    /// Telephony playback acknowledgement for a mark we sent.
    PlaybackMark(String),
}

/// A control event with its originating side.
///
/// For speech events `origin` is the speaking party: caller speech detected
/// by the AI provider's VAD arrives as `SpeechStarted` from `Telephony`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub kind: ControlKind,
    pub origin: Side,
    pub reason: Option<String>,
    /// AI item the event refers to, when known.
    pub item_id: Option<Arc<str>>,
}

impl ControlEvent {
    pub fn new(kind: ControlKind, origin: Side) -> Self {
        Self {
            kind,
            origin,
            reason: None,
            item_id: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_item(mut self, item_id: Option<Arc<str>>) -> Self {
        self.item_id = item_id;
        self
    }
}

/// What a source yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Audio(MediaFrame),
    Control(ControlEvent),
    /// The underlying connection ended.
    Closed,
}

/// What a sink accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Audio(MediaFrame),
    /// Stop generating `item_id` and keep only the first `audio_end_ms`.
    Cancel {
        item_id: Option<Arc<str>>,
        audio_end_ms: u64,
    },
    /// Discard audio buffered for playback.
    Clear,
    /// Ask for a playback acknowledgement once preceding audio has played.
    Mark { name: String },
    /// Text instruction injected into the AI conversation.
    Instruction(String),
}

impl Outbound {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::Cancel { .. } => "cancel",
            Self::Clear => "clear",
            Self::Mark { .. } => "mark",
            Self::Instruction(_) => "instruction",
        }
    }
}

/// Delivery receipt returned by a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    /// Bytes written to the wire.
    pub bytes: usize,
}

impl Ack {
    pub fn new(bytes: usize) -> Self {
        Self { bytes }
    }
}
