//! OpenAI Realtime API provider.
//!
//! # Audio Format
//!
//! The session is configured for G.711 µ-law at 8kHz by default, which
//! matches telephony audio and needs no transcoding. PCM 16-bit at 24kHz is
//! also supported; the bridge codec then converts in both directions.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse, marin, cedar

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtimeConnector, OpenAISink, OpenAISource};
pub use config::{
    OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeConfig, OpenAIRealtimeModel, OpenAIRealtimeVoice,
};
pub use messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, TurnDetection};
