//! Bridge tuning knobs.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::playout::{PlaybackMarks, TruncationPolicy, WallClock};
use crate::core::codec::AudioFormat;

/// What counts as the caller starting to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionTrigger {
    /// The AI provider's voice activity detection.
    #[default]
    ProviderVad,
    /// Local RMS energy over consecutive caller frames.
    CallerEnergy,
    /// Whichever fires first.
    Any,
}

impl InterruptionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderVad => "provider_vad",
            Self::CallerEnergy => "caller_energy",
            Self::Any => "any",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "provider_vad" | "vad" => Some(Self::ProviderVad),
            "caller_energy" | "energy" => Some(Self::CallerEnergy),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    pub fn uses_provider_vad(&self) -> bool {
        matches!(self, Self::ProviderVad | Self::Any)
    }

    pub fn uses_caller_energy(&self) -> bool {
        matches!(self, Self::CallerEnergy | Self::Any)
    }
}

/// How the played duration of an interrupted item is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationMode {
    WallClock,
    #[default]
    PlaybackMarks,
}

impl TruncationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WallClock => "wall_clock",
            Self::PlaybackMarks => "playback_marks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "wall_clock" | "wallclock" => Some(Self::WallClock),
            "playback_marks" | "marks" => Some(Self::PlaybackMarks),
            _ => None,
        }
    }

    pub fn policy(&self) -> Arc<dyn TruncationPolicy> {
        match self {
            Self::WallClock => Arc::new(WallClock),
            Self::PlaybackMarks => Arc::new(PlaybackMarks),
        }
    }
}

/// Per-call bridge behaviour shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Deadline for the AI connection to open.
    pub connect_timeout_ms: u64,
    pub max_call_duration_secs: u64,
    /// Time after which `Interrupting` returns to `Active` on its own.
    pub interruption_grace_ms: u64,
    /// Consecutive undecodable frames on one side before the call is closed.
    pub max_consecutive_frame_errors: u32,
    /// Caller frames buffered while the AI side is still connecting.
    pub max_pending_upstream_frames: usize,
    pub interruption_trigger: InterruptionTrigger,
    /// RMS level (linear 16-bit scale) treated as caller speech.
    pub energy_threshold: f64,
    /// Consecutive loud frames required before energy counts as speech.
    pub energy_min_frames: u32,
    pub truncation: TruncationMode,
    pub telephony_format: AudioFormat,
    pub ai_format: AudioFormat,
    /// Re-frame AI audio into frames of this duration; 0 forwards as received.
    pub telephony_frame_ms: u32,
    /// Follow each forwarded chunk with a telephony playback mark.
    pub playback_marks: bool,
    /// Admission limit; `None` is unlimited.
    pub max_concurrent_calls: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            max_call_duration_secs: 3600,
            interruption_grace_ms: 500,
            max_consecutive_frame_errors: 10,
            max_pending_upstream_frames: 500,
            interruption_trigger: InterruptionTrigger::default(),
            energy_threshold: 1500.0,
            energy_min_frames: 3,
            truncation: TruncationMode::default(),
            telephony_format: AudioFormat::TELEPHONY,
            ai_format: AudioFormat::TELEPHONY,
            telephony_frame_ms: 20,
            playback_marks: true,
            max_concurrent_calls: None,
        }
    }
}

impl BridgeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn max_call_duration(&self) -> Duration {
        Duration::from_secs(self.max_call_duration_secs)
    }

    pub fn interruption_grace(&self) -> Duration {
        Duration::from_millis(self.interruption_grace_ms)
    }

    /// Downstream re-framing duration, if enabled.
    pub fn telephony_frame(&self) -> Option<u32> {
        (self.telephony_frame_ms > 0).then_some(self.telephony_frame_ms)
    }
}
