//! Frame codec shared by both bridge directions.
//!
//! Converts between companded 8 kHz telephony audio (G.711 µ-law / A-law)
//! and linear PCM16 at the rate the AI provider expects, and re-frames the
//! result into fixed-duration frames when a frame duration is configured.
//!
//! A [`FrameCodec`] instance is owned by exactly one direction task, so it is
//! stateful but never shared.

pub mod g711;
pub mod resample;

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use resample::LinearResampler;

// =============================================================================
// Audio formats
// =============================================================================

/// Sample encoding of a media frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// G.711 µ-law, one byte per sample.
    Mulaw,
    /// G.711 A-law, one byte per sample.
    Alaw,
    /// Signed 16-bit little-endian linear PCM.
    Pcm16,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mulaw => "mulaw",
            Self::Alaw => "alaw",
            Self::Pcm16 => "pcm16",
        }
    }

    /// Parse provider spellings (`audio/x-mulaw`, `g711_ulaw`, `pcm16`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mulaw" | "ulaw" | "pcmu" | "g711_ulaw" | "audio/x-mulaw" => Some(Self::Mulaw),
            "alaw" | "pcma" | "g711_alaw" | "audio/x-alaw" => Some(Self::Alaw),
            "pcm16" | "pcm" | "linear16" | "audio/l16" => Some(Self::Pcm16),
            _ => None,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Mulaw | Self::Alaw => 1,
            Self::Pcm16 => 2,
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding plus sample rate. Always mono.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Twilio Media Streams audio: µ-law at 8 kHz.
    pub const TELEPHONY: AudioFormat = AudioFormat {
        encoding: AudioEncoding::Mulaw,
        sample_rate: 8000,
    };

    pub const fn new(encoding: AudioEncoding, sample_rate: u32) -> Self {
        Self {
            encoding,
            sample_rate,
        }
    }

    pub const fn pcm16(sample_rate: u32) -> Self {
        Self::new(AudioEncoding::Pcm16, sample_rate)
    }

    /// Playback duration of `len` payload bytes in milliseconds.
    pub fn duration_ms(&self, len: usize) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let samples = (len / self.encoding.bytes_per_sample()) as u64;
        samples * 1000 / self.sample_rate as u64
    }

    /// Payload size of a frame lasting `ms` milliseconds.
    pub fn bytes_for_ms(&self, ms: u32) -> usize {
        (self.sample_rate as usize * ms as usize / 1000) * self.encoding.bytes_per_sample()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::TELEPHONY
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}Hz", self.encoding, self.sample_rate)
    }
}

// =============================================================================
// Media frame
// =============================================================================

/// A unit of audio travelling through the bridge. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    pub payload: Bytes,
    pub format: AudioFormat,
    /// Sequence number within its direction.
    pub sequence: u64,
    /// Provider timestamp in milliseconds, when the provider supplies one.
    pub timestamp_ms: Option<u64>,
    /// AI response item this audio belongs to.
    pub item_id: Option<Arc<str>>,
}

impl MediaFrame {
    pub fn new(payload: impl Into<Bytes>, format: AudioFormat) -> Self {
        Self {
            payload: payload.into(),
            format,
            sequence: 0,
            timestamp_ms: None,
            item_id: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: Option<u64>) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_item(mut self, item_id: Option<Arc<str>>) -> Self {
        self.item_id = item_id;
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.format.duration_ms(self.payload.len())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A frame that cannot be decoded or transcoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("empty audio payload")]
    Empty,

    #[error("truncated {encoding} payload: {len} bytes")]
    Truncated { encoding: AudioEncoding, len: usize },

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedRate(u32),

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("format mismatch: codec expects {expected}, frame is {actual}")]
    Mismatch {
        expected: AudioFormat,
        actual: AudioFormat,
    },
}

// =============================================================================
// Stateless helpers
// =============================================================================

/// Validate raw provider bytes and wrap them in a frame of `format`.
pub fn decode(raw: impl Into<Bytes>, format: AudioFormat) -> Result<MediaFrame, FormatError> {
    let payload = raw.into();
    validate_payload(&payload, format)?;
    Ok(MediaFrame::new(payload, format))
}

fn validate_payload(payload: &[u8], format: AudioFormat) -> Result<(), FormatError> {
    if format.sample_rate == 0 {
        return Err(FormatError::UnsupportedRate(0));
    }
    if payload.is_empty() {
        return Err(FormatError::Empty);
    }
    if payload.len() % format.encoding.bytes_per_sample() != 0 {
        return Err(FormatError::Truncated {
            encoding: format.encoding,
            len: payload.len(),
        });
    }
    Ok(())
}

/// Expand a payload to linear samples.
pub fn to_linear(payload: &[u8], encoding: AudioEncoding) -> Vec<i16> {
    match encoding {
        AudioEncoding::Mulaw => payload.iter().map(|&b| g711::ulaw_to_linear(b)).collect(),
        AudioEncoding::Alaw => payload.iter().map(|&b| g711::alaw_to_linear(b)).collect(),
        AudioEncoding::Pcm16 => payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    }
}

/// Compress linear samples into `encoding`.
pub fn from_linear(samples: &[i16], encoding: AudioEncoding) -> Vec<u8> {
    match encoding {
        AudioEncoding::Mulaw => samples.iter().map(|&s| g711::linear_to_ulaw(s)).collect(),
        AudioEncoding::Alaw => samples.iter().map(|&s| g711::linear_to_alaw(s)).collect(),
        AudioEncoding::Pcm16 => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
    }
}

/// Root-mean-square energy of a frame on the linear 16-bit scale.
pub fn rms_energy(frame: &MediaFrame) -> f64 {
    let samples = to_linear(&frame.payload, frame.format.encoding);
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

// =============================================================================
// Stateful per-direction codec
// =============================================================================

/// Per-direction transcoder with bounded buffering.
///
/// Holds at most one sample of resampler history and less than one output
/// frame of re-framing remainder.
#[derive(Debug)]
pub struct FrameCodec {
    source: AudioFormat,
    target: AudioFormat,
    resampler: Option<LinearResampler>,
    /// Output frame size in bytes; `None` forwards whatever each input yields.
    frame_bytes: Option<usize>,
    remainder: BytesMut,
    /// Item id and timestamp of the most recent input, stamped on flushed output.
    last_item: Option<Arc<str>>,
    last_timestamp: Option<u64>,
    next_sequence: u64,
}

impl FrameCodec {
    /// Create a codec converting `source` into `target`, re-framing output
    /// into `frame_ms` frames when set.
    pub fn new(
        source: AudioFormat,
        target: AudioFormat,
        frame_ms: Option<u32>,
    ) -> Result<Self, FormatError> {
        for format in [source, target] {
            if format.sample_rate == 0 {
                return Err(FormatError::UnsupportedRate(format.sample_rate));
            }
            if format.encoding != AudioEncoding::Pcm16 && format.sample_rate != 8000 {
                // G.711 is defined at 8 kHz only
                return Err(FormatError::UnsupportedRate(format.sample_rate));
            }
        }

        let resampler = (source.sample_rate != target.sample_rate)
            .then(|| LinearResampler::new(source.sample_rate, target.sample_rate));
        let frame_bytes = frame_ms
            .filter(|ms| *ms > 0)
            .map(|ms| target.bytes_for_ms(ms))
            .filter(|bytes| *bytes > 0);

        Ok(Self {
            source,
            target,
            resampler,
            frame_bytes,
            remainder: BytesMut::new(),
            last_item: None,
            last_timestamp: None,
            next_sequence: 0,
        })
    }

    pub fn source(&self) -> AudioFormat {
        self.source
    }

    pub fn target(&self) -> AudioFormat {
        self.target
    }

    pub fn is_passthrough(&self) -> bool {
        self.source == self.target && self.frame_bytes.is_none()
    }

    /// Bytes currently held in the re-framing remainder.
    pub fn buffered(&self) -> usize {
        self.remainder.len()
    }

    /// Transcode `frame` into the codec's target format.
    ///
    /// Returns zero or more complete output frames; a partial trailing frame
    /// stays buffered until the next call or [`flush`](Self::flush).
    pub fn encode(&mut self, frame: &MediaFrame) -> Result<Vec<MediaFrame>, FormatError> {
        if frame.format != self.source {
            return Err(FormatError::Mismatch {
                expected: self.source,
                actual: frame.format,
            });
        }
        validate_payload(&frame.payload, frame.format)?;

        self.last_item = frame.item_id.clone();
        self.last_timestamp = frame.timestamp_ms;

        if self.is_passthrough() {
            return Ok(vec![self.stamp(frame.payload.clone())]);
        }

        let converted = if self.source.encoding == self.target.encoding && self.resampler.is_none()
        {
            frame.payload.clone()
        } else {
            let mut samples = to_linear(&frame.payload, self.source.encoding);
            if let Some(resampler) = self.resampler.as_mut() {
                samples = resampler.process(&samples);
            }
            Bytes::from(from_linear(&samples, self.target.encoding))
        };

        let Some(frame_bytes) = self.frame_bytes else {
            if converted.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![self.stamp(converted)]);
        };

        self.remainder.extend_from_slice(&converted);
        let mut out = Vec::with_capacity(self.remainder.len() / frame_bytes);
        while self.remainder.len() >= frame_bytes {
            let chunk = self.remainder.split_to(frame_bytes).freeze();
            out.push(self.stamp(chunk));
        }
        Ok(out)
    }

    /// Emit the partial remainder as a final short frame.
    pub fn flush(&mut self) -> Option<MediaFrame> {
        if self.remainder.is_empty() {
            return None;
        }
        let chunk = self.remainder.split().freeze();
        Some(self.stamp(chunk))
    }

    /// Discard buffered audio and resampler history.
    pub fn reset(&mut self) {
        self.remainder.clear();
        self.last_item = None;
        self.last_timestamp = None;
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    fn stamp(&mut self, payload: Bytes) -> MediaFrame {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        MediaFrame::new(payload, self.target)
            .with_sequence(sequence)
            .with_timestamp(self.last_timestamp)
            .with_item(self.last_item.clone())
    }
}
