//! Twilio Media Streams adapter over an axum WebSocket.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use super::messages::{TwilioCommand, TwilioEvent};
use crate::core::bridge::{
    Ack, BridgeError, ControlEvent, ControlKind, EndpointPair, Inbound, MediaSink, MediaSource,
    Outbound, Side,
};
use crate::core::codec::{self, AudioEncoding, AudioFormat, FormatError};

/// Stream sid learned from `start`, shared by the source and the sink.
pub type SharedStreamSid = Arc<RwLock<Option<String>>>;

/// Split an accepted Media Streams socket into bridge endpoints. The stream
/// must announce `format` in its `start` event.
pub fn twilio_endpoints(socket: WebSocket, format: AudioFormat) -> EndpointPair {
    let (sink, stream) = socket.split();
    let stream_sid = SharedStreamSid::default();
    EndpointPair::new(
        Box::new(TwilioSource::new(stream, stream_sid.clone()).with_expected_format(format)),
        Box::new(TwilioSink::new(sink, stream_sid)),
    )
}

// =============================================================================
// Source
// =============================================================================

/// Reads Twilio events and yields bridge events.
pub struct TwilioSource<S> {
    stream: S,
    stream_sid: SharedStreamSid,
    format: AudioFormat,
    next_sequence: u64,
}

impl<S> TwilioSource<S> {
    pub fn new(stream: S, stream_sid: SharedStreamSid) -> Self {
        Self {
            stream,
            stream_sid,
            format: AudioFormat::TELEPHONY,
            next_sequence: 0,
        }
    }

    /// Format the bridge's codecs were built for. A `start` announcing any
    /// other format ends the call.
    pub fn with_expected_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Translate one text frame. `Ok(None)` means the event is ignored.
    fn parse(&mut self, text: &str) -> Result<Option<Inbound>, BridgeError> {
        let event: TwilioEvent = serde_json::from_str(text)
            .map_err(|e| BridgeError::protocol(Side::Telephony, format!("malformed event: {e}")))?;

        match event {
            TwilioEvent::Connected { protocol, .. } => {
                debug!(?protocol, "media stream connected");
                Ok(None)
            }
            TwilioEvent::Start { stream_sid, start } => {
                let sid = stream_sid.unwrap_or_else(|| start.stream_sid.clone());
                *self.stream_sid.write() = Some(sid.clone());

                let media = &start.media_format;
                if !media.encoding.is_empty() {
                    let encoding = AudioEncoding::parse(&media.encoding).ok_or_else(|| {
                        BridgeError::stream_rejected(
                            Side::Telephony,
                            format!("unsupported encoding {}", media.encoding),
                        )
                    })?;
                    let sample_rate = if media.sample_rate == 0 {
                        AudioFormat::TELEPHONY.sample_rate
                    } else {
                        media.sample_rate
                    };
                    let announced = AudioFormat::new(encoding, sample_rate);
                    if announced != self.format {
                        warn!(stream_sid = %sid, %announced, expected = %self.format, "rejecting media stream format");
                        return Err(BridgeError::stream_rejected(
                            Side::Telephony,
                            format!("stream announced {announced}, bridge expects {}", self.format),
                        ));
                    }
                }

                info!(
                    stream_sid = %sid,
                    call_sid = %start.call_sid,
                    format = %self.format,
                    "media stream started"
                );
                Ok(Some(Inbound::Control(
                    ControlEvent::new(ControlKind::CallStarted, Side::Telephony)
                        .with_reason(start.call_sid),
                )))
            }
            TwilioEvent::Media { media, .. } => {
                if !media.is_inbound() {
                    return Ok(None);
                }
                let audio = media
                    .decode()
                    .map_err(|e| FormatError::InvalidBase64(e.to_string()))?;
                let sequence = media.chunk_number().unwrap_or(self.next_sequence);
                self.next_sequence = sequence + 1;

                let frame = codec::decode(Bytes::from(audio), self.format)?
                    .with_sequence(sequence)
                    .with_timestamp(media.timestamp_ms());
                Ok(Some(Inbound::Audio(frame)))
            }
            TwilioEvent::Mark { mark, .. } => Ok(Some(Inbound::Control(ControlEvent::new(
                ControlKind::PlaybackMark(mark.name),
                Side::Telephony,
            )))),
            TwilioEvent::Stop { .. } => {
                info!("media stream stopped");
                Ok(Some(Inbound::Control(ControlEvent::new(
                    ControlKind::CallEnded,
                    Side::Telephony,
                ))))
            }
            TwilioEvent::Dtmf { dtmf, .. } => {
                debug!(digit = %dtmf.digit, "dtmf ignored");
                Ok(None)
            }
            TwilioEvent::Unknown => Err(BridgeError::protocol(Side::Telephony, "unknown event")),
        }
    }
}

#[async_trait]
impl<S, E> MediaSource for TwilioSource<S>
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    async fn receive_next(&mut self) -> Result<Inbound, BridgeError> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(Inbound::Closed);
            };
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!("telephony socket error: {}", e);
                    return Err(BridgeError::ConnectionClosed(Side::Telephony));
                }
            };

            match message {
                Message::Text(text) => {
                    if let Some(event) = self.parse(text.as_str())? {
                        return Ok(event);
                    }
                }
                Message::Binary(_) => {
                    return Err(BridgeError::protocol(Side::Telephony, "unexpected binary frame"));
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    debug!(?frame, "telephony socket closed");
                    return Ok(Inbound::Closed);
                }
            }
        }
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Writes bridge commands as Twilio events.
pub struct TwilioSink<K> {
    sink: K,
    stream_sid: SharedStreamSid,
}

impl<K> TwilioSink<K> {
    pub fn new(sink: K, stream_sid: SharedStreamSid) -> Self {
        Self { sink, stream_sid }
    }

    fn stream_sid(&self) -> Result<String, BridgeError> {
        self.stream_sid
            .read()
            .clone()
            .ok_or_else(|| BridgeError::protocol(Side::Telephony, "media stream not started"))
    }
}

#[async_trait]
impl<K> MediaSink for TwilioSink<K>
where
    K: Sink<Message> + Unpin + Send,
    K::Error: Display,
{
    async fn send(&mut self, event: Outbound) -> Result<Ack, BridgeError> {
        let stream_sid = self.stream_sid()?;
        let command = match event {
            Outbound::Audio(frame) => TwilioCommand::media(stream_sid, &frame.payload),
            Outbound::Clear => TwilioCommand::clear(stream_sid),
            Outbound::Mark { name } => TwilioCommand::mark(stream_sid, name),
            other => {
                return Err(BridgeError::protocol(
                    Side::Telephony,
                    format!("{} is not supported by media streams", other.name()),
                ));
            }
        };

        let json = serde_json::to_string(&command)
            .map_err(|e| BridgeError::protocol(Side::Telephony, e.to_string()))?;
        let bytes = json.len();
        trace!(bytes, "sending to telephony");
        self.sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| BridgeError::send(Side::Telephony, e.to_string()))?;
        Ok(Ack::new(bytes))
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| BridgeError::send(Side::Telephony, e.to_string()))
    }
}
