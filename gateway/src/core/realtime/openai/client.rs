//! OpenAI Realtime connector for the call bridge.
//!
//! Opens one WebSocket session per call, configures it with `session.update`
//! and exposes the two halves as bridge endpoints:
//!
//! - [`OpenAISource`] turns server events into bridge events. Audio deltas
//!   are bracketed by `SpeechStarted`/`SpeechStopped` per assistant item, and
//!   server VAD events are reported as caller speech.
//! - [`OpenAISink`] turns bridge commands into client events. A cancel becomes
//!   `conversation.item.truncate` (plus `response.cancel` when server VAD does
//!   not interrupt on its own).

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, trace, warn};

use super::config::OpenAIRealtimeConfig;
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, TurnDetection};
use crate::core::bridge::{
    Ack, AiConnector, BridgeError, CallSetup, ControlEvent, ControlKind, EndpointPair, Inbound, MediaSink,
    MediaSource, Outbound, Side,
};
use crate::core::codec::{self, AudioFormat, FormatError};

/// Opens OpenAI Realtime sessions for the orchestrator.
#[derive(Debug, Clone)]
pub struct OpenAIRealtimeConnector {
    config: Arc<OpenAIRealtimeConfig>,
}

impl OpenAIRealtimeConnector {
    pub fn new(config: OpenAIRealtimeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &OpenAIRealtimeConfig {
        &self.config
    }

    /// Audio format of both directions on the AI side.
    pub fn audio_format(&self) -> AudioFormat {
        self.config.audio_format.audio_format()
    }

    /// Initial session configuration sent right after connecting.
    pub fn session_config(&self, setup: &CallSetup) -> SessionConfig {
        let format = self.config.audio_format.as_str().to_string();
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: call_instructions(self.config.instructions.as_deref(), setup),
            voice: Some(self.config.voice.as_str().to_string()),
            input_audio_format: Some(format.clone()),
            output_audio_format: Some(format),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: self.config.vad_threshold,
                prefix_padding_ms: self.config.vad_prefix_padding_ms,
                silence_duration_ms: self.config.vad_silence_duration_ms,
                create_response: Some(true),
                interrupt_response: Some(self.config.interrupt_response),
            }),
            temperature: Some(self.config.temperature),
        }
    }

    fn request(&self) -> Result<http::Request<()>, BridgeError> {
        let ws_url = self.config.ws_url();
        let parsed = url::Url::parse(&ws_url)
            .map_err(|e| BridgeError::UpstreamUnavailable(format!("invalid url {ws_url}: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(BridgeError::UpstreamUnavailable(format!(
                    "url has no host: {ws_url}"
                )));
            }
        };

        http::Request::builder()
            .uri(&ws_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| BridgeError::UpstreamUnavailable(e.to_string()))
    }
}

#[async_trait]
impl AiConnector for OpenAIRealtimeConnector {
    async fn connect(&self, call_id: &str, setup: &CallSetup) -> Result<EndpointPair, BridgeError> {
        let request = self.request()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| BridgeError::UpstreamUnavailable(e.to_string()))?;
        info!(
            call_id,
            model = %self.config.model,
            objectives = setup.objectives().count(),
            "connected to OpenAI Realtime API"
        );

        let (ws_sink, ws_stream) = ws_stream.split();
        let mut sink = OpenAISink::new(ws_sink, self.config.interrupt_response);

        sink.send_event(&ClientEvent::SessionUpdate {
            session: self.session_config(setup),
        })
        .await
        .map_err(|e| BridgeError::UpstreamUnavailable(e.to_string()))?;
        if self.config.greet_on_connect {
            sink.send_event(&ClientEvent::ResponseCreate)
                .await
                .map_err(|e| BridgeError::UpstreamUnavailable(e.to_string()))?;
        }

        Ok(EndpointPair::new(
            Box::new(OpenAISource::new(ws_stream, self.audio_format())),
            Box::new(sink),
        ))
    }
}

/// Session instructions for one call. Call objectives come first and take
/// precedence over the general instructions.
pub fn call_instructions(base: Option<&str>, setup: &CallSetup) -> Option<String> {
    if setup.is_empty() {
        return base.map(str::to_string);
    }

    let objectives: Vec<String> = setup
        .objectives()
        .map(|objective| format!("- {objective}"))
        .collect();
    let mut instructions = format!(
        "PRIMARY CALL OBJECTIVES (highest priority):\n{}\n\n\
         These objectives are the purpose of this call. Open with a brief greeting, \
         then address them. Do not repeat your introduction once the caller has responded. \
         If they conflict with the general instructions, the objectives win.",
        objectives.join("\n")
    );
    if let Some(base) = base.filter(|base| !base.trim().is_empty()) {
        instructions.push_str("\n\n");
        instructions.push_str(base);
    }
    Some(instructions)
}

// =============================================================================
// Source
// =============================================================================

/// Reads server events and yields bridge events.
pub struct OpenAISource<S> {
    stream: S,
    format: AudioFormat,
    /// Events decoded from one server message but not yet returned.
    pending: VecDeque<Inbound>,
    /// Assistant item whose audio is currently streaming.
    open_item: Option<Arc<str>>,
    next_sequence: u64,
}

impl<S> OpenAISource<S> {
    pub fn new(stream: S, format: AudioFormat) -> Self {
        Self {
            stream,
            format,
            pending: VecDeque::new(),
            open_item: None,
            next_sequence: 0,
        }
    }

    fn ai_control(kind: ControlKind) -> ControlEvent {
        ControlEvent::new(kind, Side::Ai)
    }

    /// Close the open item, if any, with an optional reason.
    fn stop_open_item(&mut self, reason: Option<&str>) {
        if let Some(item) = self.open_item.take() {
            let mut event = Self::ai_control(ControlKind::SpeechStopped).with_item(Some(item));
            if let Some(reason) = reason {
                event = event.with_reason(reason);
            }
            self.pending.push_back(Inbound::Control(event));
        }
    }

    fn handle_text(&mut self, text: &str) -> Result<(), BridgeError> {
        let event: ServerEvent = serde_json::from_str(text)
            .map_err(|e| BridgeError::protocol(Side::Ai, format!("malformed event: {e}")))?;

        match event {
            ServerEvent::SessionCreated { session } => {
                self.pending.push_back(Inbound::Control(
                    Self::ai_control(ControlKind::CallStarted).with_reason(session.id),
                ));
            }
            ServerEvent::SessionUpdated { session } => {
                debug!(session_id = %session.id, "realtime session updated");
            }
            ServerEvent::AudioDelta { item_id, delta, .. } => {
                let audio = BASE64_STANDARD
                    .decode(delta.as_bytes())
                    .map_err(|e| FormatError::InvalidBase64(e.to_string()))?;
                let frame = codec::decode(Bytes::from(audio), self.format)?;

                let item: Arc<str> = match &self.open_item {
                    Some(open) if open.as_ref() == item_id => Arc::clone(open),
                    _ => {
                        self.stop_open_item(None);
                        let item: Arc<str> = Arc::from(item_id);
                        self.open_item = Some(Arc::clone(&item));
                        self.pending.push_back(Inbound::Control(
                            Self::ai_control(ControlKind::SpeechStarted)
                                .with_item(Some(Arc::clone(&item))),
                        ));
                        item
                    }
                };

                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.pending.push_back(Inbound::Audio(
                    frame.with_sequence(sequence).with_item(Some(item)),
                ));
            }
            ServerEvent::AudioDone { item_id, .. } => {
                if self.open_item.as_deref() == Some(item_id.as_str()) {
                    self.stop_open_item(None);
                }
            }
            ServerEvent::ConversationItemTruncated {
                item_id,
                audio_end_ms,
                ..
            } => {
                debug!(%item_id, audio_end_ms, "item truncated");
                if self.open_item.as_deref() == Some(item_id.as_str()) {
                    self.stop_open_item(Some("truncated"));
                }
            }
            ServerEvent::ResponseCreated { response } => {
                trace!(response_id = %response.id, "response created");
            }
            ServerEvent::ResponseDone { response } => {
                let status = response.status.unwrap_or_else(|| "completed".to_string());
                debug!(response_id = %response.id, %status, "response done");
                self.stop_open_item(Some(&status));
            }
            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                debug!(audio_start_ms, "caller speech detected");
                self.pending.push_back(Inbound::Control(ControlEvent::new(
                    ControlKind::SpeechStarted,
                    Side::Telephony,
                )));
            }
            ServerEvent::SpeechStopped { .. } => {
                self.pending.push_back(Inbound::Control(ControlEvent::new(
                    ControlKind::SpeechStopped,
                    Side::Telephony,
                )));
            }
            ServerEvent::Error { error } => {
                let reason = match &error.code {
                    Some(code) => format!("{}: {}", code, error.message),
                    None => error.message.clone(),
                };
                self.pending.push_back(Inbound::Control(
                    Self::ai_control(ControlKind::ProviderError).with_reason(reason),
                ));
            }
            ServerEvent::Unknown => {}
        }
        Ok(())
    }
}

#[async_trait]
impl<S, E> MediaSource for OpenAISource<S>
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    async fn receive_next(&mut self) -> Result<Inbound, BridgeError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }

            let Some(message) = self.stream.next().await else {
                return Ok(Inbound::Closed);
            };
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!("realtime socket error: {}", e);
                    return Err(BridgeError::ConnectionClosed(Side::Ai));
                }
            };

            match message {
                Message::Text(text) => self.handle_text(text.as_str())?,
                Message::Binary(_) => {
                    return Err(BridgeError::protocol(Side::Ai, "unexpected binary frame"));
                }
                Message::Close(frame) => {
                    debug!(?frame, "realtime socket closed");
                    return Ok(Inbound::Closed);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Writes bridge commands as client events.
pub struct OpenAISink<K> {
    sink: K,
    /// Server VAD cancels responses itself; only truncate.
    server_interrupts: bool,
}

impl<K> OpenAISink<K>
where
    K: Sink<Message> + Unpin + Send,
    K::Error: Display,
{
    pub fn new(sink: K, server_interrupts: bool) -> Self {
        Self {
            sink,
            server_interrupts,
        }
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<usize, BridgeError> {
        let json = serde_json::to_string(event)
            .map_err(|e| BridgeError::protocol(Side::Ai, e.to_string()))?;
        let bytes = json.len();
        self.sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| BridgeError::send(Side::Ai, e.to_string()))?;
        Ok(bytes)
    }
}

#[async_trait]
impl<K> MediaSink for OpenAISink<K>
where
    K: Sink<Message> + Unpin + Send,
    K::Error: Display,
{
    async fn send(&mut self, event: Outbound) -> Result<Ack, BridgeError> {
        let bytes = match event {
            Outbound::Audio(frame) => {
                self.send_event(&ClientEvent::audio_append(&frame.payload))
                    .await?
            }
            Outbound::Cancel {
                item_id,
                audio_end_ms,
            } => {
                let mut bytes = 0;
                if let Some(item_id) = item_id {
                    debug!(%item_id, audio_end_ms, "truncating assistant item");
                    bytes += self
                        .send_event(&ClientEvent::truncate(item_id.as_ref(), audio_end_ms))
                        .await?;
                }
                if !self.server_interrupts {
                    bytes += self.send_event(&ClientEvent::ResponseCancel).await?;
                }
                bytes
            }
            Outbound::Instruction(text) => {
                let bytes = self
                    .send_event(&ClientEvent::ConversationItemCreate {
                        item: ConversationItem::user_text(text),
                    })
                    .await?;
                bytes + self.send_event(&ClientEvent::ResponseCreate).await?
            }
            other => {
                return Err(BridgeError::protocol(
                    Side::Ai,
                    format!("{} is not supported by the realtime API", other.name()),
                ));
            }
        };
        Ok(Ack::new(bytes))
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        let _ = self.sink.send(Message::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| BridgeError::send(Side::Ai, e.to_string()))
    }
}
