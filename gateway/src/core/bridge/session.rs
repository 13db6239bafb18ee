//! Per-call session state machine.
//!
//! A [`CallSession`] is shared by the call's supervisor and its two direction
//! tasks. Every state change goes through [`CallSession::transition`], which
//! validates it against the transition table under one mutex and publishes the
//! new state on a watch channel.
//!
//! `Connecting` ends when the AI connector returns: it has already completed
//! the WebSocket handshake and sent the session configuration, so the
//! provider's `CallStarted` acknowledgment is only logged. Audio sent before
//! that acknowledgment is buffered by the provider.
//!
//! Locking order: telephony endpoint, then AI endpoint, then the lifecycle,
//! playout and response mutexes (never held across an `.await`).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::{Endpoint, MediaSink};
use super::config::BridgeConfig;
use super::error::BridgeError;
use super::events::{ControlEvent, ControlKind, MediaFrame, Outbound, Side};
use super::playout::{PlayoutTracker, TruncationPolicy};

/// Cancelled item ids remembered for dropping late chunks.
const CANCELLED_ITEMS_RETAINED: usize = 32;

// =============================================================================
// States
// =============================================================================

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Connecting,
    Active,
    AIResponding,
    Interrupting,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Active => "Active",
            Self::AIResponding => "AIResponding",
            Self::Interrupting => "Interrupting",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        }
    }

    /// The transition table.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Closing)
                | (Active, AIResponding)
                | (Active, Closing)
                | (AIResponding, Interrupting)
                | (AIResponding, Active)
                | (AIResponding, Closing)
                | (Interrupting, Active)
                | (Interrupting, Closing)
                | (Closing, Closed)
        )
    }

    /// `Closing` or `Closed`.
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call ended. The first reason recorded wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    CallEnded(Side),
    ConnectionClosed(Side),
    SendFailed(Side),
    UpstreamUnavailable(String),
    ProtocolError(Side),
    MaxDuration,
    Shutdown,
}

impl CloseReason {
    /// Map a fatal error to a close reason, using `fallback` when the error
    /// carries no side.
    pub fn from_error(err: &BridgeError, fallback: Side) -> Self {
        match err {
            BridgeError::ConnectionClosed(side) => Self::ConnectionClosed(*side),
            BridgeError::Send { side, .. } => Self::SendFailed(*side),
            BridgeError::Protocol { side, .. } | BridgeError::StreamRejected { side, .. } => {
                Self::ProtocolError(*side)
            }
            BridgeError::Format(_) => Self::ProtocolError(fallback),
            BridgeError::UpstreamUnavailable(message) => Self::UpstreamUnavailable(message.clone()),
            _ => Self::ConnectionClosed(fallback),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallEnded(side) => write!(f, "call ended by {side}"),
            Self::ConnectionClosed(side) => write!(f, "{side} connection closed"),
            Self::SendFailed(side) => write!(f, "send to {side} failed"),
            Self::UpstreamUnavailable(message) => write!(f, "AI unavailable: {message}"),
            Self::ProtocolError(side) => write!(f, "too many {side} protocol errors"),
            Self::MaxDuration => f.write_str("max call duration reached"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Audio direction through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Telephony to AI.
    Upstream,
    /// AI to telephony.
    Downstream,
}

impl Direction {
    /// The side frames in this direction come from.
    pub fn source_side(&self) -> Side {
        match self {
            Self::Upstream => Side::Telephony,
            Self::Downstream => Side::Ai,
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Upstream => 0,
            Self::Downstream => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => f.write_str("upstream"),
            Self::Downstream => f.write_str("downstream"),
        }
    }
}

// =============================================================================
// Cursors and summaries
// =============================================================================

/// Monotonic byte and frame counters for one direction.
#[derive(Debug, Default)]
pub struct AudioCursor {
    bytes: AtomicU64,
    frames: AtomicU64,
}

impl AudioCursor {
    /// Count one forwarded frame; returns its zero-based index.
    fn advance(&self, bytes: usize) -> u64 {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        CursorSnapshot {
            bytes: self.bytes.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CursorSnapshot {
    pub bytes: u64,
    pub frames: u64,
}

/// A recorded state change, timestamped from session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub state: SessionState,
    pub at_ms: u64,
}

/// Published once per call when it reaches `Closed`.
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub reason: CloseReason,
    pub duration: Duration,
    pub upstream: CursorSnapshot,
    pub downstream: CursorSnapshot,
    pub history: Vec<StateChange>,
}

// =============================================================================
// Session
// =============================================================================

struct Lifecycle {
    state: SessionState,
    history: Vec<StateChange>,
    close_reason: Option<CloseReason>,
}

#[derive(Default)]
struct ResponseTracker {
    /// AI item currently being generated.
    current_item: Option<Arc<str>>,
    /// The AI finished generating the current item.
    generation_done: bool,
    cancelled: VecDeque<Arc<str>>,
    /// Bumped on every interruption so stale grace timers are ignored.
    epoch: u64,
}

impl ResponseTracker {
    fn is_cancelled(&self, item: &str) -> bool {
        self.cancelled.iter().any(|cancelled| &**cancelled == item)
    }

    fn cancel(&mut self, item: Arc<str>) {
        if self.is_cancelled(&item) {
            return;
        }
        if self.cancelled.len() >= CANCELLED_ITEMS_RETAINED {
            self.cancelled.pop_front();
        }
        self.cancelled.push_back(item);
    }
}

/// The single pending wall-clock playback check.
struct PlaybackTimer {
    until: Instant,
    handle: JoinHandle<()>,
    /// Timers armed over the call, for diagnostics.
    armed: u64,
}

/// One bridged call.
pub struct CallSession {
    call_id: String,
    config: Arc<BridgeConfig>,
    policy: Arc<dyn TruncationPolicy>,
    created_at: Instant,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    telephony: Endpoint,
    ai: Endpoint,
    upstream: AudioCursor,
    downstream: AudioCursor,
    playout: Mutex<PlayoutTracker>,
    response: Mutex<ResponseTracker>,
    playback_timer: Mutex<Option<PlaybackTimer>>,
    /// Bumped on interruption; the downstream task resets its codec on change.
    codec_epoch: AtomicU64,
    frame_errors: [AtomicU32; 2],
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("call_id", &self.call_id)
            .field("state", &self.state())
            .finish()
    }
}

impl CallSession {
    /// Create a `Connecting` session holding the telephony write half.
    pub fn new(
        call_id: impl Into<String>,
        config: Arc<BridgeConfig>,
        telephony: Box<dyn MediaSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        let policy = config.truncation.policy();
        let ai = Endpoint::pending(Side::Ai, config.max_pending_upstream_frames);

        Self {
            call_id: call_id.into(),
            policy,
            created_at: Instant::now(),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Connecting,
                history: vec![StateChange {
                    state: SessionState::Connecting,
                    at_ms: 0,
                }],
                close_reason: None,
            }),
            state_tx,
            cancel: CancellationToken::new(),
            telephony: Endpoint::attached(Side::Telephony, telephony),
            ai,
            upstream: AudioCursor::default(),
            downstream: AudioCursor::default(),
            playout: Mutex::new(PlayoutTracker::new()),
            response: Mutex::new(ResponseTracker::default()),
            playback_timer: Mutex::new(None),
            codec_epoch: AtomicU64::new(0),
            frame_errors: [AtomicU32::new(0), AtomicU32::new(0)],
            config,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    pub fn is_closing(&self) -> bool {
        self.state().is_closing()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn history(&self) -> Vec<StateChange> {
        self.lifecycle.lock().history.clone()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().close_reason.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn upstream_cursor(&self) -> CursorSnapshot {
        self.upstream.snapshot()
    }

    pub fn downstream_cursor(&self) -> CursorSnapshot {
        self.downstream.snapshot()
    }

    /// Chunks sent to telephony and not yet known to be played.
    pub fn playout_len(&self) -> usize {
        self.playout.lock().len()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// The single mutation point for the session state.
    pub fn transition(&self, to: SessionState) -> Result<SessionState, BridgeError> {
        let mut lifecycle = self.lifecycle.lock();
        self.apply_transition(&mut lifecycle, to)
    }

    fn apply_transition(
        &self,
        lifecycle: &mut Lifecycle,
        to: SessionState,
    ) -> Result<SessionState, BridgeError> {
        let from = lifecycle.state;
        if !from.can_transition_to(to) {
            return Err(BridgeError::InvalidTransition { from, to });
        }
        lifecycle.state = to;
        lifecycle.history.push(StateChange {
            state: to,
            at_ms: self.created_at.elapsed().as_millis() as u64,
        });
        self.state_tx.send_replace(to);
        info!(call_id = %self.call_id, %from, %to, "session transition");
        Ok(from)
    }

    /// Move to `Closing` and cancel both direction tasks.
    ///
    /// Returns `true` for the call that initiated the close.
    pub fn begin_close(&self, reason: CloseReason) -> bool {
        let initiated = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state.is_closing() {
                false
            } else {
                lifecycle.close_reason.get_or_insert_with(|| reason.clone());
                self.apply_transition(&mut lifecycle, SessionState::Closing)
                    .is_ok()
            }
        };
        if initiated {
            info!(call_id = %self.call_id, %reason, "closing session");
        }
        self.cancel.cancel();
        initiated
    }

    /// `Closing` to `Closed`. Succeeds exactly once.
    pub(crate) fn finish_close(&self) -> Result<CallSummary, BridgeError> {
        let (reason, history) = {
            let mut lifecycle = self.lifecycle.lock();
            self.apply_transition(&mut lifecycle, SessionState::Closed)?;
            let reason = lifecycle
                .close_reason
                .clone()
                .unwrap_or(CloseReason::Shutdown);
            (reason, lifecycle.history.clone())
        };

        Ok(CallSummary {
            call_id: self.call_id.clone(),
            reason,
            duration: self.elapsed(),
            upstream: self.upstream.snapshot(),
            downstream: self.downstream.snapshot(),
            history,
        })
    }

    // -------------------------------------------------------------------------
    // Endpoints
    // -------------------------------------------------------------------------

    /// Hand the AI write half to the session and go `Active`.
    ///
    /// Audio queued while connecting is flushed first; if the session starts
    /// closing meanwhile the rest of the queue is dropped and the sink closed.
    pub(crate) async fn attach_ai(&self, sink: Box<dyn MediaSink>) -> Result<(), BridgeError> {
        let flushed = self.ai.attach(sink, || self.is_closing()).await?;
        self.transition(SessionState::Active)?;
        info!(call_id = %self.call_id, flushed, "AI connected");
        Ok(())
    }

    /// Close whatever endpoints are still held. Returns which were released
    /// by this call as `(telephony, ai)`.
    pub(crate) async fn release_endpoints(&self) -> (bool, bool) {
        let telephony = self.telephony.release().await;
        let ai = self.ai.release().await;
        debug!(call_id = %self.call_id, telephony, ai, "endpoints released");
        (telephony, ai)
    }

    // -------------------------------------------------------------------------
    // Forwarding
    // -------------------------------------------------------------------------

    /// Forward encoded caller audio to the AI, queueing while it connects.
    pub(crate) async fn forward_upstream(&self, frames: Vec<MediaFrame>) -> Result<(), BridgeError> {
        if frames.is_empty() {
            return Ok(());
        }
        let mut ai = self.ai.lock().await;
        for frame in frames {
            if self.is_closing() {
                break;
            }
            let len = frame.len();
            ai.send(Outbound::Audio(frame)).await?;
            self.upstream.advance(len);
        }
        Ok(())
    }

    /// Whether AI audio of `item` may reach the caller right now.
    pub fn accepts_ai_audio(&self, item: Option<&Arc<str>>) -> bool {
        match self.state() {
            SessionState::Active | SessionState::AIResponding => {}
            _ => return false,
        }
        match item {
            Some(item) => !self.response.lock().is_cancelled(item),
            None => true,
        }
    }

    /// Forward encoded AI audio to telephony, recording each chunk for
    /// playout tracking.
    pub(crate) async fn forward_downstream(
        self: &Arc<Self>,
        frames: Vec<MediaFrame>,
    ) -> Result<(), BridgeError> {
        let Some(first) = frames.first() else {
            return Ok(());
        };
        if self.state() == SessionState::Active && self.accepts_ai_audio(first.item_id.as_ref()) {
            self.start_response(first.item_id.clone());
        }

        // Holding the telephony lock orders these sends against `interrupt`.
        let mut telephony = self.telephony.lock().await;
        for frame in frames {
            if !self.accepts_ai_audio(frame.item_id.as_ref()) {
                debug!(call_id = %self.call_id, seq = frame.sequence, "dropping AI audio");
                continue;
            }
            let len = frame.len();
            let duration_ms = frame.duration_ms();
            let item = frame.item_id.clone();

            telephony.send(Outbound::Audio(frame)).await?;
            let seq = self.downstream.advance(len);
            self.playout
                .lock()
                .record_sent(seq, item, duration_ms, Instant::now());

            if self.config.playback_marks {
                telephony
                    .send(Outbound::Mark {
                        name: seq.to_string(),
                    })
                    .await?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Control events
    // -------------------------------------------------------------------------

    pub async fn handle_control(self: &Arc<Self>, event: ControlEvent) -> Result<(), BridgeError> {
        match (&event.kind, event.origin) {
            (ControlKind::CallStarted, side) => {
                info!(call_id = %self.call_id, %side, detail = ?event.reason, "provider session started");
            }
            (ControlKind::CallEnded, side) => {
                self.begin_close(CloseReason::CallEnded(side));
            }
            (ControlKind::SpeechStarted, Side::Telephony) => {
                if self.config.interruption_trigger.uses_provider_vad() {
                    self.on_caller_speech("provider_vad").await?;
                }
            }
            (ControlKind::SpeechStarted, Side::Ai) => {
                self.start_response(event.item_id.clone());
            }
            (ControlKind::SpeechStopped, Side::Ai) => {
                self.finish_generation(event.item_id.as_ref(), event.reason.as_deref());
            }
            (ControlKind::SpeechStopped, Side::Telephony) => {
                debug!(call_id = %self.call_id, "caller stopped speaking");
            }
            (ControlKind::ProviderError, side) => {
                warn!(call_id = %self.call_id, %side, reason = ?event.reason, "provider reported an error");
            }
            (ControlKind::PlaybackMark(name), _) => {
                self.acknowledge_mark(name);
            }
        }
        Ok(())
    }

    fn start_response(self: &Arc<Self>, item: Option<Arc<str>>) {
        let state = self.state();
        if state == SessionState::Interrupting {
            let cancelled = item
                .as_ref()
                .is_some_and(|item| self.response.lock().is_cancelled(item));
            if cancelled || item.is_none() {
                return;
            }
            // a fresh item means the interruption is over
            if self.transition(SessionState::Active).is_err() {
                return;
            }
        } else if state.is_closing() || state == SessionState::Connecting {
            return;
        }

        if self.state() == SessionState::Active
            && self.transition(SessionState::AIResponding).is_err()
        {
            return;
        }

        let mut response = self.response.lock();
        response.current_item = item;
        response.generation_done = false;
    }

    fn finish_generation(self: &Arc<Self>, item: Option<&Arc<str>>, reason: Option<&str>) {
        match self.state() {
            SessionState::Interrupting => {
                debug!(call_id = %self.call_id, ?reason, "AI audio stopped, interruption over");
                let _ = self.transition(SessionState::Active);
            }
            SessionState::AIResponding => {
                {
                    let mut response = self.response.lock();
                    let stale = matches!(
                        (item, response.current_item.as_ref()),
                        (Some(stopped), Some(current)) if stopped != current
                    );
                    if stale {
                        return;
                    }
                    response.generation_done = true;
                }
                self.check_response_finished();
            }
            _ => {}
        }
    }

    fn acknowledge_mark(self: &Arc<Self>, name: &str) {
        let Ok(sequence) = name.parse::<u64>() else {
            debug!(call_id = %self.call_id, mark = name, "ignoring foreign mark");
            return;
        };
        let acked = self.playout.lock().acknowledge(sequence, Instant::now());
        if acked > 0 {
            self.check_response_finished();
        }
    }

    /// `AIResponding` to `Active` once generation is done and playout drained.
    fn check_response_finished(self: &Arc<Self>) {
        if self.state() != SessionState::AIResponding {
            return;
        }
        let generation_done = self.response.lock().generation_done;
        if !generation_done {
            return;
        }

        let pending_until = {
            let mut playout = self.playout.lock();
            if !self.config.playback_marks {
                playout.drain_elapsed(Instant::now());
            }
            if playout.is_empty() {
                None
            } else {
                playout.playback_end()
            }
        };

        match pending_until {
            None => {
                let _ = self.transition(SessionState::Active);
            }
            Some(end) if !self.config.playback_marks => self.arm_playback_timer(end),
            Some(_) => {}
        }
    }

    /// Re-check the response at `end`. An armed timer that fires no earlier
    /// than `end` is kept; an earlier one is replaced.
    fn arm_playback_timer(self: &Arc<Self>, end: Instant) {
        let mut timer = self.playback_timer.lock();
        let armed = match timer.as_ref() {
            Some(current) if !current.handle.is_finished() && current.until >= end => return,
            Some(current) => {
                current.handle.abort();
                current.armed
            }
            None => 0,
        };

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = session.cancel.cancelled() => {}
                _ = tokio::time::sleep_until(end) => session.check_response_finished(),
            }
        });
        debug!(call_id = %self.call_id, armed = armed + 1, "playback timer armed");
        *timer = Some(PlaybackTimer {
            until: end,
            handle,
            armed: armed + 1,
        });
    }

    #[cfg(test)]
    fn playback_timers_armed(&self) -> u64 {
        self.playback_timer.lock().as_ref().map_or(0, |timer| timer.armed)
    }

    // -------------------------------------------------------------------------
    // Interruption
    // -------------------------------------------------------------------------

    /// Caller speech detected by `trigger`. Returns whether an interruption
    /// was performed.
    pub async fn on_caller_speech(self: &Arc<Self>, trigger: &'static str) -> Result<bool, BridgeError> {
        match self.state() {
            SessionState::AIResponding => {}
            SessionState::Interrupting => {
                debug!(call_id = %self.call_id, trigger, "already interrupting");
                return Ok(false);
            }
            _ => return Ok(false),
        }

        let fully_played = {
            let mut playout = self.playout.lock();
            if !self.config.playback_marks {
                playout.drain_elapsed(Instant::now());
            }
            playout.is_empty() && self.response.lock().generation_done
        };
        if fully_played {
            let _ = self.transition(SessionState::Active);
            return Ok(false);
        }

        self.interrupt(trigger).await
    }

    async fn interrupt(self: &Arc<Self>, trigger: &'static str) -> Result<bool, BridgeError> {
        let mut telephony = self.telephony.lock().await;
        if let Err(e) = self.transition(SessionState::Interrupting) {
            debug!(call_id = %self.call_id, "interruption skipped: {}", e);
            return Ok(false);
        }

        let (item, audio_end_ms, discarded) = {
            let mut playout = self.playout.lock();
            let played = self
                .policy
                .played_ms(&playout, Instant::now())
                .min(playout.item_sent_ms());
            let item = playout
                .current_item()
                .or_else(|| self.response.lock().current_item.clone());
            (item, played, playout.clear())
        };

        let epoch = {
            let mut response = self.response.lock();
            if let Some(item) = item.clone() {
                response.cancel(item);
            }
            response.current_item = None;
            response.generation_done = false;
            response.epoch += 1;
            response.epoch
        };
        self.codec_epoch.fetch_add(1, Ordering::AcqRel);

        info!(
            call_id = %self.call_id,
            trigger,
            item = ?item.as_deref(),
            audio_end_ms,
            discarded,
            policy = self.policy.name(),
            "caller interrupted AI audio"
        );

        let cancel = Outbound::Cancel {
            item_id: item,
            audio_end_ms,
        };
        if let Err(e) = self.ai.send(cancel).await {
            if !e.is_recoverable() {
                self.begin_close(CloseReason::from_error(&e, Side::Ai));
            }
            return Err(e);
        }
        if let Err(e) = telephony.send(Outbound::Clear).await {
            if !e.is_recoverable() {
                self.begin_close(CloseReason::from_error(&e, Side::Telephony));
            }
            return Err(e);
        }
        drop(telephony);

        self.spawn_grace_timer(epoch);
        Ok(true)
    }

    fn spawn_grace_timer(self: &Arc<Self>, epoch: u64) {
        let session = Arc::clone(self);
        let grace = self.config.interruption_grace();
        tokio::spawn(async move {
            tokio::select! {
                _ = session.cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => session.end_interruption(epoch),
            }
        });
    }

    fn end_interruption(&self, epoch: u64) {
        if self.response.lock().epoch != epoch || self.state() != SessionState::Interrupting {
            return;
        }
        debug!(call_id = %self.call_id, "interruption grace elapsed");
        let _ = self.transition(SessionState::Active);
    }

    /// Current codec epoch; changes whenever downstream buffers must be dropped.
    pub(crate) fn codec_epoch(&self) -> u64 {
        self.codec_epoch.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Errors and instructions
    // -------------------------------------------------------------------------

    pub(crate) fn record_frame_ok(&self, direction: Direction) {
        self.frame_errors[direction.index()].store(0, Ordering::Relaxed);
    }

    /// Count a recoverable failure; closes the session at the threshold.
    ///
    /// Returns `true` if the session is now closing because of it.
    pub(crate) fn record_frame_error(&self, direction: Direction, err: &BridgeError) -> bool {
        let count = self.frame_errors[direction.index()].fetch_add(1, Ordering::Relaxed) + 1;
        warn!(call_id = %self.call_id, %direction, count, "dropped frame: {}", err);

        if count >= self.config.max_consecutive_frame_errors {
            self.begin_close(CloseReason::ProtocolError(direction.source_side()));
            return true;
        }
        false
    }

    /// Inject a text instruction into the AI conversation.
    pub async fn inject_instruction(&self, text: impl Into<String>) -> Result<(), BridgeError> {
        if self.is_closing() {
            return Err(BridgeError::SessionClosed(self.call_id.clone()));
        }
        self.ai.send(Outbound::Instruction(text.into())).await?;
        Ok(())
    }
}
