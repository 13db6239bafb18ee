//! Direction tasks: one reads the caller and feeds the AI, the other reads
//! the AI and feeds the caller. Each owns its source and its codec.

use std::sync::Arc;

use tracing::{debug, error, trace};

use super::adapter::MediaSource;
use super::error::BridgeError;
use super::events::{ControlKind, Inbound, MediaFrame, Side};
use super::session::{CallSession, CloseReason, Direction};
use crate::core::codec::{FrameCodec, rms_energy};

/// Detects caller speech from consecutive loud frames.
#[derive(Debug)]
pub struct EnergyDetector {
    threshold: f64,
    min_frames: u32,
    loud_frames: u32,
}

impl EnergyDetector {
    pub fn new(threshold: f64, min_frames: u32) -> Self {
        Self {
            threshold,
            min_frames: min_frames.max(1),
            loud_frames: 0,
        }
    }

    /// Returns `true` on the frame that completes a run of loud frames.
    pub fn observe(&mut self, frame: &MediaFrame) -> bool {
        if rms_energy(frame) >= self.threshold {
            self.loud_frames = self.loud_frames.saturating_add(1);
            self.loud_frames == self.min_frames
        } else {
            self.loud_frames = 0;
            false
        }
    }
}

/// Apply the failure policy to one step's result. Returns whether the task
/// should keep running.
fn settle(session: &CallSession, direction: Direction, result: Result<(), BridgeError>) -> bool {
    match result {
        Ok(()) => {
            session.record_frame_ok(direction);
            true
        }
        Err(e) if e.is_recoverable() => !session.record_frame_error(direction, &e),
        Err(e) => {
            error!(call_id = %session.call_id(), %direction, "fatal bridge error: {}", e);
            session.begin_close(CloseReason::from_error(&e, direction.source_side()));
            false
        }
    }
}

/// Telephony source to AI endpoint.
pub(crate) async fn run_upstream(session: Arc<CallSession>, mut source: Box<dyn MediaSource>) {
    let config = session.config().clone();
    let mut codec = match FrameCodec::new(config.telephony_format, config.ai_format, None) {
        Ok(codec) => codec,
        Err(e) => {
            error!(call_id = %session.call_id(), "cannot build upstream codec: {}", e);
            session.begin_close(CloseReason::ProtocolError(Side::Telephony));
            return;
        }
    };
    let mut energy = config
        .interruption_trigger
        .uses_caller_energy()
        .then(|| EnergyDetector::new(config.energy_threshold, config.energy_min_frames));
    let cancel = session.cancel_token().clone();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = source.receive_next() => next,
        };

        let result = match next {
            Ok(Inbound::Audio(frame)) => {
                trace!(call_id = %session.call_id(), seq = frame.sequence, len = frame.len(), "caller audio");
                if let Some(detector) = energy.as_mut()
                    && detector.observe(&frame)
                    && let Err(e) = session.on_caller_speech("caller_energy").await
                    && !settle(&session, Direction::Upstream, Err(e))
                {
                    break;
                }
                match codec.encode(&frame) {
                    Ok(frames) => session.forward_upstream(frames).await,
                    Err(e) => Err(e.into()),
                }
            }
            Ok(Inbound::Control(event)) => session.handle_control(event).await,
            Ok(Inbound::Closed) => {
                session.begin_close(CloseReason::ConnectionClosed(Side::Telephony));
                break;
            }
            Err(e) => Err(e),
        };

        if !settle(&session, Direction::Upstream, result) {
            break;
        }
    }
    debug!(call_id = %session.call_id(), "upstream task stopped");
}

/// AI source to telephony endpoint.
pub(crate) async fn run_downstream(session: Arc<CallSession>, mut source: Box<dyn MediaSource>) {
    let config = session.config().clone();
    let mut codec = match FrameCodec::new(
        config.ai_format,
        config.telephony_format,
        config.telephony_frame(),
    ) {
        Ok(codec) => codec,
        Err(e) => {
            error!(call_id = %session.call_id(), "cannot build downstream codec: {}", e);
            session.begin_close(CloseReason::ProtocolError(Side::Ai));
            return;
        }
    };
    let mut epoch = session.codec_epoch();
    let cancel = session.cancel_token().clone();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = source.receive_next() => next,
        };

        let current = session.codec_epoch();
        if current != epoch {
            codec.reset();
            epoch = current;
        }

        let result = match next {
            Ok(Inbound::Audio(frame)) => {
                if !session.accepts_ai_audio(frame.item_id.as_ref()) {
                    trace!(call_id = %session.call_id(), seq = frame.sequence, "dropping AI audio");
                    continue;
                }
                match codec.encode(&frame) {
                    Ok(frames) => session.forward_downstream(frames).await,
                    Err(e) => Err(e.into()),
                }
            }
            Ok(Inbound::Control(event)) => {
                let tail = (event.origin == Side::Ai && event.kind == ControlKind::SpeechStopped)
                    .then(|| codec.flush())
                    .flatten();
                let flushed = match tail {
                    Some(tail) => session.forward_downstream(vec![tail]).await,
                    None => Ok(()),
                };
                match flushed {
                    Ok(()) => session.handle_control(event).await,
                    Err(e) => Err(e),
                }
            }
            Ok(Inbound::Closed) => {
                session.begin_close(CloseReason::ConnectionClosed(Side::Ai));
                break;
            }
            Err(e) => Err(e),
        };

        if !settle(&session, Direction::Downstream, result) {
            break;
        }
    }
    debug!(call_id = %session.call_id(), "downstream task stopped");
}
