//! Adapter seams and the session-held endpoint wrapper.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::error::BridgeError;
use super::events::{Ack, Inbound, Outbound, Side};

// =============================================================================
// Traits
// =============================================================================

/// Read half of a provider connection.
#[async_trait]
pub trait MediaSource: Send {
    /// Suspend until the next event. Returns [`Inbound::Closed`] once the
    /// connection has ended; recoverable errors may be followed by more events.
    async fn receive_next(&mut self) -> Result<Inbound, BridgeError>;
}

/// Write half of a provider connection.
#[async_trait]
pub trait MediaSink: Send {
    /// Deliver one event. A `Send` error is fatal for this side.
    async fn send(&mut self, event: Outbound) -> Result<Ack, BridgeError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), BridgeError>;
}

/// Both halves of one provider connection.
pub struct EndpointPair {
    pub source: Box<dyn MediaSource>,
    pub sink: Box<dyn MediaSink>,
}

impl EndpointPair {
    pub fn new(source: Box<dyn MediaSource>, sink: Box<dyn MediaSink>) -> Self {
        Self { source, sink }
    }
}

/// The telephony side of a call, handed over by the transport layer.
pub type TelephonyHandle = EndpointPair;

/// Per-call conversation setup, registered before the media stream connects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSetup {
    /// Objectives for this call, placed ahead of the general instructions.
    pub objectives: Vec<String>,
}

impl CallSetup {
    pub fn with_objectives<I, S>(objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objectives: objectives.into_iter().map(Into::into).collect(),
        }
    }

    /// Non-blank objectives, trimmed.
    pub fn objectives(&self) -> impl Iterator<Item = &str> {
        self.objectives
            .iter()
            .map(|objective| objective.trim())
            .filter(|objective| !objective.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.objectives().next().is_none()
    }
}

/// Opens the AI side of a call.
#[async_trait]
pub trait AiConnector: Send + Sync {
    async fn connect(&self, call_id: &str, setup: &CallSetup) -> Result<EndpointPair, BridgeError>;
}

// =============================================================================
// Endpoint
// =============================================================================

enum Slot {
    /// Not connected yet; outbound events are queued.
    Pending,
    Attached(Box<dyn MediaSink>),
    Released,
}

/// Locked view of an endpoint. Holding it blocks other writers.
pub struct EndpointGuard<'a> {
    side: Side,
    inner: MutexGuard<'a, EndpointInner>,
}

struct EndpointInner {
    slot: Slot,
    pending: VecDeque<Outbound>,
    max_pending: usize,
}

/// Session-owned write half with exactly-once release.
pub struct Endpoint {
    side: Side,
    inner: Mutex<EndpointInner>,
    released: AtomicBool,
}

impl Endpoint {
    /// An endpoint whose sink is already connected.
    pub fn attached(side: Side, sink: Box<dyn MediaSink>) -> Self {
        Self::with_slot(side, Slot::Attached(sink), 0)
    }

    /// An endpoint that queues up to `max_pending` events until [`attach`](Self::attach).
    pub fn pending(side: Side, max_pending: usize) -> Self {
        Self::with_slot(side, Slot::Pending, max_pending)
    }

    fn with_slot(side: Side, slot: Slot, max_pending: usize) -> Self {
        Self {
            side,
            inner: Mutex::new(EndpointInner {
                slot,
                pending: VecDeque::new(),
                max_pending,
            }),
            released: AtomicBool::new(false),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub async fn lock(&self) -> EndpointGuard<'_> {
        EndpointGuard {
            side: self.side,
            inner: self.inner.lock().await,
        }
    }

    pub async fn send(&self, event: Outbound) -> Result<Ack, BridgeError> {
        self.lock().await.send(event).await
    }

    /// Connect a pending endpoint, flushing queued events in order first.
    ///
    /// `is_closing` is checked before every queued send. Once it reports
    /// true, or if the endpoint was already released, the queue is dropped,
    /// the new sink is closed and `ConnectionClosed` is returned.
    pub async fn attach(
        &self,
        mut sink: Box<dyn MediaSink>,
        is_closing: impl Fn() -> bool + Send + Sync,
    ) -> Result<usize, BridgeError> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.slot, Slot::Pending) {
            drop(inner);
            let _ = sink.close().await;
            return Err(BridgeError::ConnectionClosed(self.side));
        }

        let mut flushed = 0;
        let outcome = loop {
            if is_closing() {
                break Err(BridgeError::ConnectionClosed(self.side));
            }
            let Some(event) = inner.pending.pop_front() else {
                break Ok(());
            };
            if let Err(e) = sink.send(event).await {
                break Err(e);
            }
            flushed += 1;
        };

        match outcome {
            Ok(()) => {
                inner.slot = Slot::Attached(sink);
                Ok(flushed)
            }
            Err(e) => {
                inner.slot = Slot::Released;
                let dropped = inner.pending.len();
                inner.pending.clear();
                drop(inner);
                debug!(side = %self.side, flushed, dropped, "attach aborted: {}", e);
                let _ = sink.close().await;
                self.released.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Close and drop the sink. Returns `true` only for the call that
    /// actually released a connected sink.
    pub async fn release(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let slot = std::mem::replace(&mut inner.slot, Slot::Released);
        inner.pending.clear();
        drop(inner);

        match slot {
            Slot::Attached(mut sink) => {
                if let Err(e) = sink.close().await {
                    debug!(side = %self.side, "close failed during release: {}", e);
                }
                self.released.store(true, Ordering::Release);
                true
            }
            Slot::Pending | Slot::Released => false,
        }
    }
}

impl EndpointGuard<'_> {
    pub fn is_attached(&self) -> bool {
        matches!(self.inner.slot, Slot::Attached(_))
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    /// Send through the held lock. Pending endpoints queue the event,
    /// dropping the oldest once full.
    pub async fn send(&mut self, event: Outbound) -> Result<Ack, BridgeError> {
        let inner = &mut *self.inner;
        match &mut inner.slot {
            Slot::Attached(sink) => sink.send(event).await,
            Slot::Pending => {
                if inner.pending.len() >= inner.max_pending {
                    inner.pending.pop_front();
                    tracing::warn!(
                        side = %self.side,
                        limit = inner.max_pending,
                        "pending queue full, dropped oldest event"
                    );
                }
                inner.pending.push_back(event);
                Ok(Ack::default())
            }
            Slot::Released => Err(BridgeError::ConnectionClosed(self.side)),
        }
    }
}
