//! Channel-driven mock endpoints for bridge tests.
//!
//! A [`MockEndpoint`] is the test's end of one provider connection: events
//! pushed into it come out of the bridge-side `MediaSource`, and everything
//! the bridge sends through the `MediaSink` is recorded in its [`SinkRecorder`].

// Not every test binary uses every helper
#![allow(dead_code)]

pub mod realtime_server;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use callbridge_gateway::core::bridge::{
    Ack, AiConnector, BridgeError, CallSetup, ControlEvent, ControlKind, EndpointPair, Inbound, MediaSink,
    MediaSource, Outbound, Side,
};
use callbridge_gateway::core::codec::{AudioEncoding, AudioFormat, MediaFrame, from_linear};

/// Samples in one 20 ms telephony frame.
pub const FRAME_SAMPLES: usize = 160;

// =============================================================================
// Sink recorder
// =============================================================================

/// Shared view of what a mock sink received.
#[derive(Clone, Default)]
pub struct SinkRecorder {
    sent: Arc<Mutex<Vec<Outbound>>>,
    closes: Arc<AtomicUsize>,
    fail_sends: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
}

impl SinkRecorder {
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.sent.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn audio(&self) -> Vec<MediaFrame> {
        self.sent
            .lock()
            .iter()
            .filter_map(|event| match event {
                Outbound::Audio(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn cancels(&self) -> Vec<(Option<Arc<str>>, u64)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|event| match event {
                Outbound::Cancel {
                    item_id,
                    audio_end_ms,
                } => Some((item_id.clone(), *audio_end_ms)),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make every following send fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Make every following send take `delay` before it is recorded.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<Result<Inbound, BridgeError>>,
}

#[async_trait]
impl MediaSource for MockSource {
    async fn receive_next(&mut self) -> Result<Inbound, BridgeError> {
        match self.rx.recv().await {
            Some(next) => next,
            None => Ok(Inbound::Closed),
        }
    }
}

struct MockSink {
    side: Side,
    recorder: SinkRecorder,
}

#[async_trait]
impl MediaSink for MockSink {
    async fn send(&mut self, event: Outbound) -> Result<Ack, BridgeError> {
        let delay = self.recorder.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.recorder.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::send(self.side, "mock send failure"));
        }
        let bytes = match &event {
            Outbound::Audio(frame) => frame.len(),
            _ => 0,
        };
        self.recorder.sent.lock().push(event);
        Ok(Ack::new(bytes))
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Endpoints
// =============================================================================

/// The test-held end of a mock provider connection.
///
/// Dropping it ends the bridge-side source with `Inbound::Closed`.
pub struct MockEndpoint {
    tx: mpsc::UnboundedSender<Result<Inbound, BridgeError>>,
    pub recorder: SinkRecorder,
}

impl MockEndpoint {
    pub fn push(&self, event: Inbound) {
        let _ = self.tx.send(Ok(event));
    }

    pub fn push_error(&self, error: BridgeError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn control(&self, kind: ControlKind, origin: Side, item: Option<&str>) {
        self.push(Inbound::Control(
            ControlEvent::new(kind, origin).with_item(item.map(Arc::from)),
        ));
    }
}

/// A connected pair of bridge endpoints and the test handle driving them.
pub fn endpoint(side: Side) -> (EndpointPair, MockEndpoint) {
    let (tx, rx) = mpsc::unbounded_channel();
    let recorder = SinkRecorder::default();
    let pair = EndpointPair::new(
        Box::new(MockSource { rx }),
        Box::new(MockSink {
            side,
            recorder: recorder.clone(),
        }),
    );
    (pair, MockEndpoint { tx, recorder })
}

// =============================================================================
// Connector
// =============================================================================

/// AI connector that hands each connection's test handle to the test.
pub struct MockConnector {
    delay: Duration,
    send_delay: Duration,
    failure: Option<String>,
    attempts: AtomicUsize,
    setups: Mutex<Vec<(String, CallSetup)>>,
    connected: mpsc::UnboundedSender<(String, MockEndpoint)>,
}

pub type ConnectorHandle = (Arc<MockConnector>, mpsc::UnboundedReceiver<(String, MockEndpoint)>);

impl MockConnector {
    pub fn new() -> ConnectorHandle {
        Self::build(Duration::ZERO, Duration::ZERO, None)
    }

    pub fn with_delay(delay: Duration) -> ConnectorHandle {
        Self::build(delay, Duration::ZERO, None)
    }

    /// Connects after `delay`; every send on the AI sink takes `send_delay`.
    pub fn with_slow_sink(delay: Duration, send_delay: Duration) -> ConnectorHandle {
        Self::build(delay, send_delay, None)
    }

    pub fn failing(message: &str) -> ConnectorHandle {
        Self::build(Duration::ZERO, Duration::ZERO, Some(message.to_string()))
    }

    fn build(delay: Duration, send_delay: Duration, failure: Option<String>) -> ConnectorHandle {
        let (connected, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            delay,
            send_delay,
            failure,
            attempts: AtomicUsize::new(0),
            setups: Mutex::new(Vec::new()),
            connected,
        });
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Setup passed to every connect, in order.
    pub fn setups(&self) -> Vec<(String, CallSetup)> {
        self.setups.lock().clone()
    }
}

#[async_trait]
impl AiConnector for MockConnector {
    async fn connect(&self, call_id: &str, setup: &CallSetup) -> Result<EndpointPair, BridgeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.setups
            .lock()
            .push((call_id.to_string(), setup.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(BridgeError::UpstreamUnavailable(message.clone()));
        }
        let (pair, handle) = endpoint(Side::Ai);
        handle.recorder.set_delay(self.send_delay);
        let _ = self.connected.send((call_id.to_string(), handle));
        Ok(pair)
    }
}

// =============================================================================
// Frames and waiting
// =============================================================================

/// A 20 ms µ-law frame whose every byte is `fill`.
pub fn caller_frame(fill: u8) -> Inbound {
    Inbound::Audio(MediaFrame::new(
        vec![fill; FRAME_SAMPLES],
        AudioFormat::TELEPHONY,
    ))
}

/// A 20 ms µ-law frame at a constant linear `level`.
pub fn frame_at_level(level: i16) -> Inbound {
    let samples = vec![level; FRAME_SAMPLES];
    Inbound::Audio(MediaFrame::new(
        from_linear(&samples, AudioEncoding::Mulaw),
        AudioFormat::TELEPHONY,
    ))
}

/// A 20 ms chunk of AI audio belonging to `item`.
pub fn ai_chunk(item: &str, fill: u8) -> Inbound {
    Inbound::Audio(
        MediaFrame::new(vec![fill; FRAME_SAMPLES], AudioFormat::TELEPHONY)
            .with_item(Some(Arc::from(item))),
    )
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
