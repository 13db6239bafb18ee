//! Call admission, per-call supervision and teardown.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::adapter::{AiConnector, CallSetup, MediaSource, TelephonyHandle};
use super::config::BridgeConfig;
use super::error::BridgeError;
use super::events::Side;
use super::pump;
use super::registry::SessionRegistry;
use super::session::{CallSession, CallSummary, CloseReason};

/// Capacity of the termination broadcast; slow subscribers lag, never block.
const CLOSED_CHANNEL_CAPACITY: usize = 256;

struct OrchestratorInner {
    registry: SessionRegistry,
    /// Setups registered for calls whose media stream has not arrived yet.
    prepared: DashMap<String, CallSetup>,
    connector: Arc<dyn AiConnector>,
    config: Arc<BridgeConfig>,
    closed_tx: broadcast::Sender<CallSummary>,
    tracker: TaskTracker,
}

/// Admits calls and owns every session for its lifetime.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct BridgeOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl BridgeOrchestrator {
    pub fn new(config: BridgeConfig, connector: Arc<dyn AiConnector>) -> Self {
        let (closed_tx, _) = broadcast::channel(CLOSED_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(OrchestratorInner {
                registry: SessionRegistry::with_limit(config.max_concurrent_calls),
                prepared: DashMap::new(),
                connector,
                config: Arc::new(config),
                closed_tx,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Register the conversation setup for a call before its media stream
    /// connects. Replaces any setup already prepared for the id.
    pub fn prepare_call(&self, call_id: &str, setup: CallSetup) {
        info!(
            call_id,
            objectives = setup.objectives().count(),
            "call setup prepared"
        );
        self.inner.prepared.insert(call_id.to_string(), setup);
    }

    /// Setup waiting for `call_id`, if any.
    pub fn prepared_setup(&self, call_id: &str) -> Option<CallSetup> {
        self.inner
            .prepared
            .get(call_id)
            .map(|entry| entry.value().clone())
    }

    /// Register a new call and start bridging it, using the setup prepared
    /// for its id if there is one.
    ///
    /// Fails with `DuplicateCall` if the id is already bridged (the existing
    /// session is left untouched) or `CapacityExceeded` at the admission limit.
    pub fn accept(
        &self,
        call_id: &str,
        telephony: TelephonyHandle,
    ) -> Result<Arc<CallSession>, BridgeError> {
        self.admit(call_id, telephony, None)
    }

    /// Like [`accept`](Self::accept), with an explicit setup.
    pub fn accept_with(
        &self,
        call_id: &str,
        telephony: TelephonyHandle,
        setup: CallSetup,
    ) -> Result<Arc<CallSession>, BridgeError> {
        self.admit(call_id, telephony, Some(setup))
    }

    fn admit(
        &self,
        call_id: &str,
        telephony: TelephonyHandle,
        setup: Option<CallSetup>,
    ) -> Result<Arc<CallSession>, BridgeError> {
        let TelephonyHandle { source, sink } = telephony;
        let session = Arc::new(CallSession::new(
            call_id,
            Arc::clone(&self.inner.config),
            sink,
        ));
        if let Err(e) = self.inner.registry.insert(Arc::clone(&session)) {
            warn!(call_id, "rejecting call: {}", e);
            return Err(e);
        }

        let prepared = self
            .inner
            .prepared
            .remove(call_id)
            .map(|(_, setup)| setup);
        let setup = setup.or(prepared).unwrap_or_default();

        info!(
            call_id,
            active = self.inner.registry.len(),
            objectives = setup.objectives().count(),
            "call admitted"
        );
        let inner = Arc::clone(&self.inner);
        self.inner
            .tracker
            .spawn(supervise(inner, Arc::clone(&session), source, setup));
        Ok(session)
    }

    /// Force a call to close and wait until it is `Closed`.
    pub async fn shutdown(&self, call_id: &str) -> Result<(), BridgeError> {
        let session = self
            .lookup(call_id)
            .ok_or_else(|| BridgeError::UnknownCall(call_id.to_string()))?;
        session.begin_close(CloseReason::Shutdown);
        session.closed().await;
        Ok(())
    }

    /// Close every call concurrently and wait for all teardowns.
    /// Returns how many calls were closed.
    pub async fn shutdown_all(&self) -> usize {
        let sessions = self.inner.registry.sessions();
        let count = sessions.len();
        info!(count, "shutting down all calls");

        for session in &sessions {
            session.begin_close(CloseReason::Shutdown);
        }
        join_all(sessions.iter().map(|session| session.closed())).await;

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
        count
    }

    pub fn lookup(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.inner.registry.get(call_id)
    }

    pub fn active_calls(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether a new call would be refused for capacity right now.
    pub fn at_capacity(&self) -> bool {
        self.inner.registry.is_full()
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.inner.registry.call_ids()
    }

    /// Termination notifications, one `CallSummary` per closed call.
    pub fn subscribe_closed(&self) -> broadcast::Receiver<CallSummary> {
        self.inner.closed_tx.subscribe()
    }

    /// Send a text instruction into a call's AI conversation.
    pub async fn inject_instruction(&self, call_id: &str, text: &str) -> Result<(), BridgeError> {
        let session = self
            .lookup(call_id)
            .ok_or_else(|| BridgeError::UnknownCall(call_id.to_string()))?;
        session.inject_instruction(text).await?;
        info!(call_id, "instruction injected");
        Ok(())
    }
}

/// Runs one call from admission to `Closed`.
async fn supervise(
    inner: Arc<OrchestratorInner>,
    session: Arc<CallSession>,
    telephony_source: Box<dyn MediaSource>,
    setup: CallSetup,
) {
    let call_id = session.call_id().to_string();
    let cancel = session.cancel_token().clone();
    let deadline = Instant::now() + inner.config.max_call_duration();

    let upstream = inner
        .tracker
        .spawn(pump::run_upstream(Arc::clone(&session), telephony_source));
    let mut downstream = None;

    let connect = tokio::time::timeout(
        inner.config.connect_timeout(),
        inner.connector.connect(&call_id, &setup),
    );
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep_until(deadline) => {
            session.begin_close(CloseReason::MaxDuration);
        }
        result = connect => {
            match result {
                Ok(Ok(ai)) => match session.attach_ai(ai.sink).await {
                    Ok(()) => {
                        downstream = Some(
                            inner
                                .tracker
                                .spawn(pump::run_downstream(Arc::clone(&session), ai.source)),
                        );
                    }
                    Err(e) => {
                        session.begin_close(CloseReason::from_error(&e, Side::Ai));
                    }
                },
                Ok(Err(e)) => {
                    warn!(call_id = %call_id, "AI connection failed: {}", e);
                    let detail = match e {
                        BridgeError::UpstreamUnavailable(detail) => detail,
                        other => other.to_string(),
                    };
                    session.begin_close(CloseReason::UpstreamUnavailable(detail));
                }
                Err(_) => {
                    warn!(call_id = %call_id, timeout_ms = inner.config.connect_timeout_ms, "AI connection timed out");
                    session.begin_close(CloseReason::UpstreamUnavailable(format!(
                        "connect timed out after {}ms",
                        inner.config.connect_timeout_ms
                    )));
                }
            }
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep_until(deadline) => {
            session.begin_close(CloseReason::MaxDuration);
        }
    }

    // ordered teardown: direction tasks first, then the endpoints
    if let Err(e) = upstream.await {
        error!(call_id = %call_id, "upstream task failed: {}", e);
    }
    if let Some(downstream) = downstream
        && let Err(e) = downstream.await
    {
        error!(call_id = %call_id, "downstream task failed: {}", e);
    }
    session.release_endpoints().await;
    inner.registry.remove(&call_id, &session);

    match session.finish_close() {
        Ok(summary) => {
            info!(
                call_id = %call_id,
                reason = %summary.reason,
                duration_ms = summary.duration.as_millis() as u64,
                upstream_frames = summary.upstream.frames,
                downstream_frames = summary.downstream.frames,
                "call closed"
            );
            let _ = inner.closed_tx.send(summary);
        }
        Err(e) => error!(call_id = %call_id, "session did not close cleanly: {}", e),
    }
}
