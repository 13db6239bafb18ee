//! Concurrent call-id to session map.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::BridgeError;
use super::session::CallSession;

/// Sessions of every call currently bridged, keyed by call id.
///
/// With a limit, admission reserves a slot atomically, so concurrent inserts
/// never exceed it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
    limit: Option<usize>,
    admitted: AtomicUsize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Insert unless the call id is already registered or the registry is full.
    ///
    /// A duplicate id is reported as `DuplicateCall` even at the limit.
    pub fn insert(&self, session: Arc<CallSession>) -> Result<(), BridgeError> {
        match self.sessions.entry(session.call_id().to_string()) {
            Entry::Occupied(_) => Err(BridgeError::DuplicateCall(session.call_id().to_string())),
            Entry::Vacant(entry) => {
                self.reserve()?;
                entry.insert(session);
                Ok(())
            }
        }
    }

    fn reserve(&self) -> Result<(), BridgeError> {
        let limit = self.limit;
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |admitted| {
                match limit {
                    Some(limit) if admitted >= limit => None,
                    _ => Some(admitted + 1),
                }
            })
            .map(|_| ())
            .map_err(|_| BridgeError::CapacityExceeded(limit.unwrap_or_default()))
    }

    /// Whether an insert of a new call id would currently fail for capacity.
    pub fn is_full(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.admitted.load(Ordering::Acquire) >= limit)
    }

    /// Remove `session`, but only if it is still the registered instance.
    pub fn remove(&self, call_id: &str, session: &Arc<CallSession>) -> bool {
        let removed = self
            .sessions
            .remove_if(call_id, |_, registered| Arc::ptr_eq(registered, session))
            .is_some();
        if removed {
            self.admitted.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.sessions.contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of every registered session.
    pub fn sessions(&self) -> Vec<Arc<CallSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
