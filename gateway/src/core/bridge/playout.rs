//! Playout tracking for AI audio sent to the caller.
//!
//! Every chunk written to telephony is recorded with its duration and send
//! time. Entries leave the queue when telephony acknowledges playback (a
//! mark) or, without marks, once their estimated playback end has passed.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// One chunk sent to telephony and not yet known to be played.
#[derive(Debug, Clone)]
pub struct PlayoutEntry {
    pub sequence: u64,
    pub item_id: Option<Arc<str>>,
    pub duration_ms: u64,
    pub sent_at: Instant,
    /// When playback of this chunk should finish, assuming back-to-back playout.
    pub expected_end: Instant,
}

/// Ordered queue of unplayed chunks plus per-item counters.
#[derive(Debug, Default)]
pub struct PlayoutTracker {
    queue: VecDeque<PlayoutEntry>,
    item: Option<Arc<str>>,
    item_started_at: Option<Instant>,
    item_sent_ms: u64,
    item_acked_ms: u64,
    last_ack_at: Option<Instant>,
    last_expected_end: Option<Instant>,
}

impl PlayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(
        &mut self,
        sequence: u64,
        item_id: Option<Arc<str>>,
        duration_ms: u64,
        sent_at: Instant,
    ) {
        if self.item_started_at.is_none() || item_id != self.item {
            self.item = item_id.clone();
            self.item_started_at = Some(sent_at);
            self.item_sent_ms = 0;
            self.item_acked_ms = 0;
            self.last_ack_at = None;
        }

        let start = match self.last_expected_end {
            Some(end) if end > sent_at => end,
            _ => sent_at,
        };
        let expected_end = start + Duration::from_millis(duration_ms);
        self.last_expected_end = Some(expected_end);
        self.item_sent_ms += duration_ms;

        self.queue.push_back(PlayoutEntry {
            sequence,
            item_id,
            duration_ms,
            sent_at,
            expected_end,
        });
    }

    /// Pop every entry up to and including `sequence`.
    pub fn acknowledge(&mut self, sequence: u64, now: Instant) -> usize {
        let mut popped = 0;
        while self
            .queue
            .front()
            .is_some_and(|entry| entry.sequence <= sequence)
        {
            if let Some(entry) = self.queue.pop_front() {
                self.account_played(&entry);
                popped += 1;
            }
        }
        if popped > 0 {
            self.last_ack_at = Some(now);
        }
        popped
    }

    /// Pop entries whose estimated playback has finished by `now`.
    pub fn drain_elapsed(&mut self, now: Instant) -> usize {
        let mut popped = 0;
        while self
            .queue
            .front()
            .is_some_and(|entry| entry.expected_end <= now)
        {
            if let Some(entry) = self.queue.pop_front() {
                self.account_played(&entry);
                popped += 1;
            }
        }
        popped
    }

    fn account_played(&mut self, entry: &PlayoutEntry) {
        if entry.item_id == self.item {
            self.item_acked_ms += entry.duration_ms;
        }
    }

    /// Drop everything; returns how many entries were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        self.item = None;
        self.item_started_at = None;
        self.item_sent_ms = 0;
        self.item_acked_ms = 0;
        self.last_ack_at = None;
        self.last_expected_end = None;
        discarded
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn current_item(&self) -> Option<Arc<str>> {
        self.item.clone()
    }

    pub fn item_started_at(&self) -> Option<Instant> {
        self.item_started_at
    }

    /// Audio of the current item written to telephony, in ms.
    pub fn item_sent_ms(&self) -> u64 {
        self.item_sent_ms
    }

    /// Audio of the current item known to be played, in ms.
    pub fn item_acked_ms(&self) -> u64 {
        self.item_acked_ms
    }

    pub fn last_ack_at(&self) -> Option<Instant> {
        self.last_ack_at
    }

    /// Estimated end of playback for everything queued.
    pub fn playback_end(&self) -> Option<Instant> {
        self.queue.back().map(|entry| entry.expected_end)
    }

    /// Oldest unplayed entry of the current item.
    pub fn in_flight(&self) -> Option<&PlayoutEntry> {
        self.queue.iter().find(|entry| entry.item_id == self.item)
    }
}

// =============================================================================
// Truncation policies
// =============================================================================

/// Estimates how much of the current item the caller has heard.
pub trait TruncationPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Played duration of the current item in ms, never above what was sent.
    fn played_ms(&self, playout: &PlayoutTracker, now: Instant) -> u64;
}

/// Elapsed wall-clock time since the item's first chunk was sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TruncationPolicy for WallClock {
    fn name(&self) -> &'static str {
        "wall_clock"
    }

    fn played_ms(&self, playout: &PlayoutTracker, now: Instant) -> u64 {
        let elapsed = playout
            .item_started_at()
            .map(|started| now.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or(0);
        elapsed.min(playout.item_sent_ms())
    }
}

/// Acknowledged duration plus a wall-clock estimate for the chunk in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackMarks;

impl TruncationPolicy for PlaybackMarks {
    fn name(&self) -> &'static str {
        "playback_marks"
    }

    fn played_ms(&self, playout: &PlayoutTracker, now: Instant) -> u64 {
        let in_flight = playout
            .in_flight()
            .map(|entry| {
                let started = match playout.last_ack_at() {
                    Some(ack) if ack > entry.sent_at => ack,
                    _ => entry.sent_at,
                };
                (now.saturating_duration_since(started).as_millis() as u64).min(entry.duration_ms)
            })
            .unwrap_or(0);
        (playout.item_acked_ms() + in_flight).min(playout.item_sent_ms())
    }
}
