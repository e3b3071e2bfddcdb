//! Snapshot cache counters.
//!
//! Every event bumps a local tally readable through [`CacheStats::count`]
//! and the `switchyard_cache_events_total` counter, labelled by `event`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;

/// Cache events, labelled by `event`.
pub const CACHE_EVENTS_TOTAL: &str = "switchyard_cache_events_total";

const EVENT_KINDS: usize = 5;

/// Something the snapshot cache did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    /// A snapshot was assigned to a node.
    Assigned,
    /// A lookup found the node's snapshot.
    Hit,
    /// A lookup found nothing for the node.
    Miss,
    /// A node's snapshot was removed.
    Cleared,
    /// A watch was handed a snapshot.
    WatchNotified,
}

impl CacheEvent {
    const ALL: [CacheEvent; EVENT_KINDS] = [
        CacheEvent::Assigned,
        CacheEvent::Hit,
        CacheEvent::Miss,
        CacheEvent::Cleared,
        CacheEvent::WatchNotified,
    ];

    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheEvent::Assigned => "assigned",
            CacheEvent::Hit => "hit",
            CacheEvent::Miss => "miss",
            CacheEvent::Cleared => "cleared",
            CacheEvent::WatchNotified => "watch_notified",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Counters shared by a cache and anyone holding a clone.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    tallies: Arc<[AtomicU64; EVENT_KINDS]>,
}

impl CacheStats {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: CacheEvent) {
        self.record_many(event, 1);
    }

    pub(crate) fn record_many(&self, event: CacheEvent, n: u64) {
        if n == 0 {
            return;
        }
        self.tallies[event.slot()].fetch_add(n, Ordering::Relaxed);
        counter!(CACHE_EVENTS_TOTAL, "event" => event.as_str()).increment(n);
    }

    /// Times `event` happened.
    pub fn count(&self, event: CacheEvent) -> u64 {
        self.tallies[event.slot()].load(Ordering::Relaxed)
    }

    /// Share of lookups that found a snapshot, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.count(CacheEvent::Hit);
        match hits + self.count(CacheEvent::Miss) {
            0 => 0.0,
            lookups => hits as f64 / lookups as f64,
        }
    }

    /// Every tally paired with its event, for logging.
    pub fn tallies(&self) -> impl Iterator<Item = (CacheEvent, u64)> + '_ {
        CacheEvent::ALL.into_iter().map(|e| (e, self.count(e)))
    }
}
