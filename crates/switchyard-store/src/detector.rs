//! Change detection for polled collections.
//!
//! The store offers no change feed, so every poll compares the fetched
//! collection against what the cache last accepted. [`WatermarkDetector`]
//! does this with a per-collection high-water-mark; a store that can push
//! changes can replace it behind [`ChangeDetector`].

use std::fmt;
use std::sync::Arc;

use switchyard_core::now_millis;

/// Source of wall-clock time in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The system clock.
pub fn system_clock() -> Clock {
    Arc::new(now_millis)
}

/// What the cache knows about one collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionState {
    /// Number of cached entities.
    pub len: usize,
    /// Time of the last accepted load; 0 means never loaded.
    pub high_water_mark: i64,
}

/// Decides whether a fetched collection differs from the cached one.
pub trait ChangeDetector: Send + Sync + fmt::Debug {
    /// Whether `fetched` (the last-modified stamps of a fresh fetch) must
    /// replace the cached collection described by `cached`.
    fn has_changed(&self, cached: &CollectionState, fetched: &[i64]) -> bool;

    /// High-water-mark to record once a fetch has been accepted.
    fn watermark(&self) -> i64;
}

/// High-water-mark change detection.
///
/// A collection changed when it shrank or when any entity was modified after
/// the last accepted load. The mark is the wall-clock time of that load, not
/// the newest entity stamp.
///
/// Deleting an entity and recreating it with an equal or older stamp inside
/// one poll interval keeps the length and stays under the mark, so it goes
/// unnoticed until the next real change.
#[derive(Clone)]
pub struct WatermarkDetector {
    clock: Clock,
}

impl WatermarkDetector {
    /// Detector using the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Detector using a custom clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }
}

impl Default for WatermarkDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WatermarkDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatermarkDetector").finish_non_exhaustive()
    }
}

impl ChangeDetector for WatermarkDetector {
    fn has_changed(&self, cached: &CollectionState, fetched: &[i64]) -> bool {
        fetched.len() < cached.len || fetched.iter().any(|&stamp| stamp > cached.high_water_mark)
    }

    fn watermark(&self) -> i64 {
        (self.clock)()
    }
}
