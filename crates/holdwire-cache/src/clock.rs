#![forbid(unsafe_code)]

//! Time sources for expiry checks.
//!
//! In production a cache reads [`SystemClock`]. Tests share a [`ManualClock`]
//! between the cache and the backing so expiry is fully deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

/// Source of "now" for a cache.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real monotonic time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when [`advance`](Self::advance) is called.
///
/// Time is kept as a nanosecond offset from the creation instant, so deltas
/// of any size down to one nanosecond accumulate exactly. The offset
/// saturates at `u64::MAX` nanoseconds (about 584 years). Clones share one
/// timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    offset_ns: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move every clone of this clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let ns = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .offset_ns
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |offset| {
                Some(offset.saturating_add(ns))
            });
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    /// Total time advanced since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_ns.load(Ordering::Acquire))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        ManualClock::now(self)
    }
}
