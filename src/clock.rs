//! Monotonic millisecond clocks
//!
//! The engine only ever needs "milliseconds since some fixed origin". The
//! threaded runtime reads a [`SystemClock`]; tests and trace replay drive a
//! [`ManualClock`] by hand.

use crate::types::Millis;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic engine time
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's origin. Never decreases.
    fn now_ms(&self) -> Millis;
}

/// Wall-independent clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move time forward by `delta_ms`
    pub fn advance(&self, delta_ms: Millis) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump to `ms`; earlier values are ignored so time stays monotonic
    pub fn set(&self, ms: Millis) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(100);
        clock.advance(400);
        assert_eq!(clock.now_ms(), 500);
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new(1_000);
        clock.set(500);
        assert_eq!(clock.now_ms(), 1_000);
        clock.set(1_500);
        assert_eq!(clock.now_ms(), 1_500);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0);
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now_ms(), 250);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
