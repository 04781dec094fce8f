//! # Linear Time
//!
//! Every time-dependent decision in Maelstrom — latency draws, nemesis
//! intervals, request timeouts — reads through a single [`Clock`]
//! abstraction instead of calling `Instant::now()` directly. This is what
//! lets the virtual-clock implementation drive a fully deterministic,
//! faster-than-wall-clock test run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic nanosecond counter shared across all actors.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current linear time, in nanoseconds since some fixed but unspecified
    /// origin (not necessarily the Unix epoch).
    fn now_ns(&self) -> u64;

    /// Suspend the caller until linear time reaches `at_ns`. The real clock
    /// sleeps for the wall-clock remainder; the virtual clock jumps straight
    /// there and returns immediately, since nothing else is happening until
    /// the next scheduled event fires.
    async fn wait_until(&self, at_ns: u64);
}

/// Backed by the OS monotonic clock. Used for interactive runs where wall
/// time should track real time.
pub struct RealClock {
    origin: Instant,
}

impl RealClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    async fn wait_until(&self, at_ns: u64) {
        let now = self.now_ns();
        if at_ns > now {
            tokio::time::sleep(std::time::Duration::from_nanos(at_ns - now)).await;
        }
    }
}

/// A deterministic clock advanced explicitly by the network core's
/// next-event pump rather than by wall-clock time. Enables deterministic
/// replay and running a test much faster than real time, since no actor
/// ever actually sleeps: the pump jumps straight to the next scheduled
/// event's timestamp.
pub struct VirtualClock {
    now_ns: AtomicU64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            now_ns: AtomicU64::new(0),
        }
    }

    /// Advance to `at_least_ns`, a no-op if time has already passed that
    /// point. The pump never moves time backwards.
    pub fn advance_to(&self, at_least_ns: u64) {
        self.now_ns.fetch_max(at_least_ns, Ordering::SeqCst);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Clock for VirtualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    async fn wait_until(&self, at_ns: u64) {
        self.advance_to(at_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_clock_is_monotonic() {
        let clock = RealClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn virtual_clock_never_moves_backwards() {
        let clock = VirtualClock::new();
        clock.advance_to(1_000);
        clock.advance_to(500);
        assert_eq!(clock.now_ns(), 1_000);
        clock.advance_to(2_000);
        assert_eq!(clock.now_ns(), 2_000);
    }
}
