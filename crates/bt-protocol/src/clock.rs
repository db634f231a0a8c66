//! Monotonic time source and deadlines

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Monotonic millisecond clock
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Clock backed by the tokio timer, so paused test time applies
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock advanced by hand
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Point in time after which a wait gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start_ms: u64,
    timeout_ms: u64,
}

impl Deadline {
    /// Deadline `timeout_ms` from now
    pub fn after(clock: &dyn Clock, timeout_ms: u64) -> Self {
        Self {
            start_ms: clock.now_ms(),
            timeout_ms,
        }
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.elapsed_ms(clock) >= self.timeout_ms
    }

    pub fn elapsed_ms(&self, clock: &dyn Clock) -> u64 {
        clock.now_ms().saturating_sub(self.start_ms)
    }

    pub fn remaining_ms(&self, clock: &dyn Clock) -> u64 {
        self.timeout_ms.saturating_sub(self.elapsed_ms(clock))
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_deadline_expiry() {
        let clock = ManualClock::new(1_000);
        let deadline = Deadline::after(&clock, 200);

        clock.advance(199);
        assert!(!deadline.is_expired(&clock));
        assert_eq!(deadline.remaining_ms(&clock), 1);

        clock.advance(1);
        assert!(deadline.is_expired(&clock));
        assert_eq!(deadline.remaining_ms(&clock), 0);
    }

    #[test]
    fn test_clock_going_backwards_saturates() {
        let clock = ManualClock::new(500);
        let deadline = Deadline::after(&clock, 100);
        clock.set(0);
        assert_eq!(deadline.elapsed_ms(&clock), 0);
        assert!(!deadline.is_expired(&clock));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = Arc::new(TokioClock::new());
        let deadline = Deadline::after(&clock, 6_000);

        tokio::time::sleep(Duration::from_millis(5_990)).await;
        assert!(!deadline.is_expired(&clock));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(deadline.is_expired(&clock));
    }
}
