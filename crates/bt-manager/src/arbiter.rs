//! Channel arbitration between the terminal bridge and foreground work
//!
//! The bridge owns the serial channel whenever no foreground activity runs.
//! [`ChannelArbiter::block`] asks it to stop; the bridge hands any bytes it
//! has already received to the terminal, parks on a semaphore and reports
//! that it is parked. [`ChannelArbiter::release`] wakes it again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::debug;

#[derive(Debug)]
struct Gate {
    permits: Semaphore,
    parked: watch::Sender<bool>,
    stop: AtomicBool,
    running: AtomicBool,
    shutdown: AtomicBool,
}

impl Gate {
    fn settled(&self, parked: bool) -> bool {
        !self.running.load(Ordering::Acquire) || (parked && self.permits.available_permits() == 0)
    }
}

/// Foreground side of the gate
#[derive(Debug, Clone)]
pub struct ChannelArbiter {
    gate: Arc<Gate>,
}

/// Bridge side of the gate
#[derive(Debug, Clone)]
pub struct BridgeGate {
    gate: Arc<Gate>,
}

impl ChannelArbiter {
    pub fn new() -> Self {
        let (parked, _) = watch::channel(false);
        Self {
            gate: Arc::new(Gate {
                permits: Semaphore::new(0),
                parked,
                stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Handle for the bridge task
    pub fn bridge_gate(&self) -> BridgeGate {
        BridgeGate {
            gate: Arc::clone(&self.gate),
        }
    }

    /// Stop the bridge and wait until it is parked
    ///
    /// Returns at once when no bridge runs.
    pub async fn block(&self) {
        self.gate.stop.store(true, Ordering::Release);
        if !self.gate.running.load(Ordering::Acquire) {
            return;
        }

        let mut parked = self.gate.parked.subscribe();
        let gate = Arc::clone(&self.gate);
        // The sender lives in the gate, so the channel never closes
        let _ = parked.wait_for(|&p| gate.settled(p)).await;
        debug!("Bridge parked");
    }

    /// Let a parked bridge run again; at most one permit is ever pending
    ///
    /// Clearing `parked` together with handing out the permit means a
    /// later [`block`](Self::block) only sees the bridge parked once it has
    /// parked again.
    pub fn release(&self) {
        let gate = &self.gate;
        gate.parked.send_if_modified(|parked| {
            gate.stop.store(false, Ordering::Release);
            if !*parked {
                return false;
            }
            *parked = false;
            if gate.permits.available_permits() == 0 {
                gate.permits.add_permits(1);
            }
            true
        });
    }

    /// Whether a foreground activity currently holds the channel
    pub fn stop_requested(&self) -> bool {
        self.gate.stop.load(Ordering::Acquire)
    }

    pub fn bridge_running(&self) -> bool {
        self.gate.running.load(Ordering::Acquire)
    }

    pub fn pending_permits(&self) -> usize {
        self.gate.permits.available_permits()
    }

    /// Ask the bridge to exit, waking it if parked
    pub fn shutdown(&self) {
        self.gate.shutdown.store(true, Ordering::Release);
        if self.gate.permits.available_permits() == 0 {
            self.gate.permits.add_permits(1);
        }
    }
}

impl Default for ChannelArbiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks the bridge as running until dropped
pub(crate) struct RunningGuard {
    gate: Arc<Gate>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
        // Wake any block() waiting on a bridge that is gone
        self.gate.parked.send_replace(true);
    }
}

impl BridgeGate {
    pub(crate) fn enter(&self) -> RunningGuard {
        // A permit left by the shutdown of an earlier bridge
        while let Ok(permit) = self.gate.permits.try_acquire() {
            permit.forget();
        }
        self.gate.shutdown.store(false, Ordering::Release);
        self.gate.parked.send_replace(false);
        self.gate.running.store(true, Ordering::Release);
        RunningGuard {
            gate: Arc::clone(&self.gate),
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.gate.stop.load(Ordering::Acquire)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.gate.shutdown.load(Ordering::Acquire)
    }

    /// Report parked and sleep until released
    ///
    /// Returns at once if the stop request was withdrawn first. `release`
    /// clears the parked flag when it wakes the bridge.
    pub async fn park(&self) {
        let gate = &self.gate;
        let parked = gate.parked.send_if_modified(|parked| {
            if !gate.stop.load(Ordering::Acquire) {
                return false;
            }
            *parked = true;
            true
        });
        if !parked {
            return;
        }

        if let Ok(permit) = gate.permits.acquire().await {
            permit.forget();
        }
    }
}
