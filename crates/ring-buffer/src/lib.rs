//! Fixed-Capacity Ring Buffer
//!
//! Provides the bounded queues that sit between the UART interrupt handler
//! and the application task. Capacity is fixed at compile time so the
//! storage never reallocates while interrupts are being serviced.

mod buffer;

pub use buffer::{BufferStats, RingBuffer};

use thiserror::Error;

/// Errors reported by ring buffer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The buffer holds `capacity` entries and cannot accept more
    #[error("Ring buffer full ({capacity} entries)")]
    Full { capacity: usize },
}
