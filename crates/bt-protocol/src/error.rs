//! Bluetooth Protocol Error Types

use serial_transport::TransportError;
use thiserror::Error;

/// Errors that can occur while driving the Bluetooth module
#[derive(Debug, Error)]
pub enum BtError {
    /// Expected response absent within the deadline
    #[error("Timeout waiting for {waiting_for} after {after_ms}ms")]
    Timeout {
        waiting_for: &'static str,
        after_ms: u64,
    },

    /// Response present but of the wrong shape or length
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Line longer than the reader's buffer, cut to its first `capacity` bytes
    #[error("Line exceeded {capacity} bytes and was truncated")]
    LineOverflow { capacity: usize },

    /// Module reported NO CARRIER
    #[error("Link lost (NO CARRIER)")]
    LinkLost,

    /// Not a 12-digit hexadecimal Bluetooth address
    #[error("Invalid Bluetooth address: {0:?}")]
    InvalidAddress(String),

    /// Local name empty, too long or not printable ASCII
    #[error("Invalid local name: {0:?}")]
    InvalidName(String),

    /// Operation not allowed in the current link state
    #[error("Operation not allowed while {0}")]
    InvalidState(String),

    /// Caller cancelled a wait
    #[error("Cancelled")]
    Cancelled,

    /// Serial transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BtError {
    /// Whether the error ends the link, as opposed to failing one step
    pub fn is_link_lost(&self) -> bool {
        matches!(self, BtError::LinkLost)
    }
}
