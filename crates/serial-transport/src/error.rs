//! Transport Error Types

use thiserror::Error;

/// Errors that can occur on the serial link
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transmit ring could not take the whole message
    #[error("Transmit buffer overflow: accepted {accepted} of {requested} bytes")]
    TxOverflow { accepted: usize, requested: usize },

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Port(#[from] tokio_serial::Error),

    /// I/O failure while reading or writing the port
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}
