//! Serial Transport for the Bluetooth Module
//!
//! Models the UART #1 link to the Bluetooth module: an interrupt handler
//! that fills the receive ring and drains the transmit ring, RTS/CTS
//! hardware flow control, and a non-blocking task-side API.
//!
//! The interrupt handler is reached through [`SerialTransport::dispatch`].
//! On the host it is driven either by [`SerialPump`] (a real serial port via
//! tokio-serial) or by the simulated UART behind the `test-support` feature.

mod config;
mod error;
mod port;
mod transport;
mod uart;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use config::TransportConfig;
pub use error::TransportError;
pub use port::{PortUart, SerialPump};
pub use transport::{SerialTransport, TransportStats, RX_CAPACITY, TX_CAPACITY};
pub use uart::{InterruptSource, UartHw};

/// Bytes moved per transmit interrupt
pub mod burst {
    /// With the 16-byte hardware FIFO enabled
    pub const FIFO: usize = 16;
    /// Without a FIFO, one byte per interrupt
    pub const SINGLE: usize = 1;
}
