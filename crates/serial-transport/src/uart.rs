//! UART hardware boundary

/// Register-level operations the interrupt handler performs on the UART
///
/// Implementations must not block: they are called with the transport's
/// critical section held.
pub trait UartHw: Send {
    /// Load one byte into the transmit holding register
    fn write_thr(&mut self, byte: u8);

    /// Drive RTS: `true` lets the remote side transmit
    fn set_rts(&mut self, ready: bool);

    /// Enable or disable the transmit-holding-register-empty interrupt
    fn set_tx_interrupt(&mut self, enabled: bool);

    /// Whether the 16-byte transmit FIFO is enabled
    fn fifo_enabled(&self) -> bool;
}

/// Interrupt identification, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource<'a> {
    /// Receive line status (overrun, framing or parity error)
    LineStatus,
    /// Receive data available; carries the bytes read from RBR
    ReceiveData(&'a [u8]),
    /// Character timeout; residual FIFO bytes read from RBR
    CharacterTimeout(&'a [u8]),
    /// Transmit holding register empty
    TransmitReady,
    /// Modem status change; `cts_clear` is true when we may transmit
    ModemStatus { cts_clear: bool },
}
