//! Terminal bridge
//!
//! While no foreground activity runs, everything typed on the terminal goes
//! to the module and everything the module sends goes to the terminal.

use crate::arbiter::BridgeGate;
use serial_transport::SerialTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Console on the other end of the bridge
pub trait Terminal: Send + 'static {
    /// Bytes typed since the last call, if any
    fn try_read(&mut self) -> Option<Vec<u8>>;

    fn write(&mut self, bytes: &[u8]);
}

/// Terminal backed by a pair of channels
pub struct ChannelTerminal {
    input: mpsc::UnboundedReceiver<Vec<u8>>,
    output: mpsc::UnboundedSender<Vec<u8>>,
}

/// The user's end of a [`ChannelTerminal`]
pub struct TerminalHandle {
    pub input: mpsc::UnboundedSender<Vec<u8>>,
    pub output: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelTerminal {
    pub fn new() -> (Self, TerminalHandle) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        (
            Self {
                input: input_rx,
                output: output_tx,
            },
            TerminalHandle {
                input: input_tx,
                output: output_rx,
            },
        )
    }
}

impl Terminal for ChannelTerminal {
    fn try_read(&mut self) -> Option<Vec<u8>> {
        self.input.try_recv().ok()
    }

    fn write(&mut self, bytes: &[u8]) {
        // Nobody listening is the same as a detached console
        let _ = self.output.send(bytes.to_vec());
    }
}

impl TerminalHandle {
    /// Everything written to the terminal so far
    pub fn drain_output(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.output.try_recv() {
            out.extend(chunk);
        }
        out
    }
}

fn forward_rx(transport: &SerialTransport, terminal: &mut impl Terminal) -> usize {
    let mut chunk = Vec::new();
    while let Some(byte) = transport.try_receive() {
        chunk.push(byte);
    }
    if !chunk.is_empty() {
        terminal.write(&chunk);
    }
    chunk.len()
}

/// Pump bytes between `terminal` and the module until shut down
///
/// When a foreground activity blocks the bridge, bytes already received
/// are flushed to the terminal before the bridge parks.
pub async fn run_bridge(
    transport: Arc<SerialTransport>,
    gate: BridgeGate,
    mut terminal: impl Terminal,
    idle: Duration,
) {
    let _running = gate.enter();
    info!("Terminal bridge started");

    while !gate.shutdown_requested() {
        if gate.stop_requested() {
            let flushed = forward_rx(&transport, &mut terminal);
            debug!("Bridge parking, flushed {} byte(s)", flushed);
            gate.park().await;
            continue;
        }

        let mut busy = false;
        if let Some(input) = terminal.try_read() {
            if let Err(e) = transport.send(&input) {
                warn!("Terminal input lost: {}", e);
            }
            busy = true;
        }
        busy |= forward_rx(&transport, &mut terminal) > 0;

        if busy {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(idle).await;
        }
    }
    info!("Terminal bridge stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::ChannelArbiter;
    use serial_transport::mock::{mock_transport, SimulatedModem};
    use serial_transport::InterruptSource;

    #[tokio::test(start_paused = true)]
    async fn test_bridge_passes_bytes_both_ways() {
        let (transport, handle) = mock_transport();
        let modem = SimulatedModem::new(Arc::clone(&transport), handle)
            .on("ATI\r", "BGB203 S06\r\n")
            .spawn();
        let arbiter = ChannelArbiter::new();
        let (terminal, mut user) = ChannelTerminal::new();
        let bridge = tokio::spawn(run_bridge(
            Arc::clone(&transport),
            arbiter.bridge_gate(),
            terminal,
            Duration::from_millis(10),
        ));

        user.input.send(b"ATI\r".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(modem.heard(), "ATI\r");
        assert_eq!(user.drain_output(), b"BGB203 S06\r\n");

        arbiter.shutdown();
        bridge.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_flushes_received_bytes_to_terminal() {
        let (transport, _handle) = mock_transport();
        let arbiter = ChannelArbiter::new();
        let (terminal, mut user) = ChannelTerminal::new();
        let _bridge = tokio::spawn(run_bridge(
            Arc::clone(&transport),
            arbiter.bridge_gate(),
            terminal,
            Duration::from_millis(10),
        ));
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Arrives while the bridge sleeps
        transport.dispatch(InterruptSource::ReceiveData(b"RING\r\n"));
        arbiter.block().await;

        assert_eq!(transport.rx_pending(), 0);
        assert_eq!(user.drain_output(), b"RING\r\n");

        // Parked: new bytes stay for the foreground
        transport.dispatch(InterruptSource::ReceiveData(b"OK\r\n"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.rx_pending(), 4);
        assert!(user.drain_output().is_empty());

        arbiter.release();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(user.drain_output(), b"OK\r\n");
    }
}
