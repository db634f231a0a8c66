//! Serial port backend
//!
//! Bridges a host serial port to the interrupt-style transport: received
//! bytes are fed to [`SerialTransport::dispatch`] as receive interrupts and
//! bytes loaded into the transmit register are written to the port, each
//! write completing with a transmit-ready interrupt.

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::transport::SerialTransport;
use crate::uart::{InterruptSource, UartHw};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info};

/// Largest single read from the port
const READ_CHUNK: usize = 64;

/// UART registers backed by a host serial port
pub struct PortUart {
    thr: mpsc::UnboundedSender<u8>,
    rts: Arc<AtomicBool>,
}

impl UartHw for PortUart {
    fn write_thr(&mut self, byte: u8) {
        // Writer task gone means the pump is shutting down
        let _ = self.thr.send(byte);
    }

    fn set_rts(&mut self, ready: bool) {
        self.rts.store(ready, Ordering::Release);
    }

    fn set_tx_interrupt(&mut self, _enabled: bool) {
        // Completion is signalled by the writer task after each write
    }

    fn fifo_enabled(&self) -> bool {
        true
    }
}

/// Reader and writer tasks servicing one serial port
pub struct SerialPump {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SerialPump {
    /// Open the configured port (8N1, hardware flow control) and start pumping
    pub fn open(config: &TransportConfig) -> Result<(Arc<SerialTransport>, Self), TransportError> {
        info!("Opening serial port {} at {} baud", config.device, config.baud_rate);

        let port = tokio_serial::new(&config.device, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::Hardware)
            .open_native_async()?;

        let (thr_tx, thr_rx) = mpsc::unbounded_channel();
        let rts = Arc::new(AtomicBool::new(true));
        let uart = PortUart {
            thr: thr_tx,
            rts: Arc::clone(&rts),
        };
        let transport = Arc::new(SerialTransport::new(uart, config));

        let (read_half, write_half) = tokio::io::split(port);
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&transport), rts));
        let writer = tokio::spawn(write_loop(write_half, Arc::clone(&transport), thr_rx));

        Ok((transport, Self { reader, writer }))
    }

    /// Stop both tasks
    pub fn shutdown(self) {
        debug!("Stopping serial pump");
        self.reader.abort();
        self.writer.abort();
    }
}

async fn read_loop<R>(mut port: R, transport: Arc<SerialTransport>, rts: Arc<AtomicBool>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    loop {
        // Leave bytes in the OS buffer while we hold RTS low
        let room = transport.rx_free().min(READ_CHUNK);
        if !rts.load(Ordering::Acquire) || room == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            continue;
        }

        match port.read(&mut buf[..room]).await {
            Ok(0) => {
                info!("Serial port closed");
                return;
            }
            Ok(n) => transport.dispatch(InterruptSource::ReceiveData(&buf[..n])),
            Err(e) => {
                error!("Serial read failed: {}", e);
                transport.dispatch(InterruptSource::LineStatus);
                return;
            }
        }
    }
}

async fn write_loop<W>(
    mut port: W,
    transport: Arc<SerialTransport>,
    mut thr: mpsc::UnboundedReceiver<u8>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut burst = Vec::with_capacity(crate::burst::FIFO);
    while let Some(byte) = thr.recv().await {
        burst.push(byte);
        while let Ok(byte) = thr.try_recv() {
            burst.push(byte);
        }

        if let Err(e) = port.write_all(&burst).await {
            error!("Serial write failed: {}", e);
            return;
        }
        burst.clear();

        transport.dispatch(InterruptSource::TransmitReady);
    }
}
