//! Simulated UART and Bluetooth module for tests
//!
//! [`MockUart`] records what the interrupt handler writes to the transmit
//! register. [`SimulatedModem`] runs a tokio task that plays the module's
//! side of the wire: it fires transmit interrupts, listens to what the
//! firmware sends, and answers scripted triggers with scripted replies while
//! honouring RTS.

use crate::transport::SerialTransport;
use crate::uart::{InterruptSource, UartHw};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct MockLine {
    written: Vec<u8>,
    rts: bool,
    tx_interrupt: bool,
}

/// Test double for the UART registers
pub struct MockUart {
    line: Arc<Mutex<MockLine>>,
    fifo: bool,
}

/// Test-side view of a [`MockUart`]
#[derive(Clone)]
pub struct MockHandle {
    line: Arc<Mutex<MockLine>>,
}

fn lock(line: &Mutex<MockLine>) -> MutexGuard<'_, MockLine> {
    line.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockUart {
    /// Create a UART with or without the transmit FIFO
    pub fn new(fifo: bool) -> (Self, MockHandle) {
        let line = Arc::new(Mutex::new(MockLine::default()));
        (
            Self {
                line: Arc::clone(&line),
                fifo,
            },
            MockHandle { line },
        )
    }
}

impl UartHw for MockUart {
    fn write_thr(&mut self, byte: u8) {
        lock(&self.line).written.push(byte);
    }

    fn set_rts(&mut self, ready: bool) {
        lock(&self.line).rts = ready;
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        lock(&self.line).tx_interrupt = enabled;
    }

    fn fifo_enabled(&self) -> bool {
        self.fifo
    }
}

impl MockHandle {
    /// Take everything written to THR since the last call
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.line).written)
    }

    /// Current RTS output
    pub fn rts(&self) -> bool {
        lock(&self.line).rts
    }

    /// Whether the transmit interrupt is armed
    pub fn tx_interrupt_enabled(&self) -> bool {
        lock(&self.line).tx_interrupt
    }
}

/// Create a transport wired to a FIFO-enabled mock UART
pub fn mock_transport() -> (Arc<SerialTransport>, MockHandle) {
    let (uart, handle) = MockUart::new(true);
    let transport = SerialTransport::new(uart, &crate::TransportConfig::default());
    (Arc::new(transport), handle)
}

/// One scripted exchange: when `trigger` has been heard, send `reply`
#[derive(Debug, Clone)]
struct Reply {
    trigger: Vec<u8>,
    reply: Vec<u8>,
    delay: Duration,
}

/// Scripted stand-in for the Bluetooth module
///
/// Triggers are matched in order against everything the firmware has sent
/// so far; each trigger fires once.
pub struct SimulatedModem {
    transport: Arc<SerialTransport>,
    handle: MockHandle,
    script: VecDeque<Reply>,
    bytes_per_tick: usize,
}

/// Running simulator; the task stops when this is dropped
pub struct ModemHandle {
    heard: Arc<Mutex<Vec<u8>>>,
    inject: mpsc::UnboundedSender<(Vec<u8>, Duration)>,
    task: JoinHandle<()>,
}

impl SimulatedModem {
    /// Build a simulator for a transport created by [`mock_transport`]
    pub fn new(transport: Arc<SerialTransport>, handle: MockHandle) -> Self {
        Self {
            transport,
            handle,
            script: VecDeque::new(),
            bytes_per_tick: 16,
        }
    }

    /// Reply immediately once `trigger` has been sent by the firmware
    pub fn on(self, trigger: &str, reply: &str) -> Self {
        self.on_delayed(trigger, reply, Duration::ZERO)
    }

    /// Reply `delay` after `trigger` has been sent by the firmware
    pub fn on_delayed(mut self, trigger: &str, reply: &str, delay: Duration) -> Self {
        self.script.push_back(Reply {
            trigger: trigger.as_bytes().to_vec(),
            reply: reply.as_bytes().to_vec(),
            delay,
        });
        self
    }

    /// Limit how many bytes the module delivers per millisecond
    pub fn bytes_per_tick(mut self, bytes: usize) -> Self {
        self.bytes_per_tick = bytes.max(1);
        self
    }

    /// Start the simulator task
    pub fn spawn(self) -> ModemHandle {
        let heard = Arc::new(Mutex::new(Vec::new()));
        let (inject, mut injected) = mpsc::unbounded_channel::<(Vec<u8>, Duration)>();
        let heard_task = Arc::clone(&heard);

        let task = tokio::spawn(async move {
            let Self {
                transport,
                handle,
                mut script,
                bytes_per_tick,
            } = self;
            let mut cursor = 0;
            let mut scheduled: Vec<(Instant, Vec<u8>)> = Vec::new();
            let mut outgoing: VecDeque<u8> = VecDeque::new();

            loop {
                // Let the firmware's transmitter run to completion
                while handle.tx_interrupt_enabled() {
                    transport.dispatch(InterruptSource::TransmitReady);
                }

                let now = Instant::now();
                {
                    let mut heard = heard_task.lock().unwrap_or_else(|p| p.into_inner());
                    heard.extend(handle.take_written());

                    while let Some(next) = script.front() {
                        let Some(pos) = find(&heard[cursor..], &next.trigger) else {
                            break;
                        };
                        cursor += pos + next.trigger.len();
                        if let Some(reply) = script.pop_front() {
                            scheduled.push((now + reply.delay, reply.reply));
                        }
                    }
                }

                while let Ok((bytes, delay)) = injected.try_recv() {
                    scheduled.push((now + delay, bytes));
                }

                scheduled.sort_by_key(|(at, _)| *at);
                while scheduled.first().is_some_and(|(at, _)| *at <= now) {
                    let (_, bytes) = scheduled.remove(0);
                    outgoing.extend(bytes);
                }

                // The module stops sending while our RTS is deasserted
                let mut budget = bytes_per_tick;
                while budget > 0 && handle.rts() {
                    let Some(byte) = outgoing.pop_front() else {
                        break;
                    };
                    transport.dispatch(InterruptSource::ReceiveData(&[byte]));
                    budget -= 1;
                }

                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        ModemHandle { heard, inject, task }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl ModemHandle {
    /// Everything the firmware has transmitted so far
    pub fn heard(&self) -> String {
        let heard = self.heard.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&heard).into_owned()
    }

    /// Deliver bytes from the module as soon as flow control allows
    pub fn inject(&self, text: &str) {
        self.inject_after(text, Duration::ZERO);
    }

    /// Deliver bytes from the module after `delay`
    pub fn inject_after(&self, text: &str, delay: Duration) {
        let _ = self.inject.send((text.as_bytes().to_vec(), delay));
    }
}

impl Drop for ModemHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
