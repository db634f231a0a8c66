//! Host terminal adapters

use bt_manager::Terminal;
use bt_protocol::ActivityIndicator;
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tracing::debug;

/// Process stdin/stdout as the bridge's terminal
pub struct StdioTerminal {
    input: mpsc::UnboundedReceiver<Vec<u8>>,
    stdout: io::Stdout,
}

impl StdioTerminal {
    /// Start a thread feeding stdin into the terminal
    pub fn spawn() -> Self {
        let (tx, input) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 256];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(to_module_line_endings(&buf[..n])).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("stdin closed");
        });

        Self {
            input,
            stdout: io::stdout(),
        }
    }
}

/// The module ends commands with CR; a cooked host terminal sends LF
fn to_module_line_endings(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .map(|&b| if b == b'\n' { b'\r' } else { b })
        .collect()
}

impl Terminal for StdioTerminal {
    fn try_read(&mut self) -> Option<Vec<u8>> {
        self.input.try_recv().ok()
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut out = self.stdout.lock();
        // A closed stdout leaves nothing to report to
        let _ = out.write_all(bytes).and_then(|_| out.flush());
    }
}

/// Draws the waiting animation on stderr
#[derive(Debug, Default)]
pub struct StderrIndicator;

impl ActivityIndicator for StderrIndicator {
    fn show(&mut self, frame: &str) {
        eprint!("\r{}", frame);
    }

    fn clear(&mut self) {
        eprint!("\r   \r");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endings() {
        assert_eq!(to_module_line_endings(b"ATI\n"), b"ATI\r");
        assert_eq!(to_module_line_endings(b"+++"), b"+++");
    }
}
