//! Line assembly from transport bytes

use crate::wire::LINE_END;
use serial_transport::SerialTransport;
use std::fmt;
use tracing::debug;

/// Default bound on one response line, terminator excluded
pub const DEFAULT_LINE_CAPACITY: usize = 40;

/// One finalised line, without its `\n` and trailing `\r`
#[derive(Clone, PartialEq, Eq)]
pub struct Line {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Line {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            truncated: false,
        }
    }

    /// Leading part of a line longer than the reader's capacity
    pub fn truncated(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            truncated: true,
        }
    }

    /// Bytes past the reader's capacity were discarded
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the content held, not of the line as sent
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.bytes.starts_with(prefix.as_bytes())
    }

    /// `len` bytes starting at `offset`, if present and valid UTF-8
    pub fn field(&self, offset: usize, len: usize) -> Option<&str> {
        let bytes = self.bytes.get(offset..offset.checked_add(len)?)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Everything from `offset` to the end
    pub fn tail(&self, offset: usize) -> &[u8] {
        self.bytes.get(offset..).unwrap_or_default()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.bytes);
        if self.truncated {
            write!(f, "Line({:?}..)", text)
        } else {
            write!(f, "Line({:?})", text)
        }
    }
}

/// Outcome of a terminated line
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Line(Line),
    /// The line exceeded the buffer; only its first `capacity` bytes remain
    Truncated(Line),
}

/// Bounded accumulator for one line
///
/// Once `capacity` bytes are held, the rest of the line is discarded until
/// its terminator arrives. The kept prefix is still delivered, marked
/// truncated.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    capacity: usize,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    /// Append one byte; reports the outcome when `byte` terminates the line
    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        if byte == LINE_END {
            return Some(self.finish());
        }

        if self.buf.len() < self.capacity {
            self.buf.push(byte);
        } else {
            self.overflowed = true;
        }
        None
    }

    fn finish(&mut self) -> LineEvent {
        let overflowed = std::mem::take(&mut self.overflowed);
        let mut content = std::mem::replace(&mut self.buf, Vec::with_capacity(self.capacity));

        if content.last() == Some(&b'\r') {
            content.pop();
        }
        if overflowed {
            LineEvent::Truncated(Line::truncated(content))
        } else {
            LineEvent::Line(Line::new(content))
        }
    }

    /// Bytes of the current, unterminated line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.overflowed = false;
    }
}

/// Turns the transport byte stream into lines
///
/// A partial line survives across calls to [`poll`](Self::poll), so bytes
/// are never lost between two polling loops.
#[derive(Debug)]
pub struct LineReader {
    buffer: LineBuffer,
    overflows: u64,
}

impl LineReader {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: LineBuffer::new(capacity),
            overflows: 0,
        }
    }

    /// Feed one byte, returning a line if it completed one
    pub fn feed(&mut self, byte: u8) -> Option<Line> {
        match self.buffer.push(byte)? {
            LineEvent::Line(line) => Some(line),
            LineEvent::Truncated(line) => {
                self.overflows += 1;
                debug!("Line overflow, keeping first {} bytes", line.len());
                metrics::counter!("bt_line_overflow_total").increment(1);
                Some(line)
            }
        }
    }

    /// Read from the transport until one line completes or no bytes remain
    pub fn poll(&mut self, transport: &SerialTransport) -> Option<Line> {
        while let Some(byte) = transport.try_receive() {
            if let Some(line) = self.feed(byte) {
                return Some(line);
            }
        }
        None
    }

    /// Forget any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Lines truncated for exceeding the capacity
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_CAPACITY)
    }
}
