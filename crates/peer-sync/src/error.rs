//! Frame decoding errors

use bt_protocol::BtError;
use thiserror::Error;

/// Why a received line is not a valid frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Unknown frame tag {0:?}")]
    UnknownTag(char),

    #[error("Frame {tag:?} has {len} bytes, expected {expected}")]
    BadLength {
        tag: char,
        len: usize,
        expected: usize,
    },

    #[error("Invalid hex digit in field at offset {offset}")]
    BadDigit { offset: usize },
}

impl From<FrameError> for BtError {
    fn from(e: FrameError) -> Self {
        BtError::ProtocolMismatch(e.to_string())
    }
}
