//! Two-digit hexadecimal codec for application frames
//!
//! Each byte travels as two characters from `0-9A-F`. Decoding never
//! panics; invalid digits are reported to the caller.

use serde::{Deserialize, Serialize};

const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Placeholder the deployed decoder starts from before reading digits
const LENIENT_SEED: u8 = 99;

/// Encode one byte as two upper-case hex digits
pub fn encode(value: u8) -> [u8; 2] {
    [DIGITS[(value >> 4) as usize], DIGITS[(value & 0x0F) as usize]]
}

/// Append the two-digit encoding of `value`
pub fn encode_into(buf: &mut Vec<u8>, value: u8) {
    buf.extend_from_slice(&encode(value));
}

fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Decode two hex digits, rejecting anything outside `0-9A-F`
pub fn decode(pair: [u8; 2]) -> Option<u8> {
    Some(nibble(pair[0])? << 4 | nibble(pair[1])?)
}

/// Result of a best-effort decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub value: u8,
    pub valid: bool,
}

/// Decode the way deployed consoles do: an invalid digit leaves the
/// placeholder bits in place and only clears `valid`
pub fn decode_lenient(pair: [u8; 2]) -> Decoded {
    let high = nibble(pair[0]);
    let low = nibble(pair[1]);

    let mut value = high.unwrap_or(LENIENT_SEED) << 4;
    if let Some(low) = low {
        value |= low;
    }

    Decoded {
        value,
        valid: high.is_some() && low.is_some(),
    }
}

/// How frame decoding treats invalid hex digits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HexPolicy {
    /// Reject the frame
    #[default]
    Strict,
    /// Accept the best-effort value, as deployed consoles do
    Lenient,
}

impl HexPolicy {
    /// Decode under this policy; `None` only for strict rejections
    pub fn decode(self, pair: [u8; 2]) -> Option<u8> {
        match self {
            HexPolicy::Strict => decode(pair),
            HexPolicy::Lenient => Some(decode_lenient(pair).value),
        }
    }
}
