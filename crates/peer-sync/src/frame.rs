//! Wire format of synchronisation frames
//!
//! ```text
//! S <p1_y> <p2_y> <ball_x> <ball_y> <score1> <score2> \n    14 bytes
//! C <key> \n                                               4 bytes
//! ```
//!
//! Every field is one byte written as two upper-case hex digits.

use crate::error::FrameError;
use bt_protocol::hex::{self, HexPolicy};
use serde::{Deserialize, Serialize};

/// Content length of a status frame, newline excluded
pub const STATUS_FRAME_LEN: usize = 13;
/// Content length of a key frame, newline excluded
pub const KEY_FRAME_LEN: usize = 3;

const STATUS_TAG: u8 = b'S';
const KEY_TAG: u8 = b'C';

/// Authoritative game state sent by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub p1_y: u8,
    pub p2_y: u8,
    pub ball_x: u8,
    pub ball_y: u8,
    pub score1: u8,
    pub score2: u8,
}

impl GameStatus {
    fn fields(&self) -> [u8; 6] {
        [
            self.p1_y,
            self.p2_y,
            self.ball_x,
            self.ball_y,
            self.score1,
            self.score2,
        ]
    }

    fn from_fields(f: [u8; 6]) -> Self {
        Self {
            p1_y: f[0],
            p2_y: f[1],
            ball_x: f[2],
            ball_y: f[3],
            score1: f[4],
            score2: f[5],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncFrame {
    Status(GameStatus),
    KeyPress { key: u8 },
}

impl SyncFrame {
    /// Wire bytes including the trailing newline
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STATUS_FRAME_LEN + 1);
        match self {
            SyncFrame::Status(status) => {
                buf.push(STATUS_TAG);
                for field in status.fields() {
                    hex::encode_into(&mut buf, field);
                }
            }
            SyncFrame::KeyPress { key } => {
                buf.push(KEY_TAG);
                hex::encode_into(&mut buf, *key);
            }
        }
        buf.push(bt_protocol::wire::LINE_END);
        buf
    }

    /// Decode one line, newline already removed
    ///
    /// The tag and exact length are checked before any field is read.
    pub fn decode(line: &[u8], policy: HexPolicy) -> Result<Self, FrameError> {
        let (&tag, _) = line.split_first().ok_or(FrameError::BadLength {
            tag: '?',
            len: 0,
            expected: KEY_FRAME_LEN,
        })?;

        let expected = match tag {
            STATUS_TAG => STATUS_FRAME_LEN,
            KEY_TAG => KEY_FRAME_LEN,
            other => return Err(FrameError::UnknownTag(char::from(other))),
        };
        if line.len() != expected {
            return Err(FrameError::BadLength {
                tag: char::from(tag),
                len: line.len(),
                expected,
            });
        }

        let field = |index: usize| {
            let offset = 1 + index * 2;
            policy
                .decode([line[offset], line[offset + 1]])
                .ok_or(FrameError::BadDigit { offset })
        };

        if tag == KEY_TAG {
            return Ok(SyncFrame::KeyPress { key: field(0)? });
        }

        let mut fields = [0u8; 6];
        for (index, slot) in fields.iter_mut().enumerate() {
            *slot = field(index)?;
        }
        Ok(SyncFrame::Status(GameStatus::from_fields(fields)))
    }
}
