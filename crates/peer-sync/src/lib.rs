//! Peer Synchronisation for Two-Console Games
//!
//! Once a link is up, the server side is authoritative: it streams status
//! frames (paddle and ball positions, scores) while the client streams the
//! key it is holding. Both sides share one cadence and drain incoming
//! frames before every send.

mod error;
mod frame;
mod sync;

pub use error::FrameError;
pub use frame::{GameStatus, SyncFrame, KEY_FRAME_LEN, STATUS_FRAME_LEN};
pub use sync::{PeerSync, Role, SyncConfig};
