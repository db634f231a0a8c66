//! Bluetooth Module Protocol Implementation
//!
//! This crate drives the Bluetooth serial module through its AT command
//! dialect: line assembly from the UART transport, command/response
//! exchanges with deadlines, command/data mode switching, device inquiry
//! and service lookup, and the server/client connection handshake.

mod address;
mod clock;
mod command;
mod config;
mod connection;
mod discovery;
mod error;
mod indicator;
mod line;
mod link;
mod session;

pub mod hex;
pub mod response;

pub use address::BtAddress;
pub use clock::{Clock, Deadline, ManualClock, TokioClock};
pub use command::AtCommand;
pub use config::BtConfig;
pub use connection::{AcceptDecision, ConnectionCoordinator, READY_LINE};
pub use discovery::{
    DiscoveredPeer, DiscoveryDirectory, InquiryOutcome, ServiceLookup, ServiceName, MAX_PEERS,
};
pub use error::BtError;
pub use indicator::{ActivityIndicator, Glyph, NoIndicator, Spinner};
pub use line::{Line, LineBuffer, LineEvent, LineReader, DEFAULT_LINE_CAPACITY};
pub use link::{LinkState, ModemMode};
pub use response::{Response, ResponseRule};
pub use session::CommandSession;

/// Fixed literals of the module's wire protocol
pub mod wire {
    /// Escape sequence forcing the module into command mode
    pub const ESCAPE: &str = "+++";
    /// Terminator of every AT command
    pub const COMMAND_END: &str = "\r";
    /// Terminator of every response line and application frame
    pub const LINE_END: u8 = b'\n';
    /// Length of a Bluetooth address in hex digits
    pub const ADDRESS_LEN: usize = 12;
    /// Longest service or local name the module reports
    pub const NAME_MAX: usize = 16;
}
