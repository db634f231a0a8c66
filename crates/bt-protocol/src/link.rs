//! Link and modem mode state

use crate::address::BtAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the one logical link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    CommandMode,
    Inquiring,
    /// Discoverable, waiting for `CONNECT`
    Listening,
    /// A client connected; the user has not decided yet
    AwaitingAcceptance { peer: BtAddress },
    Connecting { peer: BtAddress },
    Connected { peer: BtAddress },
}

impl LinkState {
    pub fn peer(&self) -> Option<BtAddress> {
        match self {
            LinkState::AwaitingAcceptance { peer }
            | LinkState::Connecting { peer }
            | LinkState::Connected { peer } => Some(*peer),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected { .. })
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Idle => f.write_str("idle"),
            LinkState::CommandMode => f.write_str("in command mode"),
            LinkState::Inquiring => f.write_str("inquiring"),
            LinkState::Listening => f.write_str("listening"),
            LinkState::AwaitingAcceptance { peer } => write!(f, "awaiting acceptance of {peer}"),
            LinkState::Connecting { peer } => write!(f, "connecting to {peer}"),
            LinkState::Connected { peer } => write!(f, "connected to {peer}"),
        }
    }
}

/// Mode the user last selected for the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModemMode {
    Command,
    #[default]
    Data,
}

impl ModemMode {
    pub fn toggled(self) -> Self {
        match self {
            ModemMode::Command => ModemMode::Data,
            ModemMode::Data => ModemMode::Command,
        }
    }
}
