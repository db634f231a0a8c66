//! Bluetooth Subsystem Manager
//!
//! Owns everything the firmware keeps about the Bluetooth module: the
//! command session and its link state, the discovery directory, the reset
//! line and the user's selected mode. It also arbitrates the one serial
//! channel between the free-running terminal bridge and foreground
//! activities (inquiry, connection setup, gameplay).

mod arbiter;
mod bridge;
mod config;
mod manager;

pub use arbiter::{BridgeGate, ChannelArbiter};
pub use bridge::{run_bridge, ChannelTerminal, Terminal, TerminalHandle};
pub use config::{BridgeConfig, ManagerConfig, StartupConfig};
pub use manager::{BluetoothManager, NoResetLine, ResetLine, StartupReport};
