use bt_protocol::BtAddress;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive the console's Bluetooth module from a host
#[derive(Parser, Debug)]
#[command(name = "bt-console")]
#[command(author, version, about = "Bluetooth module console", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./bt-console.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    pub device: Option<String>,

    /// Logging verbosity when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pass bytes between this terminal and the module until Ctrl-C
    Bridge,

    /// Reset the module and run the identification sequence
    Startup,

    /// List nearby devices
    Inquiry,

    /// Run an inquiry, then list the services of the device in SLOT
    Services { slot: usize },

    /// Find devices offering the game service
    Search,

    /// Show the module's name and address
    Info,

    /// Change the name other devices see
    SetName { name: String },

    /// Change the module's own address
    SetAddress { address: BtAddress },

    /// Join a game server and follow its state until Ctrl-C
    Connect {
        address: BtAddress,
    },

    /// Host a game and wait for a client
    Listen {
        /// Accept the first client without asking
        #[arg(long)]
        accept: bool,
    },
}
