//! Bluetooth Console
//!
//! Command-line front end for the Bluetooth subsystem: opens the serial
//! port, builds a [`BluetoothManager`](bt_manager::BluetoothManager) and runs
//! one user-level operation per invocation.

mod cli;
mod commands;
pub mod settings;
mod terminal;

pub use cli::{Cli, Command};
pub use commands::run;
pub use settings::ConsoleConfig;
pub use terminal::{StderrIndicator, StdioTerminal};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `level`. Logs go to stderr so stdout stays free for
/// the bridge and for `--json` output.
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}
