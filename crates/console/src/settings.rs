//! Layered configuration
//!
//! Built-in defaults, then `bt-console.toml` (or the file given on the
//! command line), then `BTCONSOLE__*` environment variables, e.g.
//! `BTCONSOLE__TRANSPORT__DEVICE=/dev/ttyS1` or
//! `BTCONSOLE__MANAGER__BLUETOOTH__SERVICE_NAME=Snake`.

use bt_manager::ManagerConfig;
use config::{Config, ConfigError, Environment, File, Source};
use serde::{Deserialize, Serialize};
use serial_transport::TransportConfig;
use std::path::Path;

pub const DEFAULT_FILE: &str = "bt-console";
pub const ENV_PREFIX: &str = "BTCONSOLE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub transport: TransportConfig,
    pub manager: ManagerConfig,
}

/// Load the configuration; an explicit `path` must exist
pub fn load(path: Option<&Path>) -> Result<ConsoleConfig, ConfigError> {
    match path {
        Some(path) => layered(File::from(path).required(true)),
        None => layered(File::with_name(DEFAULT_FILE).required(false)),
    }
}

fn layered(file: impl Source + Send + Sync + 'static) -> Result<ConsoleConfig, ConfigError> {
    Config::builder()
        .add_source(Config::try_from(&ConsoleConfig::default())?)
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
