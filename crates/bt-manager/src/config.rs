//! Manager configuration

use bt_protocol::BtConfig;
use peer_sync::SyncConfig;
use serde::{Deserialize, Serialize};

/// Everything the manager needs besides the serial port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub bluetooth: BtConfig,
    pub sync: SyncConfig,
    pub bridge: BridgeConfig,
    pub startup: StartupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Sleep when neither side had anything to pass on
    pub idle_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { idle_ms: 10 }
    }
}

/// Production identification sequence run after reset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Pause between the escape and `ATI`
    pub step_ms: u64,

    /// Time allowed for the name and address replies
    pub query_ms: u64,

    pub inquiry_secs: u8,

    /// Time allowed for the startup inquiry
    pub inquiry_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            step_ms: 500,
            query_ms: 1_000,
            inquiry_secs: 5,
            inquiry_ms: 6_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_override() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{"bluetooth": {"service_name": "Snake"}, "sync": {"status_interval_ms": 30}}"#,
        )
        .unwrap();
        assert_eq!(config.bluetooth.service_name, "Snake");
        assert_eq!(config.bluetooth.connect_timeout_ms, 10_000);
        assert_eq!(config.sync.status_interval_ms, 30);
        assert_eq!(config.bridge.idle_ms, 10);
        assert_eq!(config.startup.inquiry_secs, 5);
    }
}
