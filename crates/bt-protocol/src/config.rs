//! Session timing and protocol settings

use crate::hex::HexPolicy;
use serde::{Deserialize, Serialize};

/// Settings for the command session, discovery and connection steps
///
/// Times are in milliseconds unless the name says otherwise. The defaults
/// match the module firmware's documented behaviour at a 10 ms tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BtConfig {
    /// Sleep between two polls of the line reader
    pub poll_interval_ms: u64,

    /// Silence required before and after the `+++` escape
    pub escape_guard_ms: u64,

    /// Wait after `+++` before the module accepts commands
    pub command_settle_ms: u64,

    /// Wait after `AT+BTCAN`
    pub cancel_settle_ms: u64,

    /// Inquiry length requested from the module
    pub inquiry_secs: u8,

    /// Extra time granted on top of the inquiry length
    pub inquiry_grace_ms: u64,

    pub service_lookup_timeout_ms: u64,

    /// Deadline for `AT+BTBDA` and `AT+BTLNM` replies
    pub local_query_timeout_ms: u64,

    /// Deadline of each client connect phase
    pub connect_timeout_ms: u64,

    /// Page timeout handed to `AT+BTCLT`
    pub client_connect_timeout_secs: u16,

    /// Page retries handed to `AT+BTCLT`
    pub client_connect_retries: u8,

    /// Listen timeout handed to `AT+BTSRV`
    pub server_timeout_secs: u16,

    /// Service name advertised by the server and required by the client filter
    pub service_name: String,

    /// Longest response line kept by the line reader
    pub line_capacity: usize,

    /// Wait between writing the local name and saving it to flash
    pub settings_settle_ms: u64,

    /// Reset pulse length at startup
    pub reset_pulse_ms: u64,

    /// Boot time of the module after reset is released
    pub reset_recovery_ms: u64,

    pub hex_policy: HexPolicy,
}

impl Default for BtConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            escape_guard_ms: 1_000,
            command_settle_ms: 1_500,
            cancel_settle_ms: 500,
            inquiry_secs: 6,
            inquiry_grace_ms: 500,
            service_lookup_timeout_ms: 6_000,
            local_query_timeout_ms: 200,
            connect_timeout_ms: 10_000,
            client_connect_timeout_secs: 20,
            client_connect_retries: 3,
            server_timeout_secs: 20,
            service_name: "PingPongServer".to_string(),
            line_capacity: crate::DEFAULT_LINE_CAPACITY,
            settings_settle_ms: 1_000,
            reset_pulse_ms: 20,
            reset_recovery_ms: 550,
            hex_policy: HexPolicy::Strict,
        }
    }
}

impl BtConfig {
    /// Settings accepting deployed consoles' best-effort hex frames
    pub fn compat() -> Self {
        Self {
            hex_policy: HexPolicy::Lenient,
            ..Default::default()
        }
    }

    /// Total time an inquiry may take
    pub fn inquiry_timeout_ms(&self) -> u64 {
        u64::from(self.inquiry_secs) * 1_000 + self.inquiry_grace_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BtConfig::default();
        assert_eq!(config.inquiry_timeout_ms(), 6_500);
        assert_eq!(config.service_name, "PingPongServer");
        assert_eq!(config.hex_policy, HexPolicy::Strict);
        assert_eq!(BtConfig::compat().hex_policy, HexPolicy::Lenient);
    }

    #[test]
    fn test_partial_override() {
        let config: BtConfig =
            serde_json::from_str(r#"{"inquiry_secs": 10, "hex_policy": "lenient"}"#).unwrap();
        assert_eq!(config.inquiry_timeout_ms(), 10_500);
        assert_eq!(config.hex_policy, HexPolicy::Lenient);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }
}
