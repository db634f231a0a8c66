//! Transport configuration

use serde::{Deserialize, Serialize};

/// UART and flow-control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub device: String,

    /// Line rate, 8N1
    pub baud_rate: u32,

    /// RTS is deasserted once RX occupancy exceeds `capacity - rx_flow_limit`
    pub rx_flow_limit: usize,

    /// RTS is reasserted once RX occupancy drains to this level
    pub rx_resume_level: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            rx_flow_limit: 16,
            rx_resume_level: 64,
        }
    }
}

impl TransportConfig {
    /// Occupancy above which the remote side is told to stop sending
    pub fn high_water(&self, capacity: usize) -> usize {
        capacity.saturating_sub(self.rx_flow_limit)
    }

    /// Occupancy at or below which the remote side may send again
    pub fn low_water(&self, capacity: usize) -> usize {
        self.rx_resume_level.min(self.high_water(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermarks() {
        let config = TransportConfig::default();
        assert_eq!(config.high_water(128), 112);
        assert_eq!(config.low_water(128), 64);
    }

    #[test]
    fn test_low_water_never_above_high_water() {
        let config = TransportConfig {
            rx_flow_limit: 100,
            ..Default::default()
        };
        assert_eq!(config.high_water(128), 28);
        assert_eq!(config.low_water(128), 28);
    }
}
