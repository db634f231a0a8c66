//! AT command set of the Bluetooth module

use crate::address::BtAddress;
use crate::wire::{COMMAND_END, ESCAPE};
use std::fmt;

/// Commands understood by the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    /// `+++`, leave data mode
    Escape,
    /// `ATI`, module identification
    Identify,
    /// `AT+BTLNM`, read the local name
    ReadLocalName,
    /// `AT+BTLNM="<name>"`, set the local name
    WriteLocalName(String),
    /// `AT+BTBDA`, read the local address
    ReadLocalAddress,
    /// `AT+BTSET=1,<addr>`, set the local address (persisted by the module)
    WriteLocalAddress(BtAddress),
    /// `AT+BTINQ=<secs>`, run an inquiry
    Inquiry { secs: u8 },
    /// `AT+BTSDP=<addr>`, list a device's services
    ServiceDiscovery(BtAddress),
    /// `AT+BTCAN`, cancel pending operations
    Cancel,
    /// `AT+BTSRV=1`, data mode with default server
    ServerMode,
    /// `AT+BTSRV=<timeout>,"<name>"`, discoverable server under a service name
    Listen { timeout_secs: u16, service: String },
    /// `AT+BTCLT="<addr>",<timeout>,<retries>`, connect as client
    Connect {
        address: BtAddress,
        timeout_secs: u16,
        retries: u8,
    },
    /// `AT+BTFLS`, save settings to flash
    SaveSettings,
}

impl AtCommand {
    /// Exact bytes to put on the wire
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            AtCommand::Escape => "escape",
            AtCommand::Identify => "ATI",
            AtCommand::ReadLocalName | AtCommand::WriteLocalName(_) => "AT+BTLNM",
            AtCommand::ReadLocalAddress => "AT+BTBDA",
            AtCommand::WriteLocalAddress(_) => "AT+BTSET",
            AtCommand::Inquiry { .. } => "AT+BTINQ",
            AtCommand::ServiceDiscovery(_) => "AT+BTSDP",
            AtCommand::Cancel => "AT+BTCAN",
            AtCommand::ServerMode | AtCommand::Listen { .. } => "AT+BTSRV",
            AtCommand::Connect { .. } => "AT+BTCLT",
            AtCommand::SaveSettings => "AT+BTFLS",
        }
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtCommand::Escape => return f.write_str(ESCAPE),
            AtCommand::Identify => f.write_str("ATI")?,
            AtCommand::ReadLocalName => f.write_str("AT+BTLNM")?,
            AtCommand::WriteLocalName(name) => write!(f, "AT+BTLNM=\"{}\"", name)?,
            AtCommand::ReadLocalAddress => f.write_str("AT+BTBDA")?,
            AtCommand::WriteLocalAddress(address) => write!(f, "AT+BTSET=1,{}", address)?,
            AtCommand::Inquiry { secs } => write!(f, "AT+BTINQ={}", secs)?,
            AtCommand::ServiceDiscovery(address) => write!(f, "AT+BTSDP={}", address)?,
            AtCommand::Cancel => f.write_str("AT+BTCAN")?,
            AtCommand::ServerMode => f.write_str("AT+BTSRV=1")?,
            AtCommand::Listen {
                timeout_secs,
                service,
            } => write!(f, "AT+BTSRV={},\"{}\"", timeout_secs, service)?,
            AtCommand::Connect {
                address,
                timeout_secs,
                retries,
            } => write!(f, "AT+BTCLT=\"{}\",{},{}", address, timeout_secs, retries)?,
            AtCommand::SaveSettings => f.write_str("AT+BTFLS")?,
        }
        f.write_str(COMMAND_END)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> BtAddress {
        BtAddress::parse("0012F3A1B2C3").unwrap()
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(AtCommand::Escape.to_wire(), "+++");
        assert_eq!(AtCommand::Identify.to_wire(), "ATI\r");
        assert_eq!(AtCommand::Inquiry { secs: 6 }.to_wire(), "AT+BTINQ=6\r");
        assert_eq!(
            AtCommand::ServiceDiscovery(addr()).to_wire(),
            "AT+BTSDP=0012F3A1B2C3\r"
        );
        assert_eq!(AtCommand::ServerMode.to_wire(), "AT+BTSRV=1\r");
        assert_eq!(
            AtCommand::Listen {
                timeout_secs: 20,
                service: "PingPongServer".into()
            }
            .to_wire(),
            "AT+BTSRV=20,\"PingPongServer\"\r"
        );
        assert_eq!(
            AtCommand::Connect {
                address: addr(),
                timeout_secs: 20,
                retries: 3
            }
            .to_wire(),
            "AT+BTCLT=\"0012F3A1B2C3\",20,3\r"
        );
    }

    #[test]
    fn test_settings_commands() {
        assert_eq!(
            AtCommand::WriteLocalName("Console".into()).to_wire(),
            "AT+BTLNM=\"Console\"\r"
        );
        assert_eq!(
            AtCommand::WriteLocalAddress(addr()).to_wire(),
            "AT+BTSET=1,0012F3A1B2C3\r"
        );
        assert_eq!(AtCommand::SaveSettings.to_wire(), "AT+BTFLS\r");
        assert_eq!(AtCommand::Cancel.name(), "AT+BTCAN");
    }
}
