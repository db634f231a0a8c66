//! Bluetooth device addresses

use crate::error::BtError;
use crate::wire::ADDRESS_LEN;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 48-bit device address as the module prints it: 12 upper-case hex digits
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BtAddress([u8; ADDRESS_LEN]);

impl BtAddress {
    /// Parse from 12 hex digits, accepting lower case
    pub fn parse(text: &str) -> Result<Self, BtError> {
        let bytes = text.as_bytes();
        if bytes.len() != ADDRESS_LEN || !bytes.iter().all(u8::is_ascii_hexdigit) {
            return Err(BtError::InvalidAddress(text.to_string()));
        }

        let mut digits = [0u8; ADDRESS_LEN];
        for (slot, byte) in digits.iter_mut().zip(bytes) {
            *slot = byte.to_ascii_uppercase();
        }
        Ok(Self(digits))
    }

    /// Address digits as text
    pub fn as_str(&self) -> &str {
        // Constructed from validated ASCII only
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl FromStr for BtAddress {
    type Err = BtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for BtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BtAddress({})", self.as_str())
    }
}

impl Serialize for BtAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BtAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_case() {
        let address = BtAddress::parse("0012f3a1b2c3").unwrap();
        assert_eq!(address.as_str(), "0012F3A1B2C3");
        assert_eq!(address.to_string(), "0012F3A1B2C3");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(BtAddress::parse("0012F3A1B2C").is_err());
        assert!(BtAddress::parse("0012F3A1B2C3D").is_err());
        assert!(BtAddress::parse("0012F3A1B2CG").is_err());
        assert!(matches!(
            "COMPLETE".parse::<BtAddress>(),
            Err(BtError::InvalidAddress(_))
        ));
    }
}
