use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

/// Project-wide device capacity. Component-local capacities (LQI cache,
/// repository blob) are defined in terms of this constant.
pub const MAX_DEVICES: usize = 10;

/// Maximum device name length in bytes, excluding any terminator.
pub const DEVICE_NAME_MAX_LEN: usize = 31;

pub const WIFI_SSID_MAX_LEN: usize = 32;
pub const WIFI_PASSWORD_MIN_LEN: usize = 8;
pub const WIFI_PASSWORD_MAX_LEN: usize = 64;

/// 64-bit factory-burned identifier, stable across joins.
pub type IeeeAddr = [u8; 8];

/// A joined Zigbee end-device. Identity is `short_addr`; the IEEE address
/// is what leave commands are addressed to after the short address is gone.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct DeviceRecord {
    pub short_addr: u16,
    pub ieee_addr: IeeeAddr,
    pub name: String,
}

impl DeviceRecord {
    pub fn new(short_addr: u16, ieee_addr: IeeeAddr, name: impl Into<String>) -> Self {
        DeviceRecord {
            short_addr,
            ieee_addr,
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        WifiCredentials {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

/// Per-target outcome of the factory-reset sweep.
#[derive(Clone, Debug)]
pub struct FactoryResetReport {
    pub wifi: GatewayResult<()>,
    pub devices: GatewayResult<()>,
    pub zigbee_storage: GatewayResult<()>,
    pub zigbee_fct: GatewayResult<()>,
}

impl Default for FactoryResetReport {
    fn default() -> Self {
        use crate::error::GatewayError;
        FactoryResetReport {
            wifi: Err(GatewayError::Fail),
            devices: Err(GatewayError::Fail),
            zigbee_storage: Err(GatewayError::Fail),
            zigbee_fct: Err(GatewayError::Fail),
        }
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 sequence.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("abcdef", 4), "abcd");
        assert_eq!(truncate_utf8("abc", 31), "abc");
        // Two-byte characters must not be split in half.
        assert_eq!(truncate_utf8("ééé", 3), "é");
        assert_eq!(truncate_utf8("ééé", 4), "éé");
    }
}
