use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{
    DEVICE_NAME_MAX_LEN, WIFI_PASSWORD_MAX_LEN, WIFI_PASSWORD_MIN_LEN, WIFI_SSID_MAX_LEN,
};
use crate::error::{GatewayError, GatewayResult};
use crate::service::JobType;

pub const JOB_REBOOT_DELAY_DEFAULT_MS: u32 = 1_000;
pub const JOB_REBOOT_DELAY_MAX_MS: u32 = 60_000;

/// Parses a request body, normalizing any JSON shape problem to
/// `InvalidArg`.
pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> GatewayResult<T> {
    serde_json::from_slice(bytes).map_err(|_| GatewayError::InvalidArg)
}

fn valid_short_addr(value: u16) -> bool {
    value > 0
}

/// `POST /control` — send a ZCL On/Off command.
#[derive(Clone, Debug, Deserialize)]
pub struct ControlRequest {
    pub addr: u16,
    pub ep: u8,
    pub cmd: u8,
}

impl ControlRequest {
    pub fn validate(&self) -> GatewayResult<()> {
        if !valid_short_addr(self.addr) {
            return Err(GatewayError::InvalidArg);
        }
        if self.ep == 0 || self.ep > 240 {
            return Err(GatewayError::InvalidArg);
        }
        if self.cmd > 1 {
            return Err(GatewayError::InvalidArg);
        }
        Ok(())
    }
}

/// `POST /delete` — remove a device.
#[derive(Clone, Debug, Deserialize)]
pub struct DeleteRequest {
    pub short_addr: u16,
}

impl DeleteRequest {
    pub fn validate(&self) -> GatewayResult<()> {
        if !valid_short_addr(self.short_addr) {
            return Err(GatewayError::InvalidArg);
        }
        Ok(())
    }
}

/// `POST /rename` — rename a device.
#[derive(Clone, Debug, Deserialize)]
pub struct RenameRequest {
    pub short_addr: u16,
    pub name: String,
}

impl RenameRequest {
    pub fn validate(&self) -> GatewayResult<()> {
        if !valid_short_addr(self.short_addr) {
            return Err(GatewayError::InvalidArg);
        }
        if self.name.is_empty() || self.name.len() > DEVICE_NAME_MAX_LEN {
            return Err(GatewayError::InvalidArg);
        }
        Ok(())
    }
}

/// `POST /settings/wifi` — save credentials and reboot.
#[derive(Clone, Debug, Deserialize)]
pub struct WifiSaveRequest {
    pub ssid: String,
    pub password: String,
}

impl WifiSaveRequest {
    pub fn validate(&self) -> GatewayResult<()> {
        if self.ssid.is_empty() || self.ssid.len() > WIFI_SSID_MAX_LEN {
            return Err(GatewayError::InvalidArg);
        }
        if self.password.len() < WIFI_PASSWORD_MIN_LEN
            || self.password.len() > WIFI_PASSWORD_MAX_LEN
        {
            return Err(GatewayError::InvalidArg);
        }
        Ok(())
    }
}

/// `POST /jobs` — queue an asynchronous operation.
#[derive(Clone, Debug, Deserialize)]
pub struct JobSubmitRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub reboot_delay_ms: Option<u32>,
}

impl JobSubmitRequest {
    pub fn job_type(&self) -> GatewayResult<JobType> {
        JobType::parse(&self.job_type).ok_or(GatewayError::InvalidArg)
    }

    pub fn reboot_delay_ms(&self) -> GatewayResult<u32> {
        match self.reboot_delay_ms {
            None => Ok(JOB_REBOOT_DELAY_DEFAULT_MS),
            Some(delay) if delay <= JOB_REBOOT_DELAY_MAX_MS => Ok(delay),
            Some(_) => Err(GatewayError::InvalidArg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(addr: u16, ep: u8, cmd: u8) -> GatewayResult<()> {
        ControlRequest { addr, ep, cmd }.validate()
    }

    #[test]
    fn control_boundaries() {
        assert_eq!(control(0, 1, 1), Err(GatewayError::InvalidArg));
        assert!(control(1, 1, 1).is_ok());
        assert!(control(65535, 240, 0).is_ok());
        assert_eq!(control(1, 0, 1), Err(GatewayError::InvalidArg));
        assert_eq!(control(1, 241, 1), Err(GatewayError::InvalidArg));
        assert_eq!(control(1, 1, 2), Err(GatewayError::InvalidArg));
    }

    #[test]
    fn control_parses_from_json() {
        let req: ControlRequest = parse_body(br#"{"addr":4097,"ep":1,"cmd":1}"#).unwrap();
        assert_eq!(req.addr, 0x1001);
        // Out-of-range numbers fail at the parse step.
        assert!(parse_body::<ControlRequest>(br#"{"addr":70000,"ep":1,"cmd":1}"#).is_err());
        assert!(parse_body::<ControlRequest>(b"not json").is_err());
    }

    #[test]
    fn delete_rejects_zero_addr() {
        assert_eq!(
            DeleteRequest { short_addr: 0 }.validate(),
            Err(GatewayError::InvalidArg)
        );
        assert!(DeleteRequest { short_addr: 65535 }.validate().is_ok());
    }

    #[test]
    fn rename_name_boundaries() {
        let rename = |name: &str| {
            RenameRequest {
                short_addr: 1,
                name: name.to_string(),
            }
            .validate()
        };
        assert_eq!(rename(""), Err(GatewayError::InvalidArg));
        assert!(rename("x").is_ok());
        assert!(rename(&"n".repeat(31)).is_ok());
        assert_eq!(rename(&"n".repeat(32)), Err(GatewayError::InvalidArg));
    }

    #[test]
    fn wifi_save_boundaries() {
        let save = |ssid: &str, password: &str| {
            WifiSaveRequest {
                ssid: ssid.to_string(),
                password: password.to_string(),
            }
            .validate()
        };
        assert!(save("a", "12345678").is_ok());
        assert!(save(&"s".repeat(32), &"p".repeat(64)).is_ok());
        assert_eq!(save("", "12345678"), Err(GatewayError::InvalidArg));
        assert_eq!(save(&"s".repeat(33), "12345678"), Err(GatewayError::InvalidArg));
        assert_eq!(save("net", "1234567"), Err(GatewayError::InvalidArg));
        assert_eq!(save("net", &"p".repeat(65)), Err(GatewayError::InvalidArg));
    }

    #[test]
    fn job_submit_type_and_delay() {
        let req: JobSubmitRequest = parse_body(br#"{"type":"scan"}"#).unwrap();
        assert_eq!(req.job_type().unwrap(), JobType::WifiScan);
        assert_eq!(req.reboot_delay_ms().unwrap(), JOB_REBOOT_DELAY_DEFAULT_MS);

        let req: JobSubmitRequest =
            parse_body(br#"{"type":"reboot","reboot_delay_ms":60000}"#).unwrap();
        assert_eq!(req.job_type().unwrap(), JobType::Reboot);
        assert_eq!(req.reboot_delay_ms().unwrap(), 60_000);

        let req: JobSubmitRequest =
            parse_body(br#"{"type":"reboot","reboot_delay_ms":60001}"#).unwrap();
        assert_eq!(req.reboot_delay_ms(), Err(GatewayError::InvalidArg));

        let req: JobSubmitRequest = parse_body(br#"{"type":"defrag"}"#).unwrap();
        assert_eq!(req.job_type(), Err(GatewayError::InvalidArg));
    }
}
