use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::WifiCredentials;
use crate::error::{GatewayError, GatewayResult};
use crate::service::{ConfigService, StateStore, WifiState};

pub const WIFI_STA_MAX_RETRY: u32 = 10;
pub const WIFI_STA_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub const WIFI_AP_FALLBACK_SSID_PREFIX: &str = "ZigbeeGW-";
pub const WIFI_AP_FALLBACK_PASSWORD: &str = "Zigbee-1234";
pub const WIFI_AP_FALLBACK_CHANNEL: u8 = 1;
pub const WIFI_AP_FALLBACK_MAX_CONNECTIONS: u8 = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WifiMode {
    Sta,
    Ap,
    ApSta,
}

/// One scanned access point.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct WifiApInfo {
    pub ssid: String,
    pub rssi: i8,
    pub auth: u8,
}

/// Fallback AP parameters handed to the driver.
#[derive(Clone, Debug)]
pub struct ApConfig {
    pub ssid: String,
    pub password: String,
    pub channel: u8,
    pub max_connections: u8,
    pub power_save: bool,
}

/// Platform Wi-Fi driver port. One `connect_sta` call is a single
/// association attempt including IP acquisition.
#[async_trait]
pub trait WifiDriver: Send + Sync {
    async fn connect_sta(&self, creds: &WifiCredentials) -> GatewayResult<()>;
    async fn start_fallback_ap(&self, config: &ApConfig) -> GatewayResult<()>;
    async fn mode(&self) -> GatewayResult<WifiMode>;
    async fn set_mode(&self, mode: WifiMode) -> GatewayResult<()>;
    async fn scan(&self) -> GatewayResult<Vec<WifiApInfo>>;
    fn softap_mac(&self) -> [u8; 6];
}

#[derive(Clone, Debug)]
pub struct WifiSettings {
    pub max_retry: u32,
    pub connect_timeout_ms: u64,
    pub default_credentials: WifiCredentials,
    pub fallback_ssid_prefix: String,
    pub fallback_password: String,
    pub fallback_channel: u8,
    pub fallback_max_connections: u8,
}

impl Default for WifiSettings {
    fn default() -> Self {
        WifiSettings {
            max_retry: WIFI_STA_MAX_RETRY,
            connect_timeout_ms: WIFI_STA_CONNECT_TIMEOUT_MS,
            default_credentials: WifiCredentials::default(),
            fallback_ssid_prefix: WIFI_AP_FALLBACK_SSID_PREFIX.to_string(),
            fallback_password: WIFI_AP_FALLBACK_PASSWORD.to_string(),
            fallback_channel: WIFI_AP_FALLBACK_CHANNEL,
            fallback_max_connections: WIFI_AP_FALLBACK_MAX_CONNECTIONS,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WifiOutcome {
    /// STA link is up; Zigbee startup proceeds.
    StaConnected,
    /// Fallback AP is serving the setup UI; Zigbee startup is deferred.
    FallbackAp,
}

/// STA-first, AP-fallback connection manager. Publishes the Wi-Fi
/// snapshot into the state store at every transition.
pub struct WifiService {
    driver: Arc<dyn WifiDriver>,
    config: Arc<ConfigService>,
    state: Arc<StateStore>,
    settings: WifiSettings,
}

impl WifiService {
    pub fn new(
        driver: Arc<dyn WifiDriver>,
        config: Arc<ConfigService>,
        state: Arc<StateStore>,
        settings: WifiSettings,
    ) -> Arc<Self> {
        Arc::new(WifiService {
            driver,
            config,
            state,
            settings,
        })
    }

    /// Boot-time connect flow: persisted credentials (validated) or the
    /// compile-time defaults, then STA with bounded retries inside the
    /// overall timeout, then the fallback AP.
    pub async fn connect(&self) -> GatewayResult<WifiOutcome> {
        let (creds, loaded_from_nvs) = match self.config.load_wifi_credentials() {
            Ok(Some(creds)) => {
                log::info!("loaded Wi-Fi settings from storage");
                (creds, true)
            }
            Ok(None) => {
                log::info!("using default Wi-Fi credentials");
                (self.settings.default_credentials.clone(), false)
            }
            Err(e) => {
                log::warn!("failed to load Wi-Fi settings: {e}");
                (self.settings.default_credentials.clone(), false)
            }
        };

        self.state.set_wifi(WifiState {
            sta_connected: false,
            fallback_ap_active: false,
            loaded_from_nvs,
            active_ssid: creds.ssid.clone(),
        });

        let attempt = self.connect_with_retries(&creds);
        let connected = tokio::time::timeout(
            Duration::from_millis(self.settings.connect_timeout_ms),
            attempt,
        )
        .await;
        let timed_out = connected.is_err();

        match connected {
            Ok(Ok(())) => {
                log::info!("connected to AP SSID '{}'", creds.ssid);
                self.state.set_wifi(WifiState {
                    sta_connected: true,
                    fallback_ap_active: false,
                    loaded_from_nvs,
                    active_ssid: creds.ssid,
                });
                Ok(WifiOutcome::StaConnected)
            }
            Ok(Err(_)) | Err(_) => {
                if timed_out {
                    log::error!(
                        "timed out waiting for Wi-Fi connection ({} ms)",
                        self.settings.connect_timeout_ms
                    );
                }
                self.start_fallback_ap(loaded_from_nvs).await
            }
        }
    }

    async fn connect_with_retries(&self, creds: &WifiCredentials) -> GatewayResult<()> {
        let mut retry = 0;
        loop {
            match self.driver.connect_sta(creds).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if retry >= self.settings.max_retry {
                        log::warn!("connect to AP failed: {e}");
                        return Err(GatewayError::Fail);
                    }
                    retry += 1;
                    log::warn!(
                        "retry to connect to AP (attempt {retry}/{}): {e}",
                        self.settings.max_retry
                    );
                }
            }
        }
    }

    async fn start_fallback_ap(&self, loaded_from_nvs: bool) -> GatewayResult<WifiOutcome> {
        let ssid = self.fallback_ssid();
        let config = ApConfig {
            ssid: ssid.clone(),
            password: self.settings.fallback_password.clone(),
            channel: self.settings.fallback_channel,
            max_connections: self.settings.fallback_max_connections,
            power_save: false,
        };
        self.driver.start_fallback_ap(&config).await?;
        log::warn!("fallback AP started: SSID={ssid}");
        self.state.set_wifi(WifiState {
            sta_connected: false,
            fallback_ap_active: true,
            loaded_from_nvs,
            active_ssid: ssid,
        });
        Ok(WifiOutcome::FallbackAp)
    }

    /// Deterministic fallback SSID: prefix plus the last two SoftAP MAC
    /// octets as uppercase hex.
    pub fn fallback_ssid(&self) -> String {
        let mac = self.driver.softap_mac();
        format!(
            "{}{:02X}{:02X}",
            self.settings.fallback_ssid_prefix, mac[4], mac[5]
        )
    }

    /// Synchronous scan. AP-only mode is promoted to APSTA first and left
    /// that way; transient `InvalidState` from the driver is retried.
    pub async fn scan(&self) -> GatewayResult<Vec<WifiApInfo>> {
        let mode = self.driver.mode().await?;
        if mode == WifiMode::Ap {
            self.driver.set_mode(WifiMode::ApSta).await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let mut last_err = GatewayError::Fail;
        for _attempt in 0..3 {
            match self.driver.scan().await {
                Ok(list) => return Ok(list),
                Err(GatewayError::InvalidState) => {
                    last_err = GatewayError::InvalidState;
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}
