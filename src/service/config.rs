use std::sync::{Arc, Mutex};

use crate::config::{
    FactoryResetReport, WifiCredentials, WIFI_PASSWORD_MAX_LEN, WIFI_PASSWORD_MIN_LEN,
    WIFI_SSID_MAX_LEN,
};
use crate::error::{status_name, GatewayError, GatewayResult};
use crate::store::{
    ConfigRepository, DeviceRepository, KvStore, SchemaStore, ZB_FCT_PARTITION,
    ZB_STORAGE_PARTITION,
};

/// Settings façade over the persistence layer: schema lifecycle, validated
/// Wi-Fi credentials, and the factory-reset sweep.
pub struct ConfigService {
    schema: Arc<SchemaStore>,
    config_repo: Arc<ConfigRepository>,
    device_repo: Arc<DeviceRepository>,
    kv: Arc<KvStore>,
    last_reset_report: Mutex<FactoryResetReport>,
}

impl ConfigService {
    pub fn new(
        schema: Arc<SchemaStore>,
        config_repo: Arc<ConfigRepository>,
        device_repo: Arc<DeviceRepository>,
        kv: Arc<KvStore>,
    ) -> Arc<Self> {
        Arc::new(ConfigService {
            schema,
            config_repo,
            device_repo,
            kv,
            last_reset_report: Mutex::new(FactoryResetReport::default()),
        })
    }

    pub fn init_or_migrate(&self) -> GatewayResult<()> {
        self.schema.init_or_migrate()
    }

    pub fn schema_version(&self) -> GatewayResult<i32> {
        self.schema.version().map(|(version, _found)| version)
    }

    pub fn validate_wifi_credentials(&self, creds: &WifiCredentials) -> GatewayResult<()> {
        let ssid_len = creds.ssid.len();
        let pass_len = creds.password.len();
        if ssid_len == 0 || ssid_len > WIFI_SSID_MAX_LEN {
            return Err(GatewayError::InvalidArg);
        }
        if pass_len < WIFI_PASSWORD_MIN_LEN || pass_len > WIFI_PASSWORD_MAX_LEN {
            return Err(GatewayError::InvalidArg);
        }
        Ok(())
    }

    pub fn save_wifi_credentials(&self, creds: &WifiCredentials) -> GatewayResult<()> {
        self.validate_wifi_credentials(creds)?;
        self.config_repo.save_wifi_credentials(creds)
    }

    /// Loads stored credentials, discarding a pair that would not pass the
    /// save validation; a half-written or invalid pair reads as absent.
    pub fn load_wifi_credentials(&self) -> GatewayResult<Option<WifiCredentials>> {
        let Some(creds) = self.config_repo.load_wifi_credentials()? else {
            return Ok(None);
        };
        if self.validate_wifi_credentials(&creds).is_err() {
            log::warn!("ignoring invalid Wi-Fi credentials loaded from storage");
            return Ok(None);
        }
        Ok(Some(creds))
    }

    /// Clears Wi-Fi credentials and device records, then erases both
    /// opaque Zigbee partitions. Partial failures are recorded in the
    /// report; a missing Zigbee partition is not an error.
    pub fn factory_reset(&self) -> GatewayResult<()> {
        let wifi = self.config_repo.clear_wifi_credentials();
        let devices = self.device_repo.clear();
        let zigbee_storage = self.kv.erase_partition(ZB_STORAGE_PARTITION).map(|_| ());
        let zigbee_fct = self.kv.erase_partition(ZB_FCT_PARTITION).map(|_| ());

        let report = FactoryResetReport {
            wifi,
            devices,
            zigbee_storage,
            zigbee_fct,
        };
        log::info!(
            "factory reset result: wifi={}, devices={}, zigbee_storage={}, zigbee_fct={}",
            status_name(&report.wifi),
            status_name(&report.devices),
            status_name(&report.zigbee_storage),
            status_name(&report.zigbee_fct),
        );
        *self.last_reset_report.lock().expect("lock reset report") = report.clone();

        report.wifi?;
        report.devices?;
        match report.zigbee_storage {
            Ok(()) | Err(GatewayError::NotFound) => {}
            Err(e) => return Err(e),
        }
        match report.zigbee_fct {
            Ok(()) | Err(GatewayError::NotFound) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn last_factory_reset_report(&self) -> FactoryResetReport {
        self.last_reset_report
            .lock()
            .expect("lock reset report")
            .clone()
    }
}
