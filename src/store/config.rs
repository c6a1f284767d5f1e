use std::sync::{Arc, Mutex};

use crate::config::WifiCredentials;
use crate::error::{GatewayError, GatewayResult};
use crate::store::{KvStore, STORAGE_NAMESPACE};

const KEY_WIFI_SSID: &str = "wifi_ssid";
const KEY_WIFI_PASS: &str = "wifi_pass";

/// Persists the Wi-Fi credential pair as an atomic unit.
///
/// Save writes both keys then commits once; clear erases both then commits
/// once. Load treats a missing half as wholly absent, so a torn pair can
/// never leak out.
pub struct ConfigRepository {
    kv: Arc<KvStore>,
    lock: Mutex<()>,
}

impl ConfigRepository {
    pub fn new(kv: Arc<KvStore>) -> Arc<Self> {
        Arc::new(ConfigRepository {
            kv,
            lock: Mutex::new(()),
        })
    }

    pub fn load_wifi_credentials(&self) -> GatewayResult<Option<WifiCredentials>> {
        let _guard = self.lock.lock().expect("lock config repo");
        let txn = match self.kv.open_readonly(STORAGE_NAMESPACE) {
            Ok(txn) => txn,
            Err(GatewayError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let ssid = txn.get_str(KEY_WIFI_SSID)?;
        let password = txn.get_str(KEY_WIFI_PASS)?;
        match (ssid, password) {
            (Some(ssid), Some(password)) => Ok(Some(WifiCredentials { ssid, password })),
            _ => Ok(None),
        }
    }

    pub fn save_wifi_credentials(&self, creds: &WifiCredentials) -> GatewayResult<()> {
        let _guard = self.lock.lock().expect("lock config repo");
        let mut txn = self.kv.open_readwrite(STORAGE_NAMESPACE);
        txn.set_str(KEY_WIFI_SSID, &creds.ssid)?;
        txn.set_str(KEY_WIFI_PASS, &creds.password)?;
        txn.commit()
    }

    pub fn clear_wifi_credentials(&self) -> GatewayResult<()> {
        let _guard = self.lock.lock().expect("lock config repo");
        let mut txn = self.kv.open_readwrite(STORAGE_NAMESPACE);
        txn.erase_key(KEY_WIFI_SSID)?;
        txn.erase_key(KEY_WIFI_PASS)?;
        txn.commit()
    }
}
