use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::clock::Clock;
use crate::config::{DeviceRecord, MAX_DEVICES};
use crate::error::{GatewayError, GatewayResult};

pub const LQI_CACHE_CAPACITY: usize = MAX_DEVICES;

/// Most recently observed Zigbee PAN membership. Written only by the
/// Zigbee runtime adapter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NetworkState {
    pub zigbee_started: bool,
    pub factory_new: bool,
    pub pan_id: u16,
    pub channel: u8,
    pub short_addr: u16,
}

/// Current Wi-Fi link state. Written only by the Wi-Fi manager.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WifiState {
    pub sta_connected: bool,
    pub fallback_ap_active: bool,
    pub loaded_from_nvs: bool,
    pub active_ssid: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LqiSource {
    #[default]
    Unknown,
    NeighborTable,
    MgmtLqi,
}

impl LqiSource {
    pub fn label(&self) -> &'static str {
        match self {
            LqiSource::Unknown => "unknown",
            LqiSource::NeighborTable => "neighbor_table",
            LqiSource::MgmtLqi => "mgmt_lqi",
        }
    }
}

/// Cached link quality for one device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LqiEntry {
    pub short_addr: u16,
    pub lqi: i32,
    pub rssi: i32,
    pub source: LqiSource,
    pub updated_ms: u64,
}

/// LQI values at or below zero are radio sentinels, not measurements.
pub fn lqi_invalid(lqi: i32) -> bool {
    lqi <= 0
}

/// `127` and anything at or below `-127` are the radio's "unknown" RSSI.
pub fn rssi_invalid(rssi: i32) -> bool {
    rssi == 127 || rssi <= -127
}

pub fn lqi_quality_label(lqi: i32) -> &'static str {
    if lqi_invalid(lqi) {
        return "unknown";
    }
    if lqi >= 180 {
        return "good";
    }
    if lqi >= 120 {
        return "warn";
    }
    "bad"
}

struct StateInner {
    network: NetworkState,
    wifi: WifiState,
    devices: Vec<DeviceRecord>,
    lqi: Vec<LqiEntry>,
}

/// In-RAM snapshots of Zigbee network state, Wi-Fi state, the synced
/// device list, and the per-device LQI cache, all behind one lock.
/// Snapshots are replaced whole; partial updates are not exposed.
pub struct StateStore {
    inner: Mutex<StateInner>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(StateStore {
            inner: Mutex::new(StateInner {
                network: NetworkState::default(),
                wifi: WifiState::default(),
                devices: Vec::new(),
                lqi: Vec::new(),
            }),
            clock,
        })
    }

    pub fn set_network(&self, state: NetworkState) {
        self.inner.lock().expect("lock state").network = state;
    }

    pub fn network(&self) -> NetworkState {
        self.inner.lock().expect("lock state").network
    }

    pub fn set_wifi(&self, state: WifiState) {
        self.inner.lock().expect("lock state").wifi = state;
    }

    pub fn wifi(&self) -> WifiState {
        self.inner.lock().expect("lock state").wifi.clone()
    }

    /// Replaces the synced device snapshot and reconciles the LQI cache:
    /// entries for addresses that survive are preserved, the rest dropped.
    pub fn set_devices(&self, devices: &[DeviceRecord]) {
        let mut inner = self.inner.lock().expect("lock state");
        inner.devices = devices.to_vec();
        inner
            .lqi
            .retain(|entry| devices.iter().any(|d| d.short_addr == entry.short_addr));
    }

    pub fn devices_snapshot(&self) -> Vec<DeviceRecord> {
        self.inner.lock().expect("lock state").devices.clone()
    }

    /// Inserts or replaces one cache row. `updated_ms == 0` is replaced by
    /// the store's clock. Fails `NoMem` when the cache is full and no row
    /// matches.
    pub fn update_lqi(
        &self,
        short_addr: u16,
        lqi: i32,
        rssi: i32,
        source: LqiSource,
        updated_ms: u64,
    ) -> GatewayResult<()> {
        let updated_ms = if updated_ms == 0 {
            self.clock.now_ms()
        } else {
            updated_ms
        };
        let mut inner = self.inner.lock().expect("lock state");
        let entry = LqiEntry {
            short_addr,
            lqi,
            rssi,
            source,
            updated_ms,
        };
        if let Some(row) = inner.lqi.iter_mut().find(|e| e.short_addr == short_addr) {
            *row = entry;
            return Ok(());
        }
        if inner.lqi.len() >= LQI_CACHE_CAPACITY {
            return Err(GatewayError::NoMem);
        }
        inner.lqi.push(entry);
        Ok(())
    }

    pub fn lqi_snapshot(&self) -> Vec<LqiEntry> {
        self.inner.lock().expect("lock state").lqi.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (Arc<StateStore>, Arc<ManualClock>) {
        let clock = ManualClock::new(1_000);
        (StateStore::new(clock.clone()), clock)
    }

    fn device(short_addr: u16) -> DeviceRecord {
        DeviceRecord::new(short_addr, [0; 8], format!("Device 0x{short_addr:04X}"))
    }

    #[test]
    fn snapshots_replace_whole() {
        let (store, _) = store();
        store.set_network(NetworkState {
            zigbee_started: true,
            factory_new: false,
            pan_id: 0x1A2B,
            channel: 15,
            short_addr: 0,
        });
        assert_eq!(store.network().pan_id, 0x1A2B);

        store.set_wifi(WifiState {
            sta_connected: true,
            active_ssid: "lab".into(),
            ..Default::default()
        });
        assert!(store.wifi().sta_connected);
        assert_eq!(store.wifi().active_ssid, "lab");
    }

    #[test]
    fn update_lqi_inserts_then_replaces() {
        let (store, _) = store();
        store
            .update_lqi(0x1001, 150, -60, LqiSource::NeighborTable, 5)
            .unwrap();
        store
            .update_lqi(0x1001, 90, -80, LqiSource::MgmtLqi, 6)
            .unwrap();
        let rows = store.lqi_snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lqi, 90);
        assert_eq!(rows[0].source, LqiSource::MgmtLqi);
    }

    #[test]
    fn update_lqi_full_cache_is_no_mem() {
        let (store, _) = store();
        for i in 0..LQI_CACHE_CAPACITY as u16 {
            store
                .update_lqi(0x2000 + i, 100, -50, LqiSource::NeighborTable, 1)
                .unwrap();
        }
        assert_eq!(
            store.update_lqi(0x3000, 100, -50, LqiSource::NeighborTable, 1),
            Err(GatewayError::NoMem)
        );
        // Existing rows still update in place.
        store
            .update_lqi(0x2000, 42, -50, LqiSource::NeighborTable, 2)
            .unwrap();
    }

    #[test]
    fn zero_timestamp_uses_clock() {
        let (store, clock) = store();
        clock.set(77_000);
        store
            .update_lqi(0x1001, 10, -50, LqiSource::NeighborTable, 0)
            .unwrap();
        assert_eq!(store.lqi_snapshot()[0].updated_ms, 77_000);
    }

    #[test]
    fn device_sync_retains_matching_lqi_entries() {
        let (store, _) = store();
        store
            .update_lqi(0x1001, 10, -50, LqiSource::NeighborTable, 1)
            .unwrap();
        store
            .update_lqi(0x1002, 20, -51, LqiSource::NeighborTable, 1)
            .unwrap();

        store.set_devices(&[device(0x1002), device(0x1003)]);

        let rows = store.lqi_snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].short_addr, 0x1002);
        // Every cached key must appear in the synced snapshot.
        let devices = store.devices_snapshot();
        for row in rows {
            assert!(devices.iter().any(|d| d.short_addr == row.short_addr));
        }
    }

    #[test]
    fn quality_bins() {
        assert_eq!(lqi_quality_label(0), "unknown");
        assert_eq!(lqi_quality_label(-1), "unknown");
        assert_eq!(lqi_quality_label(119), "bad");
        assert_eq!(lqi_quality_label(120), "warn");
        assert_eq!(lqi_quality_label(179), "warn");
        assert_eq!(lqi_quality_label(180), "good");
        assert!(rssi_invalid(127));
        assert!(rssi_invalid(-127));
        assert!(!rssi_invalid(-80));
    }
}
