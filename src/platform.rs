//! Host-side stand-ins for the platform ports. The real product links the
//! vendor Wi-Fi driver and Zigbee stack here; these implementations keep
//! the daemon and the test suite running without that glue.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{IeeeAddr, WifiCredentials};
use crate::error::{GatewayError, GatewayResult};
use crate::service::{
    ApConfig, CommissioningMode, NeighborInfo, NetworkInfo, RebootHook, Telemetry,
    TelemetryProvider, WifiApInfo, WifiDriver, WifiMode, ZigbeeStack,
};

/// Scriptable Wi-Fi driver: canned scan results, configurable scan
/// latency, and a programmable number of failing STA attempts.
pub struct StubWifiDriver {
    networks: Mutex<Vec<WifiApInfo>>,
    scan_delay_ms: AtomicU64,
    scan_count: AtomicU32,
    sta_failures: AtomicU32,
    mode: Mutex<WifiMode>,
    mac: [u8; 6],
}

impl StubWifiDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(StubWifiDriver {
            networks: Mutex::new(vec![
                WifiApInfo {
                    ssid: "lab-net".to_string(),
                    rssi: -48,
                    auth: 3,
                },
                WifiApInfo {
                    ssid: "guest".to_string(),
                    rssi: -71,
                    auth: 0,
                },
            ]),
            scan_delay_ms: AtomicU64::new(0),
            scan_count: AtomicU32::new(0),
            sta_failures: AtomicU32::new(0),
            mode: Mutex::new(WifiMode::Sta),
            mac: [0x84, 0xF7, 0x03, 0x10, 0xC4, 0x7E],
        })
    }

    pub fn set_networks(&self, networks: Vec<WifiApInfo>) {
        *self.networks.lock().expect("lock stub networks") = networks;
    }

    pub fn set_scan_delay(&self, delay: Duration) {
        self.scan_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes the next `count` STA attempts fail; `u32::MAX` fails forever.
    pub fn fail_sta_attempts(&self, count: u32) {
        self.sta_failures.store(count, Ordering::SeqCst);
    }

    pub fn scan_count(&self) -> u32 {
        self.scan_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WifiDriver for StubWifiDriver {
    async fn connect_sta(&self, _creds: &WifiCredentials) -> GatewayResult<()> {
        let remaining = self.sta_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.sta_failures.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(GatewayError::Fail);
        }
        *self.mode.lock().expect("lock stub mode") = WifiMode::Sta;
        Ok(())
    }

    async fn start_fallback_ap(&self, _config: &ApConfig) -> GatewayResult<()> {
        *self.mode.lock().expect("lock stub mode") = WifiMode::Ap;
        Ok(())
    }

    async fn mode(&self) -> GatewayResult<WifiMode> {
        Ok(*self.mode.lock().expect("lock stub mode"))
    }

    async fn set_mode(&self, mode: WifiMode) -> GatewayResult<()> {
        *self.mode.lock().expect("lock stub mode") = mode;
        Ok(())
    }

    async fn scan(&self) -> GatewayResult<Vec<WifiApInfo>> {
        self.scan_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.scan_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.networks.lock().expect("lock stub networks").clone())
    }

    fn softap_mac(&self) -> [u8; 6] {
        self.mac
    }
}

/// Scriptable Zigbee stack: in-memory network info and neighbor table.
pub struct StubZigbeeStack {
    info: Mutex<NetworkInfo>,
    factory_new: AtomicBool,
    neighbors: Mutex<Vec<NeighborInfo>>,
    permit_join_open: AtomicBool,
}

impl StubZigbeeStack {
    pub fn new() -> Arc<Self> {
        Arc::new(StubZigbeeStack {
            info: Mutex::new(NetworkInfo {
                pan_id: 0x1A2B,
                channel: 15,
                short_addr: 0x0000,
            }),
            factory_new: AtomicBool::new(false),
            neighbors: Mutex::new(Vec::new()),
            permit_join_open: AtomicBool::new(false),
        })
    }

    pub fn set_network_info(&self, info: NetworkInfo) {
        *self.info.lock().expect("lock stub info") = info;
    }

    pub fn set_factory_new(&self, factory_new: bool) {
        self.factory_new.store(factory_new, Ordering::SeqCst);
    }

    pub fn set_neighbors(&self, neighbors: Vec<NeighborInfo>) {
        *self.neighbors.lock().expect("lock stub neighbors") = neighbors;
    }

    pub fn permit_join_open(&self) -> bool {
        self.permit_join_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ZigbeeStack for StubZigbeeStack {
    fn network_info(&self) -> NetworkInfo {
        *self.info.lock().expect("lock stub info")
    }

    fn is_factory_new(&self) -> bool {
        self.factory_new.load(Ordering::SeqCst)
    }

    async fn start_commissioning(&self, mode: CommissioningMode) -> GatewayResult<()> {
        log::debug!("stub commissioning: {mode:?}");
        Ok(())
    }

    async fn open_network(&self, seconds: u16) -> GatewayResult<()> {
        self.permit_join_open.store(seconds > 0, Ordering::SeqCst);
        Ok(())
    }

    async fn close_network(&self) -> GatewayResult<()> {
        self.permit_join_open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send_on_off(&self, short_addr: u16, endpoint: u8, on: bool) -> GatewayResult<()> {
        log::debug!("stub on/off: 0x{short_addr:04x}/{endpoint} -> {on}");
        Ok(())
    }

    async fn send_leave(&self, short_addr: u16, _ieee_addr: IeeeAddr) -> GatewayResult<()> {
        log::debug!("stub leave: 0x{short_addr:04x}");
        Ok(())
    }

    async fn read_neighbor_table(&self) -> GatewayResult<Vec<NeighborInfo>> {
        Ok(self.neighbors.lock().expect("lock stub neighbors").clone())
    }
}

/// Reboot hook for the daemon: logs and exits so a supervisor restarts
/// the process.
pub struct ProcessReboot;

impl RebootHook for ProcessReboot {
    fn reboot(&self) {
        log::warn!("rebooting now");
        std::process::exit(0);
    }
}

/// Minimal host telemetry; heap figures are not meaningful on the host
/// and stay zero.
pub struct HostTelemetry;

impl TelemetryProvider for HostTelemetry {
    fn collect(&self) -> Telemetry {
        Telemetry::default()
    }
}
