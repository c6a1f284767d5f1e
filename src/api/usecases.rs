use std::sync::{Arc, Mutex, Weak};

use crate::api::{
    ControlRequest, JobSubmitRequest, WifiSaveRequest, WsMetrics,
};
use crate::config::{DeviceRecord, FactoryResetReport, WifiCredentials, MAX_DEVICES};
use crate::error::GatewayResult;
use crate::service::{
    ConfigService, DeviceRegistry, JobInfo, JobMetrics, JobQueue, LqiEntry, LqiSource,
    NetworkInfo, StateStore, SystemService, Telemetry, WifiApInfo, WifiService, WifiState,
    ZigbeeService,
};

const WIFI_SAVE_REBOOT_DELAY_MS: u32 = 1_000;
const FACTORY_RESET_REBOOT_DELAY_MS: u32 = 1_000;
const PERMIT_JOIN_SECONDS: u16 = 60;

/// Composite health object served by `/health` and the `health_state`
/// WebSocket stream.
#[derive(Clone, Debug)]
pub struct HealthSnapshot {
    pub zigbee_started: bool,
    pub zigbee_factory_new: bool,
    pub zigbee_pan_id: u16,
    pub zigbee_channel: u8,
    pub zigbee_short_addr: u16,
    pub wifi: WifiState,
    pub nvs_ok: bool,
    pub nvs_schema_version: i32,
    pub ws_clients: u32,
    pub telemetry: Telemetry,
    pub jobs_metrics: JobMetrics,
    pub ws_metrics: WsMetrics,
}

/// Late-bound view into the WebSocket broadcaster, mirroring the provider
/// hooks the health snapshot is fused from.
pub trait WsIntrospect: Send + Sync {
    fn client_count(&self) -> u32;
    fn ws_metrics(&self) -> WsMetrics;
}

/// The only path by which the HTTP surface reads or mutates gateway
/// state. Each use-case validates its input and calls exactly one
/// service entry point (plus the reboot side effects the API contracts
/// promise).
pub struct ApiUsecases {
    registry: Arc<DeviceRegistry>,
    state: Arc<StateStore>,
    config: Arc<ConfigService>,
    system: Arc<SystemService>,
    wifi: Arc<WifiService>,
    zigbee: Arc<ZigbeeService>,
    jobs: Arc<JobQueue>,
    ws: Mutex<Option<Weak<dyn WsIntrospect>>>,
}

impl ApiUsecases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        state: Arc<StateStore>,
        config: Arc<ConfigService>,
        system: Arc<SystemService>,
        wifi: Arc<WifiService>,
        zigbee: Arc<ZigbeeService>,
        jobs: Arc<JobQueue>,
    ) -> Arc<Self> {
        Arc::new(ApiUsecases {
            registry,
            state,
            config,
            system,
            wifi,
            zigbee,
            jobs,
            ws: Mutex::new(None),
        })
    }

    /// Binds the broadcaster after construction; the dependency is
    /// circular (the broadcaster builds its payloads through the
    /// use-cases), so it is held weakly.
    pub fn bind_ws(&self, ws: Weak<dyn WsIntrospect>) {
        *self.ws.lock().expect("lock ws introspect") = Some(ws);
    }

    pub async fn control(&self, request: &ControlRequest) -> GatewayResult<()> {
        request.validate()?;
        self.zigbee
            .send_on_off(request.addr, request.ep, request.cmd == 1)
            .await
    }

    /// Saves credentials, then schedules the restart that makes them
    /// effective.
    pub fn wifi_save(&self, request: &WifiSaveRequest) -> GatewayResult<()> {
        request.validate()?;
        self.config
            .save_wifi_credentials(&WifiCredentials::new(&request.ssid, &request.password))?;
        self.system.schedule_reboot(WIFI_SAVE_REBOOT_DELAY_MS)
    }

    pub fn factory_reset(&self) -> GatewayResult<()> {
        self.system
            .factory_reset_and_reboot(FACTORY_RESET_REBOOT_DELAY_MS)
    }

    pub fn network_status(&self) -> NetworkInfo {
        self.zigbee.network_status()
    }

    pub fn devices_snapshot(&self) -> Vec<DeviceRecord> {
        self.registry.snapshot(MAX_DEVICES)
    }

    pub fn cached_lqi_snapshot(&self) -> (Vec<LqiEntry>, LqiSource, u64) {
        self.zigbee.cached_lqi_snapshot()
    }

    pub async fn neighbor_lqi_live(&self) -> GatewayResult<Vec<LqiEntry>> {
        self.zigbee.refresh_neighbor_lqi_snapshot().await
    }

    pub async fn permit_join(&self, seconds: u16) -> GatewayResult<()> {
        self.zigbee.permit_join(seconds).await
    }

    pub async fn permit_join_default(&self) -> GatewayResult<()> {
        self.permit_join(PERMIT_JOIN_SECONDS).await
    }

    pub fn delete_device(&self, short_addr: u16) -> GatewayResult<()> {
        self.zigbee.delete_device(short_addr)
    }

    pub fn rename_device(&self, short_addr: u16, name: &str) -> GatewayResult<()> {
        self.zigbee.rename_device(short_addr, name)
    }

    pub async fn wifi_scan(&self) -> GatewayResult<Vec<WifiApInfo>> {
        self.wifi.scan().await
    }

    pub fn schedule_reboot(&self, delay_ms: u32) -> GatewayResult<()> {
        self.system.schedule_reboot(delay_ms)
    }

    pub fn factory_reset_report(&self) -> FactoryResetReport {
        self.system.last_factory_reset_report()
    }

    pub fn collect_telemetry(&self) -> Telemetry {
        self.system.collect_telemetry()
    }

    pub fn jobs_submit(&self, request: &JobSubmitRequest) -> GatewayResult<u32> {
        let ty = request.job_type()?;
        let delay = request.reboot_delay_ms()?;
        self.jobs.submit(ty, delay)
    }

    pub fn jobs_get(&self, id: u32) -> GatewayResult<JobInfo> {
        self.jobs.get(id)
    }

    pub fn jobs_metrics(&self) -> JobMetrics {
        self.jobs.metrics()
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let network = self.state.network();
        let wifi = self.state.wifi();
        let (nvs_ok, nvs_schema_version) = match self.config.schema_version() {
            Ok(version) => (true, version),
            Err(_) => (false, -1),
        };

        let (ws_clients, ws_metrics) = {
            let bound = self.ws.lock().expect("lock ws introspect").clone();
            match bound.and_then(|weak| weak.upgrade()) {
                Some(ws) => (ws.client_count(), ws.ws_metrics()),
                None => (0, WsMetrics::default()),
            }
        };

        HealthSnapshot {
            zigbee_started: network.zigbee_started,
            zigbee_factory_new: network.factory_new,
            zigbee_pan_id: network.pan_id,
            zigbee_channel: network.channel,
            zigbee_short_addr: network.short_addr,
            wifi,
            nvs_ok,
            nvs_schema_version,
            ws_clients,
            telemetry: self.collect_telemetry(),
            jobs_metrics: self.jobs.metrics(),
            ws_metrics,
        }
    }
}
