use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::config::IeeeAddr;
use crate::error::{GatewayError, GatewayResult};
use crate::event::{EventBus, GatewayEvent};
use crate::service::{DeviceRegistry, LqiEntry, LqiSource, NetworkState, StateStore};

/// Seconds the network stays open for joins after a successful (re)start.
pub const STARTUP_PERMIT_JOIN_SECONDS: u16 = 180;
const LQI_REFRESH_MIN_INTERVAL_MS: u64 = 3_000;
const COMMISSIONING_RETRY_DELAY_MS: u64 = 1_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommissioningMode {
    Initialization,
    NetworkFormation,
    NetworkSteering,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NetworkInfo {
    pub pan_id: u16,
    pub channel: u8,
    pub short_addr: u16,
}

/// One row read from the coordinator's neighbor table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NeighborInfo {
    pub short_addr: u16,
    pub lqi: i32,
    pub rssi: i32,
}

/// Host Zigbee stack port.
#[async_trait]
pub trait ZigbeeStack: Send + Sync {
    fn network_info(&self) -> NetworkInfo;
    fn is_factory_new(&self) -> bool;
    async fn start_commissioning(&self, mode: CommissioningMode) -> GatewayResult<()>;
    async fn open_network(&self, seconds: u16) -> GatewayResult<()>;
    async fn close_network(&self) -> GatewayResult<()>;
    async fn send_on_off(&self, short_addr: u16, endpoint: u8, on: bool) -> GatewayResult<()>;
    async fn send_leave(&self, short_addr: u16, ieee_addr: IeeeAddr) -> GatewayResult<()>;
    async fn read_neighbor_table(&self) -> GatewayResult<Vec<NeighborInfo>>;
}

/// Stack signals delivered by the platform glue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZigbeeSignal {
    SkipStartup,
    /// DEVICE_FIRST_START and DEVICE_REBOOT behave identically.
    DeviceStart { ok: bool },
    Formation { ok: bool },
    DeviceAnnounce { short_addr: u16, ieee_addr: IeeeAddr },
    Other { id: u32 },
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum AdapterInput {
    Signal(ZigbeeSignal),
    ReportAttr { short_addr: u16, on: bool },
    DeleteRequest { short_addr: u16, ieee_addr: IeeeAddr },
}

/// Event-driven bridge between the radio stack and the rest of the
/// gateway: stack signals mutate the state store and registry, ZCL
/// reports and joins feed the throttled LQI refresh, and delete requests
/// come back as mgmt-leave commands.
pub struct ZigbeeService {
    stack: Arc<dyn ZigbeeStack>,
    state: Arc<StateStore>,
    registry: Arc<DeviceRegistry>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    last_lqi_refresh_ms: Mutex<Option<u64>>,
    input_tx: mpsc::UnboundedSender<AdapterInput>,
    input_rx: Mutex<Option<mpsc::UnboundedReceiver<AdapterInput>>>,
}

impl ZigbeeService {
    pub fn new(
        stack: Arc<dyn ZigbeeStack>,
        state: Arc<StateStore>,
        registry: Arc<DeviceRegistry>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        Arc::new(ZigbeeService {
            stack,
            state,
            registry,
            bus,
            clock,
            last_lqi_refresh_ms: Mutex::new(None),
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
        })
    }

    /// Spawns the adapter task. Call once after wiring.
    pub fn start(self: &Arc<Self>) {
        let Some(mut rx) = self.input_rx.lock().expect("lock adapter rx").take() else {
            return;
        };
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(input) = rx.recv().await {
                service.handle_input(input).await;
            }
        });
    }

    /// Entry point for the platform signal handler.
    pub fn submit_signal(&self, signal: ZigbeeSignal) {
        let _ = self.input_tx.send(AdapterInput::Signal(signal));
    }

    /// Entry point for the ZCL action callback (On/Off attribute report).
    pub fn submit_report_attr(&self, short_addr: u16, on: bool) {
        let _ = self
            .input_tx
            .send(AdapterInput::ReportAttr { short_addr, on });
    }

    pub(crate) fn submit_delete_request(&self, short_addr: u16, ieee_addr: IeeeAddr) {
        let _ = self.input_tx.send(AdapterInput::DeleteRequest {
            short_addr,
            ieee_addr,
        });
    }

    pub(crate) async fn handle_input(&self, input: AdapterInput) {
        match input {
            AdapterInput::Signal(signal) => self.handle_signal(signal).await,
            AdapterInput::ReportAttr { short_addr, on } => {
                log::info!(
                    "device 0x{short_addr:04x} report: state is {}",
                    if on { "ON" } else { "OFF" }
                );
                self.refresh_lqi_throttled("report_attr").await;
            }
            AdapterInput::DeleteRequest {
                short_addr,
                ieee_addr,
            } => {
                // seconds=0 forces a permit-join state refresh before the
                // leave goes out.
                if let Err(e) = self.stack.open_network(0).await {
                    log::warn!("failed to refresh network state before leave: {e}");
                }
                log::info!("sending leave request to 0x{short_addr:04x}");
                if let Err(e) = self.stack.send_leave(short_addr, ieee_addr).await {
                    log::warn!("leave request to 0x{short_addr:04x} failed: {e}");
                }
            }
        }
    }

    async fn handle_signal(&self, signal: ZigbeeSignal) {
        match signal {
            ZigbeeSignal::SkipStartup => {
                log::info!("Zigbee stack initialized");
                self.publish_network_state(true);
                self.commission(CommissioningMode::Initialization).await;
            }
            ZigbeeSignal::DeviceStart { ok: true } => {
                let factory_new = self.stack.is_factory_new();
                log::info!("device started up, factory new: {factory_new}");
                self.publish_network_state(true);
                if factory_new {
                    self.commission(CommissioningMode::NetworkFormation).await;
                } else if let Err(e) =
                    self.stack.open_network(STARTUP_PERMIT_JOIN_SECONDS).await
                {
                    log::warn!("failed to open network for join: {e}");
                }
            }
            ZigbeeSignal::DeviceStart { ok: false } => {
                self.retry_commissioning(CommissioningMode::Initialization);
            }
            ZigbeeSignal::Formation { ok: true } => {
                let info = self.stack.network_info();
                self.publish_network_state(true);
                log::info!(
                    "formed network: PAN 0x{:04x}, CH {}",
                    info.pan_id,
                    info.channel
                );
                self.commission(CommissioningMode::NetworkSteering).await;
            }
            ZigbeeSignal::Formation { ok: false } => {
                self.retry_commissioning(CommissioningMode::NetworkFormation);
            }
            ZigbeeSignal::DeviceAnnounce {
                short_addr,
                ieee_addr,
            } => {
                log::info!("new device joined: 0x{short_addr:04x}");
                self.bus.post(GatewayEvent::DeviceAnnounce {
                    short_addr,
                    ieee_addr,
                });
                match self.stack.close_network().await {
                    Ok(()) => log::info!("permit join closed after new device join"),
                    Err(e) => log::warn!("failed to close permit join: {e}"),
                }
                self.refresh_lqi_throttled("device_announce").await;
            }
            ZigbeeSignal::Other { id } => {
                log::info!("ZDO signal: 0x{id:x}");
            }
        }
    }

    fn publish_network_state(&self, started: bool) {
        let mut state = NetworkState {
            zigbee_started: started,
            factory_new: self.stack.is_factory_new(),
            ..Default::default()
        };
        if started {
            let info = self.stack.network_info();
            state.pan_id = info.pan_id;
            state.channel = info.channel;
            state.short_addr = info.short_addr;
        }
        self.state.set_network(state);
    }

    async fn commission(&self, mode: CommissioningMode) {
        if let Err(e) = self.stack.start_commissioning(mode).await {
            log::warn!("commissioning {mode:?} failed: {e}");
            self.retry_commissioning(mode);
        }
    }

    fn retry_commissioning(&self, mode: CommissioningMode) {
        let stack = self.stack.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(COMMISSIONING_RETRY_DELAY_MS)).await;
            if let Err(e) = stack.start_commissioning(mode).await {
                log::warn!("commissioning retry {mode:?} failed: {e}");
            }
        });
    }

    /// LQI refresh with a 3 s minimum interval; earlier calls are dropped.
    pub async fn refresh_lqi_throttled(&self, reason: &str) {
        {
            let mut last = self.last_lqi_refresh_ms.lock().expect("lock lqi throttle");
            let now = self.clock.now_ms();
            if let Some(at) = *last {
                if now.saturating_sub(at) < LQI_REFRESH_MIN_INTERVAL_MS {
                    return;
                }
            }
            *last = Some(now);
        }
        match self.refresh_neighbor_lqi().await {
            Ok(()) => self.bus.post(GatewayEvent::LqiStateChanged),
            Err(e) => log::warn!("live LQI refresh failed ({reason}): {e}"),
        }
    }

    /// Reads the neighbor table into the LQI cache and returns the cache
    /// rows. Used by the LQI-refresh job, which publishes the change
    /// event itself.
    pub async fn refresh_neighbor_lqi_snapshot(&self) -> GatewayResult<Vec<LqiEntry>> {
        self.refresh_neighbor_lqi().await?;
        Ok(self.state.lqi_snapshot())
    }

    async fn refresh_neighbor_lqi(&self) -> GatewayResult<()> {
        let neighbors = self.stack.read_neighbor_table().await?;
        let now = self.clock.now_ms();
        for neighbor in &neighbors {
            if let Err(e) = self.state.update_lqi(
                neighbor.short_addr,
                neighbor.lqi,
                neighbor.rssi,
                LqiSource::NeighborTable,
                now,
            ) {
                log::warn!(
                    "failed to cache LQI for 0x{:04x}: {e}",
                    neighbor.short_addr
                );
            }
        }
        Ok(())
    }

    /// Cache rows plus the snapshot-level source and freshness stamp.
    pub fn cached_lqi_snapshot(&self) -> (Vec<LqiEntry>, LqiSource, u64) {
        let rows = self.state.lqi_snapshot();
        let mut source = LqiSource::Unknown;
        let mut updated_ms = 0;
        for row in &rows {
            if row.updated_ms >= updated_ms {
                updated_ms = row.updated_ms;
                source = row.source;
            }
        }
        (rows, source, updated_ms)
    }

    pub fn network_status(&self) -> NetworkInfo {
        self.stack.network_info()
    }

    pub async fn permit_join(&self, seconds: u16) -> GatewayResult<()> {
        self.stack.open_network(seconds).await
    }

    pub async fn send_on_off(&self, short_addr: u16, endpoint: u8, on: bool) -> GatewayResult<()> {
        self.stack.send_on_off(short_addr, endpoint, on).await
    }

    /// Registry removal; the leave command follows through the
    /// delete-request subscription.
    pub fn delete_device(&self, short_addr: u16) -> GatewayResult<()> {
        self.registry.delete(short_addr)
    }

    pub fn rename_device(&self, short_addr: u16, name: &str) -> GatewayResult<()> {
        if name.is_empty() {
            return Err(GatewayError::InvalidArg);
        }
        self.registry.update_name(short_addr, name)
    }
}
