use std::sync::Arc;

use crate::api::{ApiUsecases, ErrorRing, WsBroadcaster, WsIntrospect};
use crate::clock::Clock;
use crate::error::GatewayResult;
use crate::event::{EventBus, GatewayEvent};
use crate::service::{
    ConfigService, DeviceRegistry, GatewayJobPolicy, JobPolicy, JobQueue, RcpTool, RebootHook,
    StateStore, SystemService, WifiService, WifiSettings, ZigbeeService,
};
use crate::store::{ConfigRepository, DeviceRepository, KvStore, SchemaStore};

/// Platform ports injected at startup. The binary passes host
/// implementations; tests pass stubs and a manual clock.
pub struct GatewayPorts {
    pub kv: Arc<KvStore>,
    pub wifi_driver: Arc<dyn crate::service::WifiDriver>,
    pub zigbee_stack: Arc<dyn crate::service::ZigbeeStack>,
    pub reboot_hook: Arc<dyn RebootHook>,
    pub rcp_tool: Option<Arc<dyn RcpTool>>,
    pub clock: Arc<dyn Clock>,
    pub wifi_settings: WifiSettings,
}

/// Owns every component handle. There is no module-level state anywhere
/// in the crate; a fresh runtime per test gets a fresh world.
pub struct GatewayRuntime {
    pub bus: Arc<EventBus>,
    pub state: Arc<StateStore>,
    pub config: Arc<ConfigService>,
    pub registry: Arc<DeviceRegistry>,
    pub system: Arc<SystemService>,
    pub wifi: Arc<WifiService>,
    pub zigbee: Arc<ZigbeeService>,
    pub jobs: Arc<JobQueue>,
    pub usecases: Arc<ApiUsecases>,
    pub ws: Arc<WsBroadcaster>,
    pub error_ring: Arc<ErrorRing>,
    job_policy: Arc<dyn JobPolicy>,
}

impl GatewayRuntime {
    /// Builds and wires the whole core: repositories, services, event
    /// subscriptions, and the schema migration. Worker tasks are spawned
    /// separately by [`GatewayRuntime::start`].
    pub fn new(ports: GatewayPorts) -> GatewayResult<Arc<Self>> {
        let bus = EventBus::new();
        let state = StateStore::new(ports.clock.clone());

        let schema = SchemaStore::new(ports.kv.clone());
        let config_repo = ConfigRepository::new(ports.kv.clone());
        let device_repo = DeviceRepository::new(ports.kv.clone());
        let config = ConfigService::new(schema, config_repo, device_repo.clone(), ports.kv.clone());
        config.init_or_migrate()?;

        let registry = DeviceRegistry::new(device_repo, state.clone(), bus.clone());
        let system = SystemService::new(config.clone(), ports.reboot_hook, ports.clock.clone());
        let wifi = WifiService::new(
            ports.wifi_driver,
            config.clone(),
            state.clone(),
            ports.wifi_settings,
        );
        let zigbee = ZigbeeService::new(
            ports.zigbee_stack,
            state.clone(),
            registry.clone(),
            bus.clone(),
            ports.clock.clone(),
        );
        let jobs = JobQueue::new(ports.clock.clone());
        let usecases = ApiUsecases::new(
            registry.clone(),
            state.clone(),
            config.clone(),
            system.clone(),
            wifi.clone(),
            zigbee.clone(),
            jobs.clone(),
        );
        let ws = WsBroadcaster::new(usecases.clone(), ports.clock.clone());
        let introspect: Arc<dyn WsIntrospect> = ws.clone();
        usecases.bind_ws(Arc::downgrade(&introspect));
        let error_ring = ErrorRing::new(ports.clock.clone());

        // Joins reach the registry through the bus.
        let announce_registry = registry.clone();
        bus.subscribe(move |event| {
            if let GatewayEvent::DeviceAnnounce {
                short_addr,
                ieee_addr,
            } = event
            {
                if let Err(e) = announce_registry.add(*short_addr, *ieee_addr) {
                    log::warn!("failed to register announced device: {e}");
                }
            }
        });

        // Registry deletions come back as mgmt-leave commands.
        let leave_zigbee = zigbee.clone();
        bus.subscribe(move |event| {
            if let GatewayEvent::DeviceDeleteRequest {
                short_addr,
                ieee_addr,
            } = event
            {
                leave_zigbee.submit_delete_request(*short_addr, *ieee_addr);
            }
        });

        // List and LQI changes wake the broadcaster.
        let wake_ws = ws.clone();
        bus.subscribe(move |event| {
            if matches!(
                event,
                GatewayEvent::DeviceListChanged | GatewayEvent::LqiStateChanged
            ) {
                wake_ws.notify();
            }
        });

        registry.init()?;

        let job_policy: Arc<dyn JobPolicy> = GatewayJobPolicy::new(
            wifi.clone(),
            config.clone(),
            system.clone(),
            zigbee.clone(),
            ports.rcp_tool,
        );

        Ok(Arc::new(GatewayRuntime {
            bus,
            state,
            config,
            registry,
            system,
            wifi,
            zigbee,
            jobs,
            usecases,
            ws,
            error_ring,
            job_policy,
        }))
    }

    /// Spawns the worker tasks (job worker, Zigbee adapter, broadcaster).
    /// Requires a running tokio runtime.
    pub fn start(self: &Arc<Self>) {
        self.jobs.start(self.job_policy.clone(), self.bus.clone());
        self.zigbee.start();
        self.ws.start();
    }
}
