use std::sync::Arc;

use zgw::api::{router, AppState};
use zgw::clock::SteadyClock;
use zgw::platform::{HostTelemetry, ProcessReboot, StubWifiDriver, StubZigbeeStack};
use zgw::runtime::{GatewayPorts, GatewayRuntime};
use zgw::service::{WifiOutcome, WifiSettings, ZigbeeSignal};
use zgw::store::KvStore;

const DEFAULT_HTTP_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let data_file =
        std::env::var("ZGW_DATA_FILE").unwrap_or_else(|_| "zgw-storage.json".to_string());
    let kv = KvStore::open_file(&data_file)?;
    log::info!("persistence backed by {data_file}");

    // Vendor glue would supply the real driver and stack here; the stubs
    // keep the daemon usable on a development host.
    let wifi_driver = StubWifiDriver::new();
    let zigbee_stack = StubZigbeeStack::new();

    let runtime = GatewayRuntime::new(GatewayPorts {
        kv,
        wifi_driver,
        zigbee_stack,
        reboot_hook: Arc::new(ProcessReboot),
        rcp_tool: None,
        clock: Arc::new(SteadyClock::new()),
        wifi_settings: WifiSettings::default(),
    })?;
    runtime.system.register_telemetry_provider(Arc::new(HostTelemetry));
    runtime.start();

    match runtime.wifi.connect().await {
        Ok(WifiOutcome::StaConnected) => {
            log::info!("Wi-Fi up, starting Zigbee");
            runtime.zigbee.submit_signal(ZigbeeSignal::SkipStartup);
            runtime
                .zigbee
                .submit_signal(ZigbeeSignal::DeviceStart { ok: true });
        }
        Ok(WifiOutcome::FallbackAp) => {
            // Zigbee startup is deferred so the setup UI stays responsive.
            log::warn!("running in fallback AP mode, waiting for Wi-Fi setup");
        }
        Err(e) => {
            log::error!("Wi-Fi bring-up failed: {e}");
        }
    }

    let port = std::env::var("ZGW_HTTP_PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);

    #[cfg(feature = "mdns")]
    let _mdns = register_mdns(port);

    let state = AppState {
        usecases: runtime.usecases.clone(),
        ws: runtime.ws.clone(),
        error_ring: runtime.error_ring.clone(),
    };
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    log::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Advertises `_http._tcp` so LAN clients find the gateway by name.
#[cfg(feature = "mdns")]
fn register_mdns(port: u16) -> Option<mdns_sd::ServiceDaemon> {
    let daemon = match mdns_sd::ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            log::warn!("mDNS daemon unavailable: {e}");
            return None;
        }
    };
    let service = match mdns_sd::ServiceInfo::new(
        "_http._tcp.local.",
        "zigbee-gw",
        "zigbee-gw.local.",
        "",
        port,
        std::collections::HashMap::<String, String>::new(),
    ) {
        Ok(service) => service.enable_addr_auto(),
        Err(e) => {
            log::warn!("failed to build mDNS service record: {e}");
            return None;
        }
    };
    match daemon.register(service) {
        Ok(()) => {
            log::info!("mDNS registered: zigbee-gw -> port {port}");
            Some(daemon)
        }
        Err(e) => {
            log::warn!("mDNS registration failed: {e}");
            None
        }
    }
}
