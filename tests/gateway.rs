//! End-to-end scenarios exercising the wired runtime against stub ports.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use zgw::api::build_lqi_json;
use zgw::clock::SteadyClock;
use zgw::error::{status_name, GatewayError};
use zgw::platform::{StubWifiDriver, StubZigbeeStack};
use zgw::runtime::{GatewayPorts, GatewayRuntime};
use zgw::service::{
    JobState, JobType, LqiSource, NeighborInfo, NoopReboot, WifiApInfo, WifiOutcome,
    WifiSettings, ZigbeeSignal,
};
use zgw::store::{
    ConfigRepository, DeviceRepository, KvBackend, KvStore, KvTable, SchemaStore,
};

struct Fixture {
    runtime: Arc<GatewayRuntime>,
    wifi_driver: Arc<StubWifiDriver>,
    zigbee_stack: Arc<StubZigbeeStack>,
}

fn fixture_with(settings: WifiSettings) -> Fixture {
    let wifi_driver = StubWifiDriver::new();
    let zigbee_stack = StubZigbeeStack::new();
    let runtime = GatewayRuntime::new(GatewayPorts {
        kv: KvStore::in_memory(),
        wifi_driver: wifi_driver.clone(),
        zigbee_stack: zigbee_stack.clone(),
        reboot_hook: Arc::new(NoopReboot),
        rcp_tool: None,
        clock: Arc::new(SteadyClock::new()),
        wifi_settings: settings,
    })
    .expect("runtime wiring");
    Fixture {
        runtime,
        wifi_driver,
        zigbee_stack,
    }
}

fn fixture() -> Fixture {
    fixture_with(WifiSettings::default())
}

async fn wait_job_done(runtime: &Arc<GatewayRuntime>, id: u32) -> zgw::service::JobInfo {
    for _ in 0..2_000 {
        if let Ok(info) = runtime.jobs.get(id) {
            if info.state.is_terminal() {
                return info;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("job {id} never finished");
}

#[tokio::test]
async fn dedup_under_load_never_overflows_the_table() {
    let fx = fixture();
    fx.runtime.start();

    for _ in 0..120 {
        let id = fx.runtime.jobs.submit(JobType::WifiScan, 0).expect("submit");
        let info = wait_job_done(&fx.runtime, id).await;
        assert_eq!(info.state, JobState::Succeeded);
    }

    let metrics = fx.runtime.jobs.metrics();
    assert!(metrics.submitted_total >= 120);
    assert!(metrics.completed_total >= 120);
    assert_eq!(metrics.failed_total, 0);
    assert_eq!(metrics.queue_depth_current, 0);
    assert!(metrics.queue_depth_peak >= 1);
}

#[tokio::test]
async fn concurrent_scans_are_single_flight() {
    let fx = fixture();
    fx.wifi_driver.set_scan_delay(Duration::from_millis(300));
    fx.runtime.start();

    let first = fx.runtime.jobs.submit(JobType::WifiScan, 0).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = fx.runtime.jobs.submit(JobType::WifiScan, 0).unwrap();

    assert_eq!(first, second);
    wait_job_done(&fx.runtime, first).await;
    assert_eq!(fx.wifi_driver.scan_count(), 1);

    let metrics = fx.runtime.jobs.metrics();
    assert_eq!(metrics.dedup_reused_total, 1);
    assert_eq!(metrics.completed_total, 1);
}

#[tokio::test]
async fn wifi_retry_exhaustion_falls_back_to_deterministic_ap() {
    let fx = fixture_with(WifiSettings {
        max_retry: 5,
        connect_timeout_ms: 2_000,
        ..Default::default()
    });
    fx.wifi_driver.fail_sta_attempts(u32::MAX);

    let outcome = fx.runtime.wifi.connect().await.unwrap();
    assert_eq!(outcome, WifiOutcome::FallbackAp);

    let wifi = fx.runtime.state.wifi();
    assert!(!wifi.sta_connected);
    assert!(wifi.fallback_ap_active);
    // Last two SoftAP MAC octets of the stub driver, uppercase hex.
    assert_eq!(wifi.active_ssid, "ZigbeeGW-C47E");
}

#[tokio::test]
async fn reboot_schedule_is_idempotent() {
    let fx = fixture();
    fx.runtime.system.schedule_reboot(600_000).unwrap();
    fx.runtime.system.schedule_reboot(600_000).unwrap();

    assert!(fx.runtime.system.is_reboot_scheduled());
    assert_eq!(fx.runtime.system.reboot_schedule_count(), 1);
}

/// Backend whose nth persist call fails, for partial-failure injection.
struct NthFailBackend {
    calls: AtomicU32,
    fail_on: u32,
}

impl KvBackend for NthFailBackend {
    fn load(&self) -> Result<KvTable, GatewayError> {
        Ok(KvTable::default())
    }

    fn persist(&self, _table: &KvTable) -> Result<(), GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            Err(GatewayError::Fail)
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn factory_reset_partial_failure_is_reported_per_target() {
    // Sweep order is wifi, devices, zb_storage, zb_fct; fail the second
    // commit so only the devices clear goes wrong.
    let backend = Box::new(NthFailBackend {
        calls: AtomicU32::new(0),
        fail_on: 2,
    });
    let kv = KvStore::with_backend(backend).unwrap();
    let config = zgw::service::ConfigService::new(
        SchemaStore::new(kv.clone()),
        ConfigRepository::new(kv.clone()),
        DeviceRepository::new(kv.clone()),
        kv,
    );

    assert_eq!(config.factory_reset(), Err(GatewayError::Fail));

    let report = config.last_factory_reset_report();
    assert_eq!(status_name(&report.wifi), "OK");
    assert_eq!(status_name(&report.devices), "FAIL");
    assert_eq!(status_name(&report.zigbee_storage), "OK");
    assert_eq!(status_name(&report.zigbee_fct), "OK");
}

#[tokio::test]
async fn lqi_snapshot_maps_sentinels_and_quality_bins() {
    let fx = fixture();
    fx.runtime.registry.add(0x1001, [1; 8]).unwrap();
    fx.runtime.registry.add(0x1002, [2; 8]).unwrap();
    fx.runtime
        .state
        .update_lqi(0x1001, 150, 127, LqiSource::NeighborTable, 9_000)
        .unwrap();
    fx.runtime
        .state
        .update_lqi(0x1002, 70, -80, LqiSource::NeighborTable, 9_001)
        .unwrap();

    let payload = build_lqi_json(&fx.runtime.usecases).await.unwrap();
    let neighbors = payload["neighbors"].as_array().unwrap();
    assert_eq!(neighbors.len(), 2);

    let row1 = &neighbors[0];
    assert_eq!(row1["short_addr"], 0x1001);
    assert_eq!(row1["lqi"], 150);
    assert!(row1["rssi"].is_null());
    assert_eq!(row1["quality"], "warn");

    let row2 = &neighbors[1];
    assert_eq!(row2["lqi"], 70);
    assert_eq!(row2["rssi"], -80);
    assert_eq!(row2["quality"], "bad");

    assert_eq!(payload["updated_ms"], 9_001);
    assert_eq!(payload["source"], "neighbor_table");
}

#[tokio::test]
async fn join_to_broadcast_flow_persists_and_notifies() {
    let fx = fixture();
    fx.runtime.start();
    let (_client, mut frames) = fx.runtime.ws.add_client().unwrap();

    fx.zigbee_stack.set_neighbors(vec![NeighborInfo {
        short_addr: 0x1234,
        lqi: 201,
        rssi: -44,
    }]);
    fx.runtime
        .zigbee
        .submit_signal(ZigbeeSignal::DeviceAnnounce {
            short_addr: 0x1234,
            ieee_addr: [7; 8],
        });

    // The announce runs through the adapter task, the registry, and the
    // broadcaster wake.
    let mut announced = false;
    for _ in 0..500 {
        if fx.runtime.registry.count() == 1 {
            announced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(announced, "announce never reached the registry");

    let devices = fx.runtime.registry.snapshot(16);
    assert_eq!(devices[0].name, "Device 0x1234");
    assert_eq!(devices[0].ieee_addr, [7; 8]);
    assert!(!fx.zigbee_stack.permit_join_open());

    // A devices_delta frame reaches the attached client.
    let mut got_frame = false;
    for _ in 0..500 {
        if let Ok(text) = frames.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            if frame["type"] == "devices_delta"
                && frame["data"]["devices"].as_array().unwrap().len() == 1
            {
                got_frame = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(got_frame, "no devices_delta frame observed");
}

#[tokio::test]
async fn device_list_round_trips_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    {
        let kv = KvStore::open_file(&path).unwrap();
        let runtime = GatewayRuntime::new(GatewayPorts {
            kv,
            wifi_driver: StubWifiDriver::new(),
            zigbee_stack: StubZigbeeStack::new(),
            reboot_hook: Arc::new(NoopReboot),
            rcp_tool: None,
            clock: Arc::new(SteadyClock::new()),
            wifi_settings: WifiSettings::default(),
        })
        .unwrap();
        runtime.registry.add(0x0001, [1; 8]).unwrap();
        runtime.registry.add(0x0002, [2; 8]).unwrap();
        runtime.registry.update_name(0x0002, "Porch light").unwrap();
    }

    let kv = KvStore::open_file(&path).unwrap();
    let runtime = GatewayRuntime::new(GatewayPorts {
        kv,
        wifi_driver: StubWifiDriver::new(),
        zigbee_stack: StubZigbeeStack::new(),
        reboot_hook: Arc::new(NoopReboot),
        rcp_tool: None,
        clock: Arc::new(SteadyClock::new()),
        wifi_settings: WifiSettings::default(),
    })
    .unwrap();

    let devices = runtime.registry.snapshot(16);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].short_addr, 0x0001);
    assert_eq!(devices[1].name, "Porch light");
    // Migration already ran on the first boot; the second is a no-op.
    assert_eq!(runtime.config.schema_version().unwrap(), 1);
}

#[tokio::test]
async fn oversized_scan_result_truncates_at_the_api() {
    let fx = fixture();
    let networks: Vec<WifiApInfo> = (0..20)
        .map(|i| WifiApInfo {
            ssid: format!("network-with-a-rather-long-name-{i:02}"),
            rssi: -60,
            auth: 3,
        })
        .collect();
    fx.wifi_driver.set_networks(networks);
    fx.runtime.start();

    let id = fx.runtime.jobs.submit(JobType::WifiScan, 0).unwrap();
    let info = wait_job_done(&fx.runtime, id).await;
    assert_eq!(info.state, JobState::Succeeded);
    assert!(info.result.as_ref().unwrap().len() > 768);

    let payload = zgw::api::build_job_info_json(&info);
    assert_eq!(payload["result"]["truncated"], true);
    assert_eq!(payload["result"]["max_len"], 768);
}

#[tokio::test]
async fn update_job_without_rcp_tool_fails_not_supported() {
    let fx = fixture();
    fx.runtime.start();

    let id = fx.runtime.jobs.submit(JobType::Update, 0).unwrap();
    let info = wait_job_done(&fx.runtime, id).await;

    assert_eq!(info.state, JobState::Failed);
    assert_eq!(info.error_name(), "NOT_SUPPORTED");
    assert_eq!(
        info.result.as_deref(),
        Some("{\"error\":\"NOT_SUPPORTED\"}")
    );
}

#[tokio::test]
async fn delete_device_triggers_leave_and_prunes_lqi() {
    let fx = fixture();
    fx.runtime.start();

    fx.runtime.registry.add(0x2001, [3; 8]).unwrap();
    fx.runtime
        .state
        .update_lqi(0x2001, 90, -70, LqiSource::NeighborTable, 1)
        .unwrap();

    fx.runtime.usecases.delete_device(0x2001).unwrap();

    assert_eq!(fx.runtime.registry.count(), 0);
    assert!(fx.runtime.state.lqi_snapshot().is_empty());
}
