use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::FactoryResetReport;
use crate::error::GatewayResult;
use crate::service::ConfigService;

/// Performs the actual restart once the delay elapses. The binary exits
/// the process; tests record the call.
pub trait RebootHook: Send + Sync {
    fn reboot(&self);
}

/// Radio co-processor maintenance hook: version-check and mark verified.
/// Absent on builds without an RCP.
#[async_trait]
pub trait RcpTool: Send + Sync {
    async fn check_version(&self) -> GatewayResult<()>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum WifiLinkQuality {
    #[default]
    Unknown,
    Good,
    Warn,
    Bad,
}

impl WifiLinkQuality {
    pub fn from_rssi(rssi: Option<i32>) -> Self {
        match rssi {
            None => WifiLinkQuality::Unknown,
            Some(rssi) if rssi >= -65 => WifiLinkQuality::Good,
            Some(rssi) if rssi >= -75 => WifiLinkQuality::Warn,
            Some(_) => WifiLinkQuality::Bad,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WifiLinkQuality::Unknown => "unknown",
            WifiLinkQuality::Good => "good",
            WifiLinkQuality::Warn => "warn",
            WifiLinkQuality::Bad => "bad",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Telemetry {
    pub uptime_ms: u64,
    pub heap_free: u64,
    pub heap_min: u64,
    pub temperature_c: Option<f32>,
    pub wifi_rssi: Option<i32>,
    pub wifi_ip: Option<String>,
    pub wifi_link_quality: WifiLinkQuality,
}

/// Optional platform readings merged into the telemetry snapshot.
pub trait TelemetryProvider: Send + Sync {
    fn collect(&self) -> Telemetry;
}

#[derive(Default)]
struct RebootState {
    scheduled: bool,
    schedule_count: u32,
}

/// Reboot scheduling and telemetry collection.
pub struct SystemService {
    config: Arc<ConfigService>,
    reboot_hook: Arc<dyn RebootHook>,
    telemetry: Mutex<Option<Arc<dyn TelemetryProvider>>>,
    reboot: Mutex<RebootState>,
    clock: Arc<dyn Clock>,
}

impl SystemService {
    pub fn new(
        config: Arc<ConfigService>,
        reboot_hook: Arc<dyn RebootHook>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(SystemService {
            config,
            reboot_hook,
            telemetry: Mutex::new(None),
            reboot: Mutex::new(RebootState::default()),
            clock,
        })
    }

    pub fn register_telemetry_provider(&self, provider: Arc<dyn TelemetryProvider>) {
        *self.telemetry.lock().expect("lock telemetry") = Some(provider);
    }

    /// Schedules one reboot after `delay_ms`. A reboot already scheduled
    /// makes further requests succeed without another timer task.
    pub fn schedule_reboot(&self, delay_ms: u32) -> GatewayResult<()> {
        {
            let mut state = self.reboot.lock().expect("lock reboot");
            if state.scheduled {
                log::warn!("reboot already scheduled, skipping duplicate request");
                return Ok(());
            }
            state.scheduled = true;
            state.schedule_count += 1;
        }

        let hook = self.reboot_hook.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
            hook.reboot();
        });
        log::info!("reboot scheduled in {delay_ms} ms");
        Ok(())
    }

    pub fn factory_reset_and_reboot(&self, reboot_delay_ms: u32) -> GatewayResult<()> {
        if let Err(e) = self.config.factory_reset() {
            log::error!("factory reset failed: {e}");
            return Err(e);
        }
        self.schedule_reboot(reboot_delay_ms)
    }

    pub fn last_factory_reset_report(&self) -> FactoryResetReport {
        self.config.last_factory_reset_report()
    }

    pub fn collect_telemetry(&self) -> Telemetry {
        let provider = self.telemetry.lock().expect("lock telemetry").clone();
        let mut snapshot = match provider {
            Some(provider) => provider.collect(),
            None => Telemetry::default(),
        };
        if snapshot.uptime_ms == 0 {
            snapshot.uptime_ms = self.clock.now_ms();
        }
        snapshot.wifi_link_quality = WifiLinkQuality::from_rssi(snapshot.wifi_rssi);
        snapshot
    }

    pub fn is_reboot_scheduled(&self) -> bool {
        self.reboot.lock().expect("lock reboot").scheduled
    }

    pub fn reboot_schedule_count(&self) -> u32 {
        self.reboot.lock().expect("lock reboot").schedule_count
    }
}

/// Reboot hook that only logs; useful for tests and dry runs.
pub struct NoopReboot;

impl RebootHook for NoopReboot {
    fn reboot(&self) {
        log::info!("reboot requested (noop hook)");
    }
}
