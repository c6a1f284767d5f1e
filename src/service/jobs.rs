use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::config::truncate_utf8;
use crate::error::{status_name, GatewayError, GatewayResult};
use crate::event::{EventBus, GatewayEvent};
use crate::service::{
    lqi_invalid, lqi_quality_label, rssi_invalid, ConfigService, RcpTool, SystemService,
    WifiService, ZigbeeService,
};

pub const JOB_SLOT_COUNT: usize = 12;
pub const JOB_RESULT_MAX_LEN: usize = 2048;
pub const JOB_TERMINAL_TTL_MS: u64 = 30_000;
const LATENCY_RING_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum JobType {
    WifiScan,
    FactoryReset,
    Reboot,
    Update,
    LqiRefresh,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::WifiScan => "scan",
            JobType::FactoryReset => "factory_reset",
            JobType::Reboot => "reboot",
            JobType::Update => "update",
            JobType::LqiRefresh => "lqi_refresh",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "scan" => Some(JobType::WifiScan),
            "factory_reset" => Some(JobType::FactoryReset),
            "reboot" => Some(JobType::Reboot),
            "update" => Some(JobType::Update),
            "lqi_refresh" => Some(JobType::LqiRefresh),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Clone, Debug)]
struct JobSlot {
    used: bool,
    id: u32,
    ty: JobType,
    state: JobState,
    err: Option<GatewayError>,
    created_ms: u64,
    updated_ms: u64,
    reboot_delay_ms: u32,
    result: Option<String>,
}

impl Default for JobSlot {
    fn default() -> Self {
        JobSlot {
            used: false,
            id: 0,
            ty: JobType::WifiScan,
            state: JobState::Queued,
            err: None,
            created_ms: 0,
            updated_ms: 0,
            reboot_delay_ms: 0,
            result: None,
        }
    }
}

/// Caller-visible view of one job slot.
#[derive(Clone, Debug, PartialEq)]
pub struct JobInfo {
    pub id: u32,
    pub ty: JobType,
    pub state: JobState,
    pub err: Option<GatewayError>,
    pub created_ms: u64,
    pub updated_ms: u64,
    pub result: Option<String>,
}

impl JobInfo {
    pub fn error_name(&self) -> &'static str {
        match self.err {
            None => "OK",
            Some(e) => e.name(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct JobMetrics {
    pub submitted_total: u32,
    pub dedup_reused_total: u32,
    pub completed_total: u32,
    pub failed_total: u32,
    pub queue_depth_current: u32,
    pub queue_depth_peak: u32,
    pub latency_p95_ms: u32,
}

struct JobTable {
    slots: [JobSlot; JOB_SLOT_COUNT],
    next_id: u32,
    metrics: JobMetrics,
    latency: [u32; LATENCY_RING_CAPACITY],
    latency_count: usize,
    latency_next: usize,
}

impl JobTable {
    fn new() -> Self {
        JobTable {
            slots: std::array::from_fn(|_| JobSlot::default()),
            next_id: 1,
            metrics: JobMetrics::default(),
            latency: [0; LATENCY_RING_CAPACITY],
            latency_count: 0,
            latency_next: 0,
        }
    }

    fn find_by_id(&self, id: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.used && slot.id == id)
    }

    /// Finds a queued or running slot for the same work item. Reboot jobs
    /// are keyed by their delay as well.
    fn find_inflight(&self, ty: JobType, reboot_delay_ms: u32) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.used
                && slot.ty == ty
                && !slot.state.is_terminal()
                && (ty != JobType::Reboot || slot.reboot_delay_ms == reboot_delay_ms)
        })
    }

    /// Frees terminal slots older than the TTL.
    fn prune_completed(&mut self, now_ms: u64) {
        for slot in &mut self.slots {
            if slot.used
                && slot.state.is_terminal()
                && now_ms >= slot.updated_ms
                && now_ms - slot.updated_ms >= JOB_TERMINAL_TTL_MS
            {
                *slot = JobSlot::default();
            }
        }
    }

    /// Returns a free slot, evicting the stalest terminal slot when the
    /// table is full. `None` means every slot is active.
    fn alloc(&mut self) -> Option<usize> {
        if let Some(index) = self.slots.iter().position(|slot| !slot.used) {
            return Some(index);
        }
        let mut evict: Option<(usize, u64)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.state.is_terminal() {
                match evict {
                    Some((_, oldest)) if slot.updated_ms > oldest => {}
                    _ => evict = Some((index, slot.updated_ms)),
                }
            }
        }
        if let Some((index, _)) = evict {
            log::warn!(
                "job slots full, evicting completed job id={}",
                self.slots[index].id
            );
            self.slots[index] = JobSlot::default();
            return Some(index);
        }
        None
    }

    fn inflight_depth(&self) -> u32 {
        self.slots
            .iter()
            .filter(|slot| slot.used && !slot.state.is_terminal())
            .count() as u32
    }

    fn push_latency(&mut self, latency_ms: u32) {
        self.latency[self.latency_next] = latency_ms;
        self.latency_next = (self.latency_next + 1) % LATENCY_RING_CAPACITY;
        if self.latency_count < LATENCY_RING_CAPACITY {
            self.latency_count += 1;
        }
    }
}

pub(crate) fn latency_p95(samples: &[u32]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let index = if n == 1 { 0 } else { (n * 95).div_ceil(100) - 1 };
    sorted[index.min(n - 1)]
}

/// Executes one job and returns its result JSON. The production policy
/// dispatches into the gateway services; tests substitute their own.
#[async_trait]
pub trait JobPolicy: Send + Sync {
    async fn execute(&self, ty: JobType, reboot_delay_ms: u32) -> GatewayResult<String>;
}

/// Bounded asynchronous job queue: a fixed slot table, a FIFO drained by
/// one worker task, single-flight deduplication, and run metrics.
pub struct JobQueue {
    table: Mutex<JobTable>,
    tx: mpsc::Sender<u32>,
    rx: Mutex<Option<mpsc::Receiver<u32>>>,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(JOB_SLOT_COUNT);
        Arc::new(JobQueue {
            table: Mutex::new(JobTable::new()),
            tx,
            rx: Mutex::new(Some(rx)),
            clock,
        })
    }

    /// Spawns the worker task. Call once after wiring.
    pub fn start(self: &Arc<Self>, policy: Arc<dyn JobPolicy>, bus: Arc<EventBus>) {
        let Some(mut rx) = self.rx.lock().expect("lock job rx").take() else {
            return;
        };
        let queue = self.clone();
        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                queue.execute(id, &policy, &bus).await;
            }
        });
    }

    /// Queues a job, reusing an in-flight slot of the same kind.
    pub fn submit(&self, ty: JobType, reboot_delay_ms: u32) -> GatewayResult<u32> {
        let id;
        let index;
        {
            let mut table = self.table.lock().expect("lock job table");
            let now = self.clock.now_ms();
            table.prune_completed(now);

            if let Some(inflight) = table.find_inflight(ty, reboot_delay_ms) {
                let slot = &table.slots[inflight];
                let reused_id = slot.id;
                log::info!(
                    "job single-flight reuse id={reused_id} type={} state={}",
                    ty.as_str(),
                    slot.state.as_str()
                );
                table.metrics.dedup_reused_total += 1;
                return Ok(reused_id);
            }

            index = table.alloc().ok_or(GatewayError::NoMem)?;

            id = table.next_id;
            table.next_id = table.next_id.wrapping_add(1);
            if table.next_id == 0 {
                table.next_id = 1;
            }

            table.slots[index] = JobSlot {
                used: true,
                id,
                ty,
                state: JobState::Queued,
                err: None,
                created_ms: now,
                updated_ms: now,
                reboot_delay_ms,
                result: None,
            };
            table.metrics.submitted_total += 1;
            table.metrics.queue_depth_current = table.inflight_depth();
            if table.metrics.queue_depth_current > table.metrics.queue_depth_peak {
                table.metrics.queue_depth_peak = table.metrics.queue_depth_current;
            }
        }

        if self.tx.try_send(id).is_err() {
            let mut table = self.table.lock().expect("lock job table");
            table.slots[index] = JobSlot::default();
            return Err(GatewayError::NoMem);
        }

        log::info!("job queued id={id} type={}", ty.as_str());
        Ok(id)
    }

    pub fn get(&self, id: u32) -> GatewayResult<JobInfo> {
        if id == 0 {
            return Err(GatewayError::InvalidArg);
        }
        let table = self.table.lock().expect("lock job table");
        let index = table.find_by_id(id).ok_or(GatewayError::NotFound)?;
        let slot = &table.slots[index];
        Ok(JobInfo {
            id: slot.id,
            ty: slot.ty,
            state: slot.state,
            err: slot.err,
            created_ms: slot.created_ms,
            updated_ms: slot.updated_ms,
            result: slot.result.clone(),
        })
    }

    pub fn metrics(&self) -> JobMetrics {
        let mut table = self.table.lock().expect("lock job table");
        table.metrics.queue_depth_current = table.inflight_depth();
        table.metrics.latency_p95_ms = latency_p95(&table.latency[..table.latency_count]);
        table.metrics
    }

    async fn execute(&self, id: u32, policy: &Arc<dyn JobPolicy>, bus: &Arc<EventBus>) {
        let Some((ty, reboot_delay_ms)) = self.mark_running(id) else {
            return;
        };

        // The policy runs without the queue lock.
        let outcome = policy.execute(ty, reboot_delay_ms).await;
        let succeeded = outcome.is_ok();
        self.finalize(id, outcome);

        if succeeded && ty == JobType::LqiRefresh {
            bus.post(GatewayEvent::LqiStateChanged);
        }
    }

    fn mark_running(&self, id: u32) -> Option<(JobType, u32)> {
        let mut table = self.table.lock().expect("lock job table");
        let index = table.find_by_id(id)?;
        let now = self.clock.now_ms();
        let slot = &mut table.slots[index];
        slot.state = JobState::Running;
        slot.updated_ms = now;
        Some((slot.ty, slot.reboot_delay_ms))
    }

    fn finalize(&self, id: u32, outcome: GatewayResult<String>) {
        let mut table = self.table.lock().expect("lock job table");
        let Some(index) = table.find_by_id(id) else {
            return;
        };
        let now = self.clock.now_ms();

        let (state, err, result) = match outcome {
            Ok(json) => (
                JobState::Succeeded,
                None,
                truncate_utf8(&json, JOB_RESULT_MAX_LEN).to_string(),
            ),
            Err(e) => (
                JobState::Failed,
                Some(e),
                format!("{{\"error\":\"{}\"}}", e.name()),
            ),
        };

        let latency = {
            let slot = &mut table.slots[index];
            slot.state = state;
            slot.err = err;
            slot.updated_ms = now;
            slot.result = Some(result);
            now.saturating_sub(slot.created_ms).min(u64::from(u32::MAX)) as u32
        };
        table.push_latency(latency);
        if state == JobState::Succeeded {
            table.metrics.completed_total += 1;
        } else {
            table.metrics.failed_total += 1;
        }
        table.metrics.queue_depth_current = table.inflight_depth();
    }
}

/// Production job policy over the gateway services.
pub struct GatewayJobPolicy {
    wifi: Arc<WifiService>,
    config: Arc<ConfigService>,
    system: Arc<SystemService>,
    zigbee: Arc<ZigbeeService>,
    rcp: Option<Arc<dyn RcpTool>>,
}

impl GatewayJobPolicy {
    pub fn new(
        wifi: Arc<WifiService>,
        config: Arc<ConfigService>,
        system: Arc<SystemService>,
        zigbee: Arc<ZigbeeService>,
        rcp: Option<Arc<dyn RcpTool>>,
    ) -> Arc<Self> {
        Arc::new(GatewayJobPolicy {
            wifi,
            config,
            system,
            zigbee,
            rcp,
        })
    }
}

#[async_trait]
impl JobPolicy for GatewayJobPolicy {
    async fn execute(&self, ty: JobType, reboot_delay_ms: u32) -> GatewayResult<String> {
        match ty {
            JobType::WifiScan => {
                let networks = self.wifi.scan().await?;
                Ok(json!({
                    "count": networks.len(),
                    "networks": networks,
                })
                .to_string())
            }
            JobType::FactoryReset => {
                self.config.factory_reset()?;
                let report = self.config.last_factory_reset_report();
                Ok(json!({
                    "message": "Factory reset completed",
                    "details": {
                        "wifi": status_name(&report.wifi),
                        "devices": status_name(&report.devices),
                        "zigbee_storage": status_name(&report.zigbee_storage),
                        "zigbee_fct": status_name(&report.zigbee_fct),
                    },
                })
                .to_string())
            }
            JobType::Reboot => {
                self.system.schedule_reboot(reboot_delay_ms)?;
                Ok(json!({
                    "message": "Reboot scheduled",
                    "delay_ms": reboot_delay_ms,
                })
                .to_string())
            }
            JobType::Update => match &self.rcp {
                None => Err(GatewayError::NotSupported),
                Some(tool) => {
                    tool.check_version().await?;
                    Ok(json!({"message": "Update check completed"}).to_string())
                }
            },
            JobType::LqiRefresh => {
                let rows = self.zigbee.refresh_neighbor_lqi_snapshot().await?;
                let neighbors: Vec<serde_json::Value> = rows
                    .iter()
                    .map(|row| {
                        json!({
                            "short_addr": row.short_addr,
                            "lqi": if lqi_invalid(row.lqi) {
                                serde_json::Value::Null
                            } else {
                                json!(row.lqi)
                            },
                            "rssi": if rssi_invalid(row.rssi) {
                                serde_json::Value::Null
                            } else {
                                json!(row.rssi)
                            },
                            "quality": lqi_quality_label(row.lqi),
                        })
                    })
                    .collect();
                Ok(json!({
                    "count": rows.len(),
                    "neighbors": neighbors,
                })
                .to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SteadyClock};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    struct TestPolicy {
        delay: Duration,
        fail: AtomicBool,
        executions: AtomicU32,
        payload: String,
    }

    impl TestPolicy {
        fn instant() -> Arc<Self> {
            Arc::new(TestPolicy {
                delay: Duration::ZERO,
                fail: AtomicBool::new(false),
                executions: AtomicU32::new(0),
                payload: "{\"ok\":true}".to_string(),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(TestPolicy {
                delay,
                fail: AtomicBool::new(false),
                executions: AtomicU32::new(0),
                payload: "{\"ok\":true}".to_string(),
            })
        }
    }

    #[async_trait]
    impl JobPolicy for TestPolicy {
        async fn execute(&self, _ty: JobType, _delay: u32) -> GatewayResult<String> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                Err(GatewayError::Fail)
            } else {
                Ok(self.payload.clone())
            }
        }
    }

    async fn wait_done(queue: &Arc<JobQueue>, id: u32) -> JobInfo {
        for _ in 0..2_000 {
            if let Ok(info) = queue.get(id) {
                if info.state.is_terminal() {
                    return info;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn lifecycle_reaches_succeeded_in_order() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let policy = TestPolicy::slow(Duration::from_millis(50));
        queue.start(policy.clone() as Arc<dyn JobPolicy>, EventBus::new());

        let id = queue.submit(JobType::WifiScan, 0).unwrap();
        assert!(id > 0);

        let mut last = JobState::Queued;
        let info = loop {
            let info = queue.get(id).unwrap();
            // No skipping backwards through the lifecycle.
            match (last, info.state) {
                (JobState::Running, JobState::Queued) => panic!("state went backwards"),
                (JobState::Succeeded, s) if s != JobState::Succeeded => {
                    panic!("left terminal state")
                }
                _ => {}
            }
            last = info.state;
            if info.state.is_terminal() {
                break info;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        assert_eq!(info.state, JobState::Succeeded);
        assert_eq!(info.error_name(), "OK");
        assert_eq!(info.result.as_deref(), Some("{\"ok\":true}"));
        assert!(info.updated_ms >= info.created_ms);
    }

    #[tokio::test]
    async fn concurrent_submits_are_single_flight() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let policy = TestPolicy::slow(Duration::from_millis(300));
        queue.start(policy.clone() as Arc<dyn JobPolicy>, EventBus::new());

        let first = queue.submit(JobType::WifiScan, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = queue.submit(JobType::WifiScan, 0).unwrap();

        assert_eq!(first, second);
        wait_done(&queue, first).await;
        assert_eq!(policy.executions.load(Ordering::SeqCst), 1);

        let metrics = queue.metrics();
        assert_eq!(metrics.submitted_total, 1);
        assert_eq!(metrics.dedup_reused_total, 1);
    }

    #[tokio::test]
    async fn reboot_dedup_is_keyed_by_delay() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let policy = TestPolicy::slow(Duration::from_millis(200));
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        let a = queue.submit(JobType::Reboot, 1_000).unwrap();
        let b = queue.submit(JobType::Reboot, 2_000).unwrap();
        let c = queue.submit(JobType::Reboot, 1_000).unwrap();

        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[tokio::test]
    async fn failure_stores_error_payload() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let policy = TestPolicy::instant();
        policy.fail.store(true, Ordering::SeqCst);
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        let id = queue.submit(JobType::Update, 0).unwrap();
        let info = wait_done(&queue, id).await;

        assert_eq!(info.state, JobState::Failed);
        assert_eq!(info.error_name(), "FAIL");
        assert_eq!(info.result.as_deref(), Some("{\"error\":\"FAIL\"}"));
        assert_eq!(queue.metrics().failed_total, 1);
    }

    #[tokio::test]
    async fn oversized_result_is_truncated() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let policy = Arc::new(TestPolicy {
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            executions: AtomicU32::new(0),
            payload: "x".repeat(5_000),
        });
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        let id = queue.submit(JobType::WifiScan, 0).unwrap();
        let info = wait_done(&queue, id).await;
        assert_eq!(info.result.unwrap().len(), JOB_RESULT_MAX_LEN);
    }

    #[tokio::test]
    async fn terminal_slots_are_pruned_after_ttl() {
        let clock = ManualClock::new(1_000);
        let queue = JobQueue::new(clock.clone());
        let policy = TestPolicy::instant();
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        let id = queue.submit(JobType::WifiScan, 0).unwrap();
        wait_done(&queue, id).await;

        clock.advance(JOB_TERMINAL_TTL_MS);
        let next = queue.submit(JobType::LqiRefresh, 0).unwrap();
        assert_ne!(id, next);
        assert_eq!(queue.get(id), Err(GatewayError::NotFound));
    }

    #[tokio::test]
    async fn full_table_evicts_oldest_terminal() {
        let clock = ManualClock::new(1_000);
        let queue = JobQueue::new(clock.clone());
        let policy = TestPolicy::instant();
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        let mut ids = Vec::new();
        for _ in 0..JOB_SLOT_COUNT {
            let id = queue.submit(JobType::WifiScan, 0).unwrap();
            ids.push(id);
            wait_done(&queue, id).await;
            // Distinct terminal stamps so the eviction order is stable.
            clock.advance(1);
        }

        let extra = queue.submit(JobType::WifiScan, 0).unwrap();
        assert!(ids.iter().all(|id| *id != extra));
        // The stalest terminal slot made room.
        assert_eq!(queue.get(ids[0]), Err(GatewayError::NotFound));
        assert!(queue.get(ids[1]).is_ok());
    }

    #[tokio::test]
    async fn all_active_slots_is_no_mem() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let policy = TestPolicy::slow(Duration::from_secs(3_600));
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        for delay in 0..JOB_SLOT_COUNT as u32 {
            queue.submit(JobType::Reboot, delay).unwrap();
        }
        assert_eq!(
            queue.submit(JobType::Reboot, 9_999),
            Err(GatewayError::NoMem)
        );
        // Only one slot per (type, delay) pair is ever in flight.
        let metrics = queue.metrics();
        assert_eq!(metrics.queue_depth_current, JOB_SLOT_COUNT as u32);
    }

    #[tokio::test]
    async fn successful_lqi_refresh_publishes_event() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        let bus = EventBus::new();
        let seen = Arc::new(AtomicU32::new(0));
        let sink = seen.clone();
        bus.subscribe(move |event| {
            if matches!(event, GatewayEvent::LqiStateChanged) {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        });
        queue.start(TestPolicy::instant() as Arc<dyn JobPolicy>, bus);

        let id = queue.submit(JobType::LqiRefresh, 0).unwrap();
        wait_done(&queue, id).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn p95_math_matches_the_ring_contract() {
        assert_eq!(latency_p95(&[]), 0);
        assert_eq!(latency_p95(&[42]), 42);
        let samples: Vec<u32> = (1..=20).collect();
        // ceil(20 * 0.95) - 1 = index 18 -> value 19
        assert_eq!(latency_p95(&samples), 19);
        let samples: Vec<u32> = (1..=64).collect();
        // ceil(64 * 0.95) - 1 = index 60 -> value 61
        assert_eq!(latency_p95(&samples), 61);
    }

    #[tokio::test]
    async fn ids_skip_zero_on_wrap() {
        let queue = JobQueue::new(Arc::new(SteadyClock::new()));
        {
            let mut table = queue.table.lock().unwrap();
            table.next_id = u32::MAX;
        }
        let policy = TestPolicy::slow(Duration::from_secs(3_600));
        queue.start(policy as Arc<dyn JobPolicy>, EventBus::new());

        let a = queue.submit(JobType::Reboot, 1).unwrap();
        let b = queue.submit(JobType::Reboot, 2).unwrap();
        assert_eq!(a, u32::MAX);
        assert_eq!(b, 1);
    }
}
