use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::api::{build_devices_json, build_health_json, build_lqi_json, ApiUsecases, WsIntrospect};
use crate::clock::Clock;

pub const MAX_WS_CLIENTS: usize = 8;
pub const WS_FRAME_BUF_SIZE: usize = 2200;
pub const WS_PROTOCOL_VERSION: u32 = 1;
const MIN_DUP_BROADCAST_INTERVAL_MS: u64 = 250;
const MIN_BROADCAST_INTERVAL_MS: u64 = 120;
const MIN_HEALTH_BROADCAST_INTERVAL_MS: u64 = 800;
const MIN_LQI_BROADCAST_INTERVAL_MS: u64 = 800;
const BROADCAST_RETRY_MS: u64 = 20;
const PERIODIC_BROADCAST_MS: u64 = 1_000;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WsMetrics {
    pub dropped_frames_total: u32,
    pub reconnect_count: u32,
    pub connections_total: u32,
    pub broadcast_lock_skips_total: u32,
}

struct ClientSlot {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

struct WsInner {
    slots: [Option<ClientSlot>; MAX_WS_CLIENTS],
    metrics: WsMetrics,
    next_client_id: u64,
}

#[derive(Default)]
struct StreamState {
    last_payload: Option<String>,
    last_send_ms: u64,
}

#[derive(Default)]
struct BroadcastState {
    devices: StreamState,
    health: StreamState,
    lqi: StreamState,
}

/// Debounced fan-out of the three event streams (`devices_delta`,
/// `health_state`, `lqi_update`) to every attached WebSocket client.
///
/// A broadcast pass is single-flight: the pass currently running holds
/// the stream-state lock, and a concurrent trigger only bumps a metric
/// and re-arms a short retry.
pub struct WsBroadcaster {
    usecases: Arc<ApiUsecases>,
    clock: Arc<dyn Clock>,
    inner: Mutex<WsInner>,
    seq: AtomicU32,
    streams: tokio::sync::Mutex<BroadcastState>,
    wake_tx: mpsc::UnboundedSender<()>,
    wake_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl WsBroadcaster {
    pub fn new(usecases: Arc<ApiUsecases>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        Arc::new(WsBroadcaster {
            usecases,
            clock,
            inner: Mutex::new(WsInner {
                slots: std::array::from_fn(|_| None),
                metrics: WsMetrics::default(),
                next_client_id: 1,
            }),
            seq: AtomicU32::new(0),
            streams: tokio::sync::Mutex::new(BroadcastState::default()),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
        })
    }

    /// Spawns the broadcast task: event wakes plus a 1 Hz tick while at
    /// least one client is attached.
    pub fn start(self: &Arc<Self>) {
        let Some(mut wake_rx) = self.wake_rx.lock().expect("lock ws wake rx").take() else {
            return;
        };
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(PERIODIC_BROADCAST_MS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    wake = wake_rx.recv() => {
                        if wake.is_none() {
                            break;
                        }
                        broadcaster.broadcast_pass().await;
                    }
                    _ = tick.tick() => {
                        if broadcaster.client_count() > 0 {
                            broadcaster.broadcast_pass().await;
                        }
                    }
                }
            }
        });
    }

    /// Wakes the broadcast task; called from event-bus subscribers.
    pub fn notify(&self) {
        let _ = self.wake_tx.send(());
    }

    /// Registers a client and returns its frame stream, or `None` when
    /// all slots are taken.
    pub fn add_client(&self) -> Option<(u64, mpsc::UnboundedReceiver<String>)> {
        let mut inner = self.inner.lock().expect("lock ws clients");
        let free = inner.slots.iter().position(|slot| slot.is_none())?;
        let id = inner.next_client_id;
        inner.next_client_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.slots[free] = Some(ClientSlot { id, tx });
        inner.metrics.connections_total += 1;
        if inner.metrics.connections_total > 1 {
            inner.metrics.reconnect_count += 1;
        }
        Some((id, rx))
    }

    pub fn remove_client(&self, id: u64) {
        let mut inner = self.inner.lock().expect("lock ws clients");
        for slot in inner.slots.iter_mut() {
            if slot.as_ref().is_some_and(|client| client.id == id) {
                *slot = None;
            }
        }
    }

    pub fn client_count(&self) -> u32 {
        let inner = self.inner.lock().expect("lock ws clients");
        inner.slots.iter().filter(|slot| slot.is_some()).count() as u32
    }

    pub fn metrics(&self) -> WsMetrics {
        self.inner.lock().expect("lock ws clients").metrics
    }

    /// One broadcast pass. Public so tests can drive it deterministically.
    pub async fn broadcast_pass(&self) {
        let Ok(mut streams) = self.streams.try_lock() else {
            self.inner
                .lock()
                .expect("lock ws clients")
                .metrics
                .broadcast_lock_skips_total += 1;
            self.arm_retry(BROADCAST_RETRY_MS);
            return;
        };

        let now = self.clock.now_ms();
        let devices = build_devices_json(&self.usecases).to_string();
        let same = streams.devices.last_payload.as_deref() == Some(devices.as_str());
        let elapsed = now.saturating_sub(streams.devices.last_send_ms);

        if same && elapsed < MIN_DUP_BROADCAST_INTERVAL_MS {
            return;
        }
        if streams.devices.last_send_ms > 0 && elapsed < MIN_BROADCAST_INTERVAL_MS {
            self.arm_retry((MIN_BROADCAST_INTERVAL_MS - elapsed).max(1));
            return;
        }

        self.send_frame("devices_delta", &devices, now);
        streams.devices.last_payload = Some(devices);
        streams.devices.last_send_ms = now;

        if now.saturating_sub(streams.health.last_send_ms) >= MIN_HEALTH_BROADCAST_INTERVAL_MS {
            let health = build_health_json(&self.usecases.health_snapshot()).to_string();
            let same_health = streams.health.last_payload.as_deref() == Some(health.as_str());
            let health_elapsed = now.saturating_sub(streams.health.last_send_ms);
            if !same_health || health_elapsed >= MIN_DUP_BROADCAST_INTERVAL_MS {
                self.send_frame("health_state", &health, now);
                streams.health.last_payload = Some(health);
                streams.health.last_send_ms = now;
            }
        }

        if now.saturating_sub(streams.lqi.last_send_ms) >= MIN_LQI_BROADCAST_INTERVAL_MS {
            match build_lqi_json(&self.usecases).await {
                Ok(value) => {
                    let lqi = value.to_string();
                    let same_lqi = streams.lqi.last_payload.as_deref() == Some(lqi.as_str());
                    let lqi_elapsed = now.saturating_sub(streams.lqi.last_send_ms);
                    if !same_lqi || lqi_elapsed >= MIN_DUP_BROADCAST_INTERVAL_MS {
                        self.send_frame("lqi_update", &lqi, now);
                        streams.lqi.last_payload = Some(lqi);
                        streams.lqi.last_send_ms = now;
                    }
                }
                Err(e) => log::warn!("failed to build WS LQI payload: {e}"),
            }
        }
    }

    fn send_frame(&self, frame_type: &str, payload: &str, ts_ms: u64) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = format!(
            "{{\"version\":{WS_PROTOCOL_VERSION},\"seq\":{seq},\"ts\":{ts_ms},\"type\":\"{frame_type}\",\"data\":{payload}}}"
        );
        if frame.len() > WS_FRAME_BUF_SIZE {
            log::warn!(
                "WS frame for '{frame_type}' exceeds buffer ({} > {WS_FRAME_BUF_SIZE})",
                frame.len()
            );
            return;
        }

        let mut inner = self.inner.lock().expect("lock ws clients");
        let mut dropped = 0;
        for slot in inner.slots.iter_mut() {
            let failed = slot
                .as_ref()
                .map(|client| client.tx.send(frame.clone()).is_err())
                .unwrap_or(false);
            if failed {
                *slot = None;
                dropped += 1;
            }
        }
        inner.metrics.dropped_frames_total += dropped;
    }

    fn arm_retry(&self, delay_ms: u64) {
        let wake_tx = self.wake_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = wake_tx.send(());
        });
    }
}

impl WsIntrospect for WsBroadcaster {
    fn client_count(&self) -> u32 {
        WsBroadcaster::client_count(self)
    }

    fn ws_metrics(&self) -> WsMetrics {
        self.metrics()
    }
}

/// Serves one accepted WebSocket connection until either side drops.
pub async fn serve_socket(socket: WebSocket, broadcaster: Arc<WsBroadcaster>) {
    let Some((client_id, mut frames)) = broadcaster.add_client() else {
        log::warn!("WS client rejected: all {MAX_WS_CLIENTS} slots in use");
        return;
    };
    log::info!("WS client {client_id} attached");
    broadcaster.notify();

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    broadcaster.remove_client(client_id);
    log::info!("WS client {client_id} detached");
}
