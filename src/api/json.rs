use serde_json::{json, Value};

use crate::api::{ApiUsecases, HealthSnapshot};
use crate::config::DeviceRecord;
use crate::error::GatewayResult;
use crate::service::{
    lqi_invalid, lqi_quality_label, rssi_invalid, JobInfo, JobType, LqiEntry, LqiSource,
};

// Per-type caps applied to the embedded `result` of `GET /jobs/<id>`.
pub fn job_result_json_limit(ty: JobType) -> usize {
    match ty {
        JobType::WifiScan => 768,
        JobType::FactoryReset => 1536,
        JobType::Reboot => 512,
        JobType::Update => 768,
        JobType::LqiRefresh => 1024,
    }
}

pub fn build_devices_json(usecases: &ApiUsecases) -> Value {
    json!({ "devices": device_rows(&usecases.devices_snapshot()) })
}

/// `/status` payload. The top-level pan/channel/short fields duplicate
/// the nested `zigbee` object for legacy clients.
pub fn build_status_json(usecases: &ApiUsecases) -> Value {
    let status = usecases.network_status();
    let zigbee = json!({
        "pan_id": status.pan_id,
        "channel": status.channel,
        "short_addr": status.short_addr,
    });
    json!({
        "pan_id": status.pan_id,
        "channel": status.channel,
        "short_addr": status.short_addr,
        "zigbee": zigbee,
        "devices": device_rows(&usecases.devices_snapshot()),
    })
}

/// `/lqi` and `lqi_update` payload: one row per registered device,
/// enriched from the LQI cache. Falls back to a live neighbor-table read
/// when the cache has never been populated.
pub async fn build_lqi_json(usecases: &ApiUsecases) -> GatewayResult<Value> {
    let devices = usecases.devices_snapshot();
    let (mut rows, mut source, mut updated_ms) = usecases.cached_lqi_snapshot();
    if updated_ms == 0 {
        rows = usecases.neighbor_lqi_live().await?;
        source = LqiSource::NeighborTable;
        updated_ms = rows.iter().map(|row| row.updated_ms).max().unwrap_or(0);
    }
    Ok(lqi_payload(&devices, &rows, source, updated_ms))
}

pub(crate) fn lqi_payload(
    devices: &[DeviceRecord],
    rows: &[LqiEntry],
    source: LqiSource,
    updated_ms: u64,
) -> Value {
    let neighbors: Vec<Value> = devices
        .iter()
        .map(|device| {
            let row = rows.iter().find(|row| row.short_addr == device.short_addr);
            match row {
                Some(row) => json!({
                    "short_addr": device.short_addr,
                    "name": device.name,
                    "lqi": nullable_lqi(row.lqi),
                    "rssi": nullable_rssi(row.rssi),
                    "quality": lqi_quality_label(row.lqi),
                    "direct": true,
                    "source": row.source.label(),
                    "updated_ms": row.updated_ms,
                }),
                None => json!({
                    "short_addr": device.short_addr,
                    "name": device.name,
                    "lqi": Value::Null,
                    "rssi": Value::Null,
                    "quality": "unknown",
                    "direct": false,
                    "source": LqiSource::Unknown.label(),
                    "updated_ms": 0,
                }),
            }
        })
        .collect();

    json!({
        "neighbors": neighbors,
        "updated_ms": updated_ms,
        "source": source.label(),
    })
}

pub fn build_health_json(snapshot: &HealthSnapshot) -> Value {
    json!({
        "zigbee": {
            "started": snapshot.zigbee_started,
            "factory_new": snapshot.zigbee_factory_new,
            "pan_id": snapshot.zigbee_pan_id,
            "channel": snapshot.zigbee_channel,
            "short_addr": snapshot.zigbee_short_addr,
        },
        "wifi": {
            "sta_connected": snapshot.wifi.sta_connected,
            "fallback_ap_active": snapshot.wifi.fallback_ap_active,
            "loaded_from_nvs": snapshot.wifi.loaded_from_nvs,
            "active_ssid": snapshot.wifi.active_ssid,
        },
        "nvs": {
            "ok": snapshot.nvs_ok,
            "schema_version": snapshot.nvs_schema_version,
        },
        "ws": {
            "clients": snapshot.ws_clients,
            "dropped_frames_total": snapshot.ws_metrics.dropped_frames_total,
            "reconnect_count": snapshot.ws_metrics.reconnect_count,
            "connections_total": snapshot.ws_metrics.connections_total,
            "broadcast_lock_skips_total": snapshot.ws_metrics.broadcast_lock_skips_total,
        },
        "telemetry": {
            "uptime_ms": snapshot.telemetry.uptime_ms,
            "heap_free": snapshot.telemetry.heap_free,
            "heap_min": snapshot.telemetry.heap_min,
            "temperature_c": snapshot.telemetry.temperature_c,
            "wifi_rssi": snapshot.telemetry.wifi_rssi,
            "wifi_ip": snapshot.telemetry.wifi_ip,
            "wifi_link_quality": snapshot.telemetry.wifi_link_quality.label(),
        },
        "jobs": {
            "submitted_total": snapshot.jobs_metrics.submitted_total,
            "dedup_reused_total": snapshot.jobs_metrics.dedup_reused_total,
            "completed_total": snapshot.jobs_metrics.completed_total,
            "failed_total": snapshot.jobs_metrics.failed_total,
            "queue_depth_current": snapshot.jobs_metrics.queue_depth_current,
            "queue_depth_peak": snapshot.jobs_metrics.queue_depth_peak,
            "latency_p95_ms": snapshot.jobs_metrics.latency_p95_ms,
        },
    })
}

pub fn build_job_submitted_json(job_id: u32, ty: JobType) -> Value {
    json!({
        "job_id": job_id,
        "type": ty.as_str(),
        "state": "queued",
    })
}

/// `GET /jobs/<id>` payload. Results larger than the per-type cap are
/// replaced by a truncation envelope, never shipped whole.
pub fn build_job_info_json(info: &JobInfo) -> Value {
    let result = match &info.result {
        None => Value::Null,
        Some(raw) => {
            let limit = job_result_json_limit(info.ty);
            if raw.len() > limit {
                json!({
                    "truncated": true,
                    "original_len": raw.len(),
                    "max_len": limit,
                })
            } else {
                serde_json::from_str(raw).unwrap_or(Value::Null)
            }
        }
    };
    json!({
        "job_id": info.id,
        "type": info.ty.as_str(),
        "state": info.state.as_str(),
        "done": info.state.is_terminal(),
        "created_ms": info.created_ms,
        "updated_ms": info.updated_ms,
        "error": info.error_name(),
        "result": result,
    })
}

fn device_rows(devices: &[DeviceRecord]) -> Vec<Value> {
    devices
        .iter()
        .map(|device| {
            json!({
                "name": device.name,
                "short_addr": device.short_addr,
            })
        })
        .collect()
}

fn nullable_lqi(lqi: i32) -> Value {
    if lqi_invalid(lqi) {
        Value::Null
    } else {
        json!(lqi)
    }
}

fn nullable_rssi(rssi: i32) -> Value {
    if rssi_invalid(rssi) {
        Value::Null
    } else {
        json!(rssi)
    }
}
