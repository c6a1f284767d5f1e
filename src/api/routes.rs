use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use include_dir::{include_dir, Dir};
use serde_json::json;

use crate::api::{
    build_health_json, build_job_info_json, build_job_submitted_json, build_lqi_json,
    build_status_json, error_response, ok_response, parse_body, serve_socket, ApiUsecases,
    ControlRequest, DeleteRequest, ErrorRing, JobSubmitRequest, RenameRequest, WifiSaveRequest,
    WsBroadcaster,
};
use crate::error::GatewayError;

static WEB_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

#[derive(Clone)]
pub struct AppState {
    pub usecases: Arc<ApiUsecases>,
    pub ws: Arc<WsBroadcaster>,
    pub error_ring: Arc<ErrorRing>,
}

/// Full gateway router: the API surface mounted under both `/api/v1` and
/// the legacy `/api`, the WebSocket upgrade, and the static UI.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/lqi", get(get_lqi))
        .route("/health", get(get_health))
        .route("/permit_join", post(post_permit_join))
        .route("/control", post(post_control))
        .route("/delete", post(post_delete))
        .route("/rename", post(post_rename))
        .route("/wifi/scan", get(get_wifi_scan))
        .route("/settings/wifi", post(post_settings_wifi))
        .route("/reboot", post(post_reboot))
        .route("/factory_reset", post(post_factory_reset))
        .route("/jobs", post(post_jobs))
        .route("/jobs/:id", get(get_job));

    Router::new()
        .route("/", get(get_index))
        .route("/style.css", get(get_style))
        .route("/script.js", get(get_script))
        .route("/favicon.ico", get(get_favicon))
        .route("/ws", get(get_ws))
        .nest("/api/v1", api.clone())
        .nest("/api", api)
        .with_state(state)
}

/// Normalizes a failed use-case into the error envelope and records it
/// for diagnostics.
fn fail(state: &AppState, error: GatewayError, message: &str) -> Response {
    state
        .error_ring
        .add("api", i32::from(error.http_status()), message);
    error_response(error, message)
}

async fn get_status(State(state): State<AppState>) -> Response {
    ok_response(build_status_json(&state.usecases))
}

async fn get_lqi(State(state): State<AppState>) -> Response {
    match build_lqi_json(&state.usecases).await {
        Ok(payload) => ok_response(payload),
        Err(e) => fail(&state, e, "Failed to read link quality"),
    }
}

async fn get_health(State(state): State<AppState>) -> Response {
    ok_response(build_health_json(&state.usecases.health_snapshot()))
}

async fn post_permit_join(State(state): State<AppState>) -> Response {
    match state.usecases.permit_join_default().await {
        Ok(()) => ok_response(json!({"message": "Network open for joining"})),
        Err(e) => fail(&state, e, "Failed to open network"),
    }
}

async fn post_control(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ControlRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return fail(&state, e, "Invalid control payload"),
    };
    match state.usecases.control(&request).await {
        Ok(()) => ok_response(json!({"message": "Command sent"})),
        Err(e) => fail(&state, e, "Failed to send command"),
    }
}

async fn post_delete(State(state): State<AppState>, body: Bytes) -> Response {
    let request: DeleteRequest = match parse_body::<DeleteRequest>(&body)
        .and_then(|request| request.validate().map(|()| request))
    {
        Ok(request) => request,
        Err(e) => return fail(&state, e, "Invalid delete payload"),
    };
    match state.usecases.delete_device(request.short_addr) {
        Ok(()) => ok_response(json!({"message": "Device removed"})),
        Err(e) => fail(&state, e, "Failed to remove device"),
    }
}

async fn post_rename(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RenameRequest = match parse_body::<RenameRequest>(&body)
        .and_then(|request| request.validate().map(|()| request))
    {
        Ok(request) => request,
        Err(e) => return fail(&state, e, "Invalid rename payload"),
    };
    match state
        .usecases
        .rename_device(request.short_addr, &request.name)
    {
        Ok(()) => ok_response(json!({"message": "Device renamed"})),
        Err(e) => fail(&state, e, "Failed to rename device"),
    }
}

async fn get_wifi_scan(State(state): State<AppState>) -> Response {
    match state.usecases.wifi_scan().await {
        Ok(networks) => ok_response(json!(networks)),
        Err(e) => fail(&state, e, "Wi-Fi scan failed"),
    }
}

async fn post_settings_wifi(State(state): State<AppState>, body: Bytes) -> Response {
    let request: WifiSaveRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return fail(&state, e, "Invalid Wi-Fi settings payload"),
    };
    match state.usecases.wifi_save(&request) {
        Ok(()) => ok_response(json!({"message": "Settings saved, rebooting"})),
        Err(e) => fail(&state, e, "Failed to save Wi-Fi settings"),
    }
}

async fn post_reboot(State(state): State<AppState>) -> Response {
    match state.usecases.schedule_reboot(1_000) {
        Ok(()) => ok_response(json!({"message": "Rebooting in 1 second"})),
        Err(e) => fail(&state, e, "Failed to schedule reboot"),
    }
}

async fn post_factory_reset(State(state): State<AppState>) -> Response {
    match state.usecases.factory_reset() {
        Ok(()) => ok_response(json!({"message": "Factory reset completed, rebooting"})),
        Err(e) => fail(&state, e, "Factory reset failed"),
    }
}

async fn post_jobs(State(state): State<AppState>, body: Bytes) -> Response {
    let request: JobSubmitRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return fail(&state, e, "Invalid job payload"),
    };
    let ty = match request.job_type() {
        Ok(ty) => ty,
        Err(e) => return fail(&state, e, "Unknown job type"),
    };
    match state.usecases.jobs_submit(&request) {
        Ok(job_id) => ok_response(build_job_submitted_json(job_id, ty)),
        Err(e) => fail(&state, e, "Failed to queue job"),
    }
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let job_id = match id.parse::<u32>() {
        Ok(job_id) if job_id > 0 => job_id,
        _ => return fail(&state, GatewayError::InvalidArg, "Invalid job id"),
    };
    match state.usecases.jobs_get(job_id) {
        Ok(info) => ok_response(build_job_info_json(&info)),
        Err(e) => fail(&state, e, "Job not found"),
    }
}

async fn get_ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let broadcaster = state.ws.clone();
    upgrade.on_upgrade(move |socket| serve_socket(socket, broadcaster))
}

async fn get_index() -> Response {
    asset("index.html", "text/html; charset=utf-8")
}

async fn get_style() -> Response {
    asset("style.css", "text/css")
}

async fn get_script() -> Response {
    asset("script.js", "application/javascript")
}

async fn get_favicon() -> Response {
    asset("favicon.ico", "image/x-icon")
}

fn asset(path: &str, content_type: &'static str) -> Response {
    match WEB_ASSETS.get_file(path) {
        Some(file) => (
            [(header::CONTENT_TYPE, content_type)],
            file.contents().to_vec(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::{StubWifiDriver, StubZigbeeStack};
    use crate::runtime::{GatewayPorts, GatewayRuntime};
    use crate::service::{NoopReboot, WifiSettings};
    use crate::store::KvStore;
    use serde_json::Value;

    fn app_state() -> AppState {
        let rt = GatewayRuntime::new(GatewayPorts {
            kv: KvStore::in_memory(),
            wifi_driver: StubWifiDriver::new(),
            zigbee_stack: StubZigbeeStack::new(),
            reboot_hook: Arc::new(NoopReboot),
            rcp_tool: None,
            clock: ManualClock::new(1_000),
            wifi_settings: WifiSettings::default(),
        })
        .unwrap();
        AppState {
            usecases: rt.usecases.clone(),
            ws: rt.ws.clone(),
            error_ring: rt.error_ring.clone(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_wraps_payload_in_ok_envelope() {
        let state = app_state();
        let response = get_status(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["data"]["pan_id"], 0x1A2B);
        assert_eq!(body["data"]["zigbee"]["channel"], 15);
        assert!(body["data"]["devices"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_control_body_maps_to_400_and_error_ring() {
        let state = app_state();
        let response = post_control(
            State(state.clone()),
            Bytes::from_static(br#"{"addr":0,"ep":1,"cmd":1}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["code"], "invalid_argument");

        let ring = state.error_ring.snapshot();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring[0].source, "api");
    }

    #[tokio::test]
    async fn job_roundtrip_through_handlers() {
        let state = app_state();
        let response = post_jobs(
            State(state.clone()),
            Bytes::from_static(br#"{"type":"lqi_refresh"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let job_id = body["data"]["job_id"].as_u64().unwrap();
        assert_eq!(body["data"]["state"], "queued");

        let response = get_job(State(state.clone()), Path(job_id.to_string())).await;
        let body = body_json(response).await;
        assert_eq!(body["data"]["job_id"].as_u64().unwrap(), job_id);

        let response = get_job(State(state.clone()), Path("0".to_string())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = get_job(State(state), Path("999".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_job_type_is_rejected() {
        let state = app_state();
        let response = post_jobs(
            State(state),
            Bytes::from_static(br#"{"type":"defrag"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn static_assets_are_served() {
        let response = get_index().await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = get_style().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
