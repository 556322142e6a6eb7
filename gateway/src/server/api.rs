//! 网关状态与控制API

use super::status_code;
use crate::camera::{CameraManager, CameraSession, RecordingHistory};
use crate::group::GroupAggregator;
use crate::onvif::PtzRequest;
use crate::status::{ChannelStateStore, StatusRecord};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{CameraBrand, CameraStatus, ChannelValue, GatewayError, StreamFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            status: "error".to_string(),
            data: None,
            error: Some(message),
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn fail(error: GatewayError) -> ApiError {
    (
        status_code(&error),
        Json(ApiResponse::<()>::error(error.to_string())),
    )
}

pub fn create_router(manager: CameraManager) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 摄像头
        .route("/api/v1/cameras", get(list_cameras))
        .route("/api/v1/cameras/:camera_id", get(camera_detail))
        .route("/api/v1/cameras/:camera_id/snapshot", get(camera_snapshot))
        .route("/api/v1/cameras/:camera_id/restart", post(restart_camera))
        .route("/api/v1/cameras/:camera_id/hls", post(camera_hls))
        .route("/api/v1/cameras/:camera_id/record", post(record))
        .route(
            "/api/v1/cameras/:camera_id/history/:format",
            axum::routing::delete(clear_history),
        )
        .route("/api/v1/cameras/:camera_id/ptz", post(ptz))
        .route("/api/v1/cameras/:camera_id/thresholds", post(thresholds))
        .route("/api/v1/cameras/:camera_id/external-motion", post(external_motion))
        .route("/api/v1/cameras/:camera_id/poll-image", post(poll_image))
        // 分组
        .route("/api/v1/groups", get(list_groups))
        .route("/api/v1/groups/:group_id", get(group_detail))
        .route("/api/v1/groups/:group_id/hls", post(group_hls))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}

/// 健康检查
async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

#[derive(Serialize)]
struct CameraSummary {
    id: String,
    name: String,
    brand: CameraBrand,
    status: CameraStatus,
    server_port: Option<u16>,
    running: Vec<StreamFormat>,
    motion_detected: bool,
    /// 图片通道单独通过 snapshot 接口获取
    channels: BTreeMap<String, ChannelValue>,
}

impl CameraSummary {
    fn from_session(session: &CameraSession, store: &ChannelStateStore) -> Self {
        let config = session.config();
        let mut channels = store.channels(session.id());
        channels.retain(|_, value| !matches!(value, ChannelValue::Image(_)));
        Self {
            id: session.id().to_string(),
            name: config.display_name().to_string(),
            brand: config.brand,
            status: session.status(),
            server_port: session.server_port(),
            running: session.transcoders().running_formats(),
            motion_detected: session.is_motion_detected(),
            channels,
        }
    }
}

#[derive(Serialize)]
struct CameraDetail {
    #[serde(flatten)]
    summary: CameraSummary,
    last_status: Option<StatusRecord>,
    history: RecordingHistory,
}

/// 获取摄像头列表
async fn list_cameras(State(manager): State<CameraManager>) -> Json<ApiResponse<Vec<CameraSummary>>> {
    let cameras = manager
        .cameras()
        .iter()
        .map(|session| CameraSummary::from_session(session, manager.store()))
        .collect();
    Json(ApiResponse::success(cameras))
}

/// 获取摄像头详情
async fn camera_detail(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
) -> ApiResult<CameraDetail> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    Ok(Json(ApiResponse::success(CameraDetail {
        summary: CameraSummary::from_session(&session, manager.store()),
        last_status: manager.store().status(&camera_id),
        history: session.recording_history(),
    })))
}

async fn camera_snapshot(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
) -> Result<Response, ApiError> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    let jpeg = session.current_snapshot().ok_or_else(|| {
        fail(GatewayError::Communication(format!(
            "camera {} has no snapshot yet",
            camera_id
        )))
    })?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

async fn restart_camera(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
) -> ApiResult<String> {
    info!("Restart requested for camera {}", camera_id);
    manager.restart_camera(&camera_id).await.map_err(fail)?;
    Ok(Json(ApiResponse::success("restarted".to_string())))
}

#[derive(Deserialize)]
struct ToggleRequest {
    on: bool,
}

async fn camera_hls(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<bool> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    session.set_hls(request.on);
    Ok(Json(ApiResponse::success(request.on)))
}

#[derive(Deserialize)]
struct RecordRequest {
    format: StreamFormat,
    name: String,
    secs: u32,
}

/// 录制 MP4 或生成 GIF
async fn record(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
    Json(request): Json<RecordRequest>,
) -> ApiResult<RecordingHistory> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    match request.format {
        StreamFormat::Record => session.record_mp4(&request.name, request.secs),
        StreamFormat::Gif => session.record_gif(&request.name, request.secs),
        other => Err(GatewayError::InvalidParameter(format!(
            "{} cannot be recorded",
            other
        ))),
    }
    .map_err(fail)?;
    Ok(Json(ApiResponse::success(session.recording_history())))
}

async fn clear_history(
    Path((camera_id, format)): Path<(String, StreamFormat)>,
    State(manager): State<CameraManager>,
) -> ApiResult<RecordingHistory> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    session.clear_history(format).map_err(fail)?;
    Ok(Json(ApiResponse::success(session.recording_history())))
}

async fn ptz(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
    Json(request): Json<PtzRequest>,
) -> ApiResult<PtzRequest> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    session.ptz(request).await.map_err(fail)?;
    Ok(Json(ApiResponse::success(request)))
}

/// ffmpeg 移动/声音报警阈值，0 表示关闭
#[derive(Deserialize)]
struct ThresholdRequest {
    motion: Option<u32>,
    audio: Option<u32>,
}

async fn thresholds(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
    Json(request): Json<ThresholdRequest>,
) -> ApiResult<String> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    if let Some(motion) = request.motion {
        session.set_ffmpeg_motion(motion).map_err(fail)?;
    }
    if let Some(audio) = request.audio {
        session.set_ffmpeg_audio(audio).map_err(fail)?;
    }
    Ok(Json(ApiResponse::success("updated".to_string())))
}

async fn external_motion(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<bool> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    session.external_motion(request.on);
    Ok(Json(ApiResponse::success(request.on)))
}

async fn poll_image(
    Path(camera_id): Path<String>,
    State(manager): State<CameraManager>,
) -> ApiResult<String> {
    let session = manager.camera(&camera_id).map_err(fail)?;
    session.poll_image();
    Ok(Json(ApiResponse::success("requested".to_string())))
}

#[derive(Serialize)]
struct GroupSummary {
    id: String,
    name: String,
    members: Vec<String>,
    online_members: Vec<String>,
    current_member: Option<String>,
    hls_on: bool,
    media_sequence: u64,
    discontinuity_sequence: u64,
    server_port: Option<u16>,
}

impl GroupSummary {
    fn from_group(group: &GroupAggregator) -> Self {
        let config = group.config();
        Self {
            id: group.id().to_string(),
            name: config.name.clone(),
            members: config.members.clone(),
            online_members: group.member_ids(),
            current_member: group.current_member(),
            hls_on: group.is_hls_on(),
            media_sequence: group.media_sequence(),
            discontinuity_sequence: group.discontinuity_sequence(),
            server_port: group.server_port(),
        }
    }
}

async fn list_groups(State(manager): State<CameraManager>) -> Json<ApiResponse<Vec<GroupSummary>>> {
    let groups = manager.groups().iter().map(GroupSummary::from_group).collect();
    Json(ApiResponse::success(groups))
}

async fn group_detail(
    Path(group_id): Path<String>,
    State(manager): State<CameraManager>,
) -> ApiResult<GroupSummary> {
    let group = manager.group(&group_id).map_err(fail)?;
    Ok(Json(ApiResponse::success(GroupSummary::from_group(&group))))
}

async fn group_hls(
    Path(group_id): Path<String>,
    State(manager): State<CameraManager>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<bool> {
    let group = manager.group(&group_id).map_err(fail)?;
    group.set_hls(request.on);
    Ok(Json(ApiResponse::success(request.on)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::session::tests::fast_timings;
    use crate::camera::SessionDeps;
    use crate::config::{CameraConfig, GroupConfig};
    use crate::group::OnlineRegistry;
    use crate::onvif::DisabledOnvif;
    use crate::status::ChannelStateStore;
    use crate::transcoder::fake::FakeFactory;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn manager() -> (CameraManager, Arc<FakeFactory>) {
        let online = OnlineRegistry::new();
        let store = ChannelStateStore::new();
        let manager = CameraManager::new(online.clone(), store.clone());
        let factory = Arc::new(FakeFactory::default());
        let deps = SessionDeps {
            transcoders: factory.clone(),
            onvif: Arc::new(DisabledOnvif),
            status: Arc::new(store),
            online,
            bind_host: "127.0.0.1".into(),
            timings: fast_timings(),
        };
        let dir = std::env::temp_dir().join("ipcam-gateway-api-test");
        let config = CameraConfig {
            id: "front".into(),
            name: "Front door".into(),
            ip: "127.0.0.1".into(),
            ffmpeg_input: "rtsp://127.0.0.1:554/live".into(),
            ffmpeg_output: dir,
            ..Default::default()
        };
        manager.add_camera(config, deps).unwrap();
        let group = GroupConfig {
            id: "yard".into(),
            members: vec!["front".into()],
            ..Default::default()
        };
        manager.add_group(group, "127.0.0.1").unwrap();
        (manager, factory)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_detail() {
        let (manager, _) = manager();
        let app = create_router(manager);

        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/cameras").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"][0]["id"], "front");
        assert_eq!(json["data"][0]["name"], "Front door");
        assert_eq!(json["data"][0]["status"], "OFFLINE");

        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/cameras/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");

        let response = app
            .oneshot(Request::get("/api/v1/groups/yard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["data"]["members"][0], "front");
        assert_eq!(json["data"]["hls_on"], false);
    }

    #[tokio::test]
    async fn test_record_validates_request() {
        let (manager, factory) = manager();
        let app = create_router(manager);

        let request = |body: &str| {
            Request::post("/api/v1/cameras/front/record")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(request(r#"{"format":"hls","name":"x","secs":5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(r#"{"format":"record","name":"../x","secs":5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(request(r#"{"format":"gif","name":"clip","secs":0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(factory.started(StreamFormat::Record), 0);
        assert_eq!(factory.started(StreamFormat::Gif), 0);
    }

    #[tokio::test]
    async fn test_external_motion_sets_channel() {
        let (manager, _) = manager();
        let store = manager.store().clone();
        let app = create_router(manager);
        let response = app
            .oneshot(
                Request::post("/api/v1/cameras/front/external-motion")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"on":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            store.channel("front", common::channels::EXTERNAL_MOTION),
            Some(ChannelValue::OnOff(true))
        );
    }

    #[tokio::test]
    async fn test_ptz_without_onvif_is_rejected() {
        let (manager, _) = manager();
        let app = create_router(manager);
        let response = app
            .oneshot(
                Request::post("/api/v1/cameras/front/ptz")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"type":"stop"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
