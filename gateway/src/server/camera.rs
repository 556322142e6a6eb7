//! 单个摄像头的本地流服务器

use super::files::{resolve, serve_file};
use super::status_code;
use crate::camera::{CameraSession, StreamKind, Subscription};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use common::mjpeg::looks_like_jpeg;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Clone)]
struct CameraServer {
    session: CameraSession,
    cancel: CancellationToken,
}

pub fn router(session: CameraSession, cancel: CancellationToken) -> Router {
    Router::new()
        .route("/ipcamera.mjpeg", get(mjpeg_stream))
        .route("/snapshots.mjpeg", get(snapshots_stream))
        .route("/autofps.mjpeg", get(autofps_stream))
        .route("/ipcamera.m3u8", get(hls_playlist))
        .route("/ipcamera.jpg", get(current_snapshot).post(ffmpeg_frame))
        .route("/snapshot.jpg", get(current_snapshot).post(ffmpeg_snapshot))
        .route("/instar", get(instar_alarm))
        .route("/:file", get(output_file))
        .with_state(CameraServer { session, cancel })
}

/// 把订阅转换成 multipart 响应体，客户端断开或服务器停止时结束
fn mjpeg_response(subscription: Subscription, cancel: CancellationToken) -> Response {
    let Subscription {
        content_type,
        initial,
        receiver,
        guard,
    } = subscription;

    let frames = BroadcastStream::new(receiver).filter_map(|frame| async move { frame.ok() });
    let body = futures::stream::iter(initial)
        .chain(frames)
        .map(move |frame| {
            let _consumer = &guard;
            Ok::<_, Infallible>(frame)
        })
        .take_until(async move { cancel.cancelled().await });

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache, private".to_string()),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

async fn open_stream(server: CameraServer, kind: StreamKind) -> Response {
    match server.session.subscribe(kind).await {
        Ok(subscription) => mjpeg_response(subscription, server.cancel.clone()),
        Err(e) => {
            warn!("⚠️ {:?} stream for camera {} failed: {}", kind, server.session.id(), e);
            status_code(&e).into_response()
        }
    }
}

async fn mjpeg_stream(State(server): State<CameraServer>) -> Response {
    open_stream(server, StreamKind::Mjpeg).await
}

async fn snapshots_stream(State(server): State<CameraServer>) -> Response {
    open_stream(server, StreamKind::Snapshots).await
}

async fn autofps_stream(State(server): State<CameraServer>) -> Response {
    open_stream(server, StreamKind::AutoFps).await
}

async fn hls_playlist(State(server): State<CameraServer>, headers: HeaderMap) -> Result<Response, StatusCode> {
    let playlist = server
        .session
        .request_hls()
        .await
        .map_err(|e| status_code(&e))?;
    serve_file(&playlist, &headers).await
}

async fn current_snapshot(State(server): State<CameraServer>) -> Result<Response, StatusCode> {
    let jpeg = server
        .session
        .current_snapshot()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

/// ffmpeg 从 RTSP 生成的 MJPEG 帧
async fn ffmpeg_frame(State(server): State<CameraServer>, body: Bytes) -> StatusCode {
    if !looks_like_jpeg(&body) {
        debug!("Camera {} ignored a non-jpeg frame of {} bytes", server.session.id(), body.len());
        return StatusCode::BAD_REQUEST;
    }
    server.session.process_ffmpeg_frame(body);
    StatusCode::OK
}

/// ffmpeg 生成的快照
async fn ffmpeg_snapshot(State(server): State<CameraServer>, body: Bytes) -> StatusCode {
    if !looks_like_jpeg(&body) {
        return StatusCode::BAD_REQUEST;
    }
    server.session.process_snapshot(body);
    StatusCode::OK
}

#[derive(Deserialize)]
struct InstarQuery {
    active: u32,
}

async fn instar_alarm(State(server): State<CameraServer>, Query(query): Query<InstarQuery>) -> StatusCode {
    server.session.instar_alarm(query.active);
    StatusCode::OK
}

/// ffmpeg 输出目录中的分片、GIF 和 MP4
async fn output_file(
    State(server): State<CameraServer>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let path = resolve(&server.session.config().ffmpeg_output, &file).ok_or(StatusCode::BAD_REQUEST)?;
    serve_file(&path, &headers).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::session::tests::{camera_config, harness, mount_snapshot, wait_until, JPEG};
    use axum::body::to_bytes;
    use axum::http::Request;
    use common::{channels, ChannelValue};
    use tower::ServiceExt;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_ffmpeg_snapshot_post_updates_camera() {
        let server = MockServer::start().await;
        let h = harness(camera_config(&server));
        let app = router(h.session.clone(), CancellationToken::new());

        let response = app
            .clone()
            .oneshot(
                Request::post("/snapshot.jpg")
                    .body(Body::from(JPEG.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.session.current_snapshot().unwrap(), Bytes::from_static(&JPEG));

        let response = app
            .clone()
            .oneshot(Request::get("/ipcamera.jpg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &JPEG[..]);

        let rejected = app
            .oneshot(Request::post("/ipcamera.jpg").body(Body::from("nope")).unwrap())
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_instar_push_and_file_traversal() {
        let server = MockServer::start().await;
        let h = harness(camera_config(&server));
        let app = router(h.session.clone(), CancellationToken::new());

        let response = app
            .clone()
            .oneshot(Request::get("/instar?active=3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.store.channel("front", channels::MOTION_ALARM), Some(ChannelValue::OnOff(true)));

        let response = app
            .oneshot(Request::get("/..%2Fsecret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_snapshot_stream_over_http() {
        let server = MockServer::start().await;
        mount_snapshot(&server).await;
        let mut config = camera_config(&server);
        config.server_port = 0;
        let h = harness(config);
        h.session.initialize().await.unwrap();
        wait_until(|| h.session.current_snapshot().is_some()).await;

        let cancel = CancellationToken::new();
        let app = router(h.session.clone(), cancel.clone());
        let response = app
            .oneshot(Request::get("/snapshots.mjpeg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("multipart/x-mixed-replace"));

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"--thisMjpegStream"));

        // 服务器停止时流结束
        cancel.cancel();
        while body.next().await.is_some() {}
        drop(body);
        wait_until(|| !h.session.tasks().is_scheduled("snapshot")).await;
        h.session.dispose();
    }
}
