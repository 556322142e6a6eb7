//! 分组的本地服务器：分组播放列表、成员分片和当前快照

use super::files::serve_file;
use crate::group::GroupAggregator;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Clone)]
struct GroupServer {
    group: GroupAggregator,
    // 分组没有长连接流，保留以便和摄像头服务器一致地停止
    _cancel: CancellationToken,
}

pub fn router(group: GroupAggregator, cancel: CancellationToken) -> Router {
    Router::new()
        .route("/ipcamera.m3u8", get(playlist))
        .route("/ipcamera.jpg", get(snapshot))
        .route("/:file", get(segment))
        .with_state(GroupServer {
            group,
            _cancel: cancel,
        })
}

/// 第一次请求时开启所有成员的HLS
async fn playlist(State(server): State<GroupServer>) -> Response {
    if !server.group.is_hls_on() {
        server.group.set_hls(true);
    }
    (
        [
            (header::CONTENT_TYPE, "application/x-mpegURL"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        server.group.playlist(),
    )
        .into_response()
}

async fn snapshot(State(server): State<GroupServer>) -> Result<Response, StatusCode> {
    let jpeg = server
        .group
        .current_snapshot()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

async fn segment(
    State(server): State<GroupServer>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let path = server.group.segment_path(&file).ok_or_else(|| {
        debug!("Group {} has no segment {}", server.group.id(), file);
        StatusCode::NOT_FOUND
    })?;
    serve_file(&path, &headers).await
}
