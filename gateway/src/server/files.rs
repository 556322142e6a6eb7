//! 输出目录中的文件（播放列表、分片、GIF、MP4），支持 HTTP Range

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// 只接受输出目录下的单层文件名
pub fn resolve(folder: &Path, name: &str) -> Option<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Some(folder.join(file)),
        _ => None,
    }
}

/// 解析 Range 头（格式: bytes=start-end）
fn parse_range(range_str: &str, file_size: u64) -> Option<(u64, u64)> {
    let range_part = range_str.strip_prefix("bytes=")?;
    let (start, end) = range_part.split_once('-')?;

    let start = start.parse::<u64>().ok()?;
    let end = if end.is_empty() {
        file_size.checked_sub(1)?
    } else {
        end.parse::<u64>().ok()?
    };

    if start > end || end >= file_size {
        return None;
    }
    Some((start, end))
}

pub fn get_content_type(file_path: &Path) -> &'static str {
    match file_path.extension().and_then(|s| s.to_str()) {
        Some("m3u8") => "application/x-mpegURL",
        Some("ts") => "video/MP2T",
        Some("m4s") => "video/iso.segment",
        Some("mp4") => "video/mp4",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// 返回文件内容，带 Range 时返回 206
pub async fn serve_file(file_path: &Path, headers: &HeaderMap) -> Result<Response, StatusCode> {
    let metadata = tokio::fs::metadata(file_path).await.map_err(|_| {
        tracing::debug!("File not found: {:?}", file_path);
        StatusCode::NOT_FOUND
    })?;
    if !metadata.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }
    let file_size = metadata.len();

    if let Some(range) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_range(value, file_size))
    {
        return serve_range(file_path, range, file_size).await;
    }
    serve_full_file(file_path, file_size).await
}

/// 返回部分内容（206 Partial Content）
async fn serve_range(file_path: &Path, range: (u64, u64), file_size: u64) -> Result<Response, StatusCode> {
    let (start, end) = range;
    let content_length = end - start + 1;

    let mut file = File::open(file_path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let body = Body::from_stream(ReaderStream::new(file.take(content_length)));

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, get_content_type(file_path))
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, file_size))
        .header(header::ACCEPT_RANGES, "bytes")
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn serve_full_file(file_path: &Path, file_size: u64) -> Result<Response, StatusCode> {
    let file = File::open(file_path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, get_content_type(file_path))
        .header(header::CONTENT_LENGTH, file_size)
        .header(header::ACCEPT_RANGES, "bytes");
    // 播放列表每个分片周期都会变化
    if get_content_type(file_path) == "application/x-mpegURL" {
        builder = builder.header(header::CACHE_CONTROL, "no-cache");
    }
    builder.body(body).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
