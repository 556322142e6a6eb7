use bytes::{BufMut, Bytes, BytesMut};

/// 本地MJPEG流使用的固定分隔符
pub const BOUNDARY: &str = "thisMjpegStream";

/// multipart 响应的 Content-Type
pub fn stream_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// 把一帧JPEG封装为一个 multipart part：分隔符、part头、数据、尾部换行
pub fn frame_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\ncontent-type: image/jpeg\r\ncontent-length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// 粗略判断数据是否为JPEG（SOI标记）
pub fn looks_like_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}
