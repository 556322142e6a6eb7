//! 模拟摄像头画面和事件文本

use bytes::{BufMut, Bytes, BytesMut};

/// 生成一帧带编号的最小 JPEG（SOI、COM 段、EOI）
///
/// 网关只按字节转发画面，不解码图像内容。
pub fn jpeg_frame(index: u64) -> Bytes {
    let comment = format!("camera-simulator frame {}", index);
    let mut frame = BytesMut::with_capacity(comment.len() + 8);
    frame.put_slice(&[0xFF, 0xD8]);
    frame.put_slice(&[0xFF, 0xFE]);
    frame.put_u16(comment.len() as u16 + 2);
    frame.put_slice(comment.as_bytes());
    frame.put_slice(&[0xFF, 0xD9]);
    frame.freeze()
}

/// 事件流使用的分隔符，和常见摄像头固件一致
pub const EVENT_BOUNDARY: &str = "myboundary";

/// 一条 `Code=VideoMotion;action=Start;index=0` 事件，封装为 multipart part
pub fn event_part(code: &str, start: bool) -> Bytes {
    let body = format!(
        "Code={};action={};index=0\r\n",
        code,
        if start { "Start" } else { "Stop" }
    );
    Bytes::from(format!(
        "--{}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        EVENT_BOUNDARY,
        body.len(),
        body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mjpeg::looks_like_jpeg;

    #[test]
    fn test_jpeg_frame_markers() {
        let frame = jpeg_frame(7);
        assert!(looks_like_jpeg(&frame));
        assert!(frame.ends_with(&[0xFF, 0xD9]));
        let len = u16::from_be_bytes([frame[4], frame[5]]) as usize;
        assert_eq!(len, frame.len() - 6);
    }

    #[test]
    fn test_event_part() {
        let part = event_part("VideoMotion", true);
        let text = std::str::from_utf8(&part).unwrap();
        assert!(text.starts_with("--myboundary\r\n"));
        assert!(text.ends_with("Code=VideoMotion;action=Start;index=0\r\n"));
        assert!(text.contains("Content-Length: 39\r\n"));
    }
}
