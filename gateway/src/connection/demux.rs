//! 入站响应解复用器
//!
//! 把一个连接上零散到达的响应记录（响应头、内容块、最后一块）分类为
//! 完整图片、multipart 数据块或文本回复。这里不涉及任何网络运行时，
//! 可以直接用构造好的记录驱动测试。

use bytes::{Bytes, BytesMut};
use common::GatewayError;
use reqwest::header::{HeaderMap, HeaderName, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use tracing::{debug, warn};

/// 未声明 Content-Length 时图片缓冲区的大小
pub const FALLBACK_IMAGE_CAPACITY: usize = 768_000;

/// 图片字节数超过预期长度时的协议异常，多出的部分会被截断
fn length_anomaly(expected: usize, received: usize) -> Option<GatewayError> {
    (received > expected).then(|| {
        GatewayError::ProtocolAnomaly(format!(
            "received {} image bytes, expected at most {}, truncating",
            received, expected
        ))
    })
}

/// 响应头中解复用关心的部分
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<usize>,
    pub keep_alive: bool,
    pub chunked: bool,
    pub www_authenticate: Option<String>,
}

impl ResponseHead {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_content_length(mut self, length: usize) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }

    pub fn with_chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    /// 从HTTP响应头构造，头名称大小写不敏感
    pub fn from_headers(status: u16, headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Self {
            status,
            content_type: text(CONTENT_TYPE),
            content_length: text(CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()),
            keep_alive: text(CONNECTION)
                .map(|v| v.to_ascii_lowercase().contains("keep-alive"))
                .unwrap_or(false),
            chunked: text(TRANSFER_ENCODING)
                .map(|v| v.to_ascii_lowercase().contains("chunked"))
                .unwrap_or(false),
            www_authenticate: text(reqwest::header::WWW_AUTHENTICATE),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    fn content_type_lower(&self) -> String {
        self.content_type
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    pub fn is_image(&self) -> bool {
        self.content_type_lower().starts_with("image/jp")
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type_lower().starts_with("multipart")
    }
}

/// 一个连接上到达的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Head(ResponseHead),
    Content(Bytes),
    /// 最后一块内容
    Last(Bytes),
    /// 不携带内容的记录（例如连接空闲、流结束）
    Other,
}

/// 解复用结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxEvent {
    /// 401 响应，原样交给认证重试
    Unauthorized(ResponseHead),
    ImageComplete(Bytes),
    MultipartChunk(Bytes),
    TextReply(String),
    /// 需要关闭连接
    Close,
}

#[derive(Debug)]
enum Mode {
    AwaitingHead,
    Unauthorized,
    Image {
        buffer: BytesMut,
        expected: usize,
        declared: bool,
    },
    /// 图片已完成，丢弃同一条消息的剩余字节
    Drained,
    Multipart,
    Text(BytesMut),
}

/// 单个连接的解复用状态
#[derive(Debug)]
pub struct Demuxer {
    mode: Mode,
    keep_alive: bool,
    chunked: bool,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer {
    pub fn new() -> Self {
        Self {
            mode: Mode::AwaitingHead,
            keep_alive: false,
            chunked: false,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.mode, Mode::Multipart)
    }

    /// 输入一条记录，返回分类出的事件
    pub fn feed(&mut self, record: Record) -> Vec<DemuxEvent> {
        match record {
            Record::Head(head) => self.on_head(head),
            Record::Content(bytes) => self.on_content(bytes, false),
            Record::Last(bytes) => self.on_content(bytes, true),
            Record::Other => self.on_other(),
        }
    }

    fn on_head(&mut self, head: ResponseHead) -> Vec<DemuxEvent> {
        if head.is_unauthorized() {
            self.mode = Mode::Unauthorized;
            return vec![DemuxEvent::Unauthorized(head)];
        }

        self.keep_alive = head.keep_alive;
        self.chunked = head.chunked;

        self.mode = if head.is_image() {
            let (expected, declared) = match head.content_length {
                Some(length) => (length, true),
                None => (FALLBACK_IMAGE_CAPACITY, false),
            };
            Mode::Image {
                buffer: BytesMut::with_capacity(expected),
                expected,
                declared,
            }
        } else if head.is_multipart() {
            Mode::Multipart
        } else {
            Mode::Text(BytesMut::new())
        };

        Vec::new()
    }

    fn on_content(&mut self, bytes: Bytes, last: bool) -> Vec<DemuxEvent> {
        let mut events = Vec::new();

        match &mut self.mode {
            Mode::AwaitingHead | Mode::Unauthorized | Mode::Drained => {}
            Mode::Multipart => {
                if !bytes.is_empty() {
                    events.push(DemuxEvent::MultipartChunk(bytes));
                }
            }
            Mode::Image {
                buffer,
                expected,
                declared,
            } => {
                let room = *expected - buffer.len();
                let anomaly = length_anomaly(*expected, buffer.len() + bytes.len());
                buffer.extend_from_slice(&bytes[..bytes.len().min(room)]);

                let overflow = anomaly.is_some();
                if let Some(anomaly) = anomaly {
                    warn!("⚠️ {}", anomaly);
                }

                let complete = (*declared && buffer.len() == *expected) || last || overflow;
                if complete {
                    let image = std::mem::take(buffer).freeze();
                    events.push(DemuxEvent::ImageComplete(image));
                    if overflow || !self.keep_alive {
                        events.push(DemuxEvent::Close);
                    }
                    self.mode = if last { Mode::AwaitingHead } else { Mode::Drained };
                }
            }
            Mode::Text(buffer) => {
                buffer.extend_from_slice(&bytes);
                if last || self.chunked {
                    if !buffer.is_empty() {
                        let text = String::from_utf8_lossy(&buffer[..]).into_owned();
                        buffer.clear();
                        events.push(DemuxEvent::TextReply(text));
                    }
                    if last && !self.keep_alive {
                        events.push(DemuxEvent::Close);
                    }
                }
            }
        }

        if last && matches!(self.mode, Mode::Drained | Mode::Unauthorized) {
            self.mode = Mode::AwaitingHead;
        }

        events
    }

    fn on_other(&mut self) -> Vec<DemuxEvent> {
        if let Mode::Text(buffer) = &mut self.mode {
            if !buffer.is_empty() {
                debug!("Flushing {} pending reply bytes", buffer.len());
                let text = String::from_utf8_lossy(&buffer[..]).into_owned();
                buffer.clear();
                return vec![DemuxEvent::TextReply(text)];
            }
        }
        Vec::new()
    }
}
