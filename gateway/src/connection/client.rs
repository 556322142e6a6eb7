use super::auth::AuthState;
use super::demux::{DemuxEvent, Demuxer, Record, ResponseHead};
use super::registry::{ConnectionHandle, ConnectionRegistry};
use bytes::Bytes;
use common::auth::masked_uri;
use common::{GatewayError, Result};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// 出站连接超时
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(4500);
/// 非保持路径上连续无数据多久后关闭连接
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(18);

/// 解复用事件的接收方（摄像头会话）
pub trait ResponseSink: Send + Sync + 'static {
    fn on_head(&self, path: &str, head: &ResponseHead);
    fn on_image(&self, path: &str, jpeg: Bytes);
    fn on_multipart(&self, path: &str, chunk: Bytes);
    fn on_text(&self, path: &str, reply: String);
    fn on_failure(&self, path: &str, error: GatewayError);
}

/// 单个摄像头的出站HTTP客户端，所有请求复用同一个连接工厂
#[derive(Clone)]
pub struct CameraClient {
    http: reqwest::Client,
    host: String,
    port: u16,
    auth: Arc<Mutex<AuthState>>,
    registry: ConnectionRegistry,
    keep_open: Option<String>,
    idle_timeout: Duration,
}

impl CameraClient {
    pub fn new(
        host: &str,
        port: u16,
        auth: Arc<Mutex<AuthState>>,
        registry: ConnectionRegistry,
        keep_open: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            host: host.to_string(),
            port,
            auth,
            registry,
            keep_open,
            idle_timeout: IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// 路径可以是 `/path?query` 或带端口的 `:8080/path?query`
    pub fn request_url(&self, path: &str) -> String {
        if path.starts_with(':') {
            format!("http://{}{}", self.host, path)
        } else {
            format!("http://{}:{}{}", self.host, self.port, path)
        }
    }

    /// Digest 计算使用的 uri，去掉端口前缀
    pub fn request_uri(path: &str) -> &str {
        if path.starts_with(':') {
            path.find('/').map(|i| &path[i..]).unwrap_or("/")
        } else {
            path
        }
    }

    pub fn send_get(&self, path: &str, sink: Arc<dyn ResponseSink>) -> ConnectionHandle {
        self.send(Method::GET, path, None, sink)
    }

    /// 先登记连接再发送，响应在后台任务中读取
    pub fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        sink: Arc<dyn ResponseSink>,
    ) -> ConnectionHandle {
        let handle = self.registry.record(path);
        let client = self.clone();
        let path = path.to_string();
        let task_handle = handle.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = task_handle.closed() => Ok(()),
                result = client.exchange(&method, &path, body, sink.as_ref()) => result,
            };
            client.registry.finished(&task_handle);
            if let Err(e) = result {
                sink.on_failure(&path, e);
            }
        });

        handle
    }

    async fn exchange(
        &self,
        method: &Method,
        path: &str,
        body: Option<Bytes>,
        sink: &dyn ResponseSink,
    ) -> Result<()> {
        let url = self.request_url(path);
        let uri = Self::request_uri(path);
        let mut resent = false;

        let (response, head) = loop {
            let authorization = self.auth.lock().authorization(method.as_str(), uri);

            let mut request = self.http.request(method.clone(), &url);
            if let Some(authorization) = authorization {
                request = request.header(AUTHORIZATION, authorization);
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            trace!("{} {}", method, masked_uri(&url));
            let response = request.send().await.map_err(classify_error)?;
            let head = ResponseHead::from_headers(response.status().as_u16(), response.headers());

            if !head.is_unauthorized() {
                break (response, head);
            }
            if resent {
                return Err(GatewayError::Communication(format!(
                    "authentication rejected for {}",
                    masked_uri(path)
                )));
            }

            // 根据质询更新认证状态后只重发一次
            self.auth.lock().on_challenge(head.www_authenticate.as_deref())?;
            resent = true;
            debug!("Resending {} with updated authorization", masked_uri(path));
        };

        sink.on_head(path, &head);

        let mut demux = Demuxer::new();
        if self.dispatch(path, demux.feed(Record::Head(head)), sink) {
            return Ok(());
        }

        let keep_open = self.keep_open.as_deref() == Some(path);
        let mut stream = response.bytes_stream();

        loop {
            let next = if keep_open {
                stream.next().await
            } else {
                match tokio::time::timeout(self.idle_timeout, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!("Closing idle connection for {}", masked_uri(path));
                        self.dispatch(path, demux.feed(Record::Other), sink);
                        return Ok(());
                    }
                }
            };

            match next {
                Some(Ok(chunk)) => {
                    if self.dispatch(path, demux.feed(Record::Content(chunk)), sink) {
                        return Ok(());
                    }
                }
                Some(Err(e)) => {
                    return Err(GatewayError::Communication(format!(
                        "reading {} failed: {}",
                        path, e
                    )));
                }
                None => {
                    self.dispatch(path, demux.feed(Record::Last(Bytes::new())), sink);
                    return Ok(());
                }
            }
        }
    }

    /// 分发解复用事件，返回是否需要关闭连接
    fn dispatch(&self, path: &str, events: Vec<DemuxEvent>, sink: &dyn ResponseSink) -> bool {
        let mut close = false;
        for event in events {
            match event {
                DemuxEvent::Unauthorized(_) => {}
                DemuxEvent::ImageComplete(jpeg) => sink.on_image(path, jpeg),
                DemuxEvent::MultipartChunk(chunk) => sink.on_multipart(path, chunk),
                DemuxEvent::TextReply(reply) => {
                    self.registry.store_reply(path, &reply);
                    sink.on_text(path, reply);
                }
                DemuxEvent::Close => close = true,
            }
        }
        close
    }
}

fn classify_error(error: reqwest::Error) -> GatewayError {
    if error.is_builder() {
        GatewayError::Configuration(format!("invalid request: {}", error.without_url()))
    } else {
        GatewayError::Communication(error.without_url().to_string())
    }
}
