//! 本地流服务器和网关状态API

pub mod api;
pub mod camera;
pub mod files;
pub mod group;

use axum::{http::StatusCode, Router};
use common::{GatewayError, Result};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 本地流服务器监听所有网卡，ffmpeg 通过回环地址回传画面
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// 网关错误对应的HTTP状态码
pub fn status_code(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::CameraNotFound(_) | GatewayError::GroupNotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        GatewayError::Communication(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 正在运行的本地服务器
pub struct ServerHandle {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// 绑定端口并在后台运行；端口被占用或无效属于配置错误
    ///
    /// `cancel` 同时交给路由中的长连接流，停止服务器时它们一起结束。
    pub async fn bind(
        host: &str,
        port: u16,
        app: Router,
        cancel: CancellationToken,
        name: &str,
    ) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|e| {
                GatewayError::Configuration(format!(
                    "{} server cannot bind {}:{}: {}, try another server_port",
                    name, host, port, e
                ))
            })?;
        let addr = listener.local_addr()?;
        let shutdown = cancel.clone();
        let server_name = name.to_string();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("{} server error: {}", server_name, e);
            }
        });

        info!("✓ {} server listening on {}", name, addr);
        Ok(Self { addr, cancel, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// 停止接受新连接，正在推送的流随之结束
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn test_all_interfaces_reachable_on_loopback() {
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let server = ServerHandle::bind(ALL_INTERFACES, 0, app, CancellationToken::new(), "Test")
            .await
            .unwrap();
        assert!(server.addr().ip().is_unspecified());

        let url = format!("http://127.0.0.1:{}/health", server.port());
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "ok");
        server.stop();
    }

    #[tokio::test]
    async fn test_port_in_use_is_configuration_error() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let result =
            ServerHandle::bind(ALL_INTERFACES, port, Router::new(), CancellationToken::new(), "Test")
                .await;
        assert!(result.err().unwrap().is_configuration());
    }
}
