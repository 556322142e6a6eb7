use async_trait::async_trait;
use common::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// 云台控制请求
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PtzRequest {
    /// 水平移动，取值 -1.0..=1.0
    Pan { speed: f32 },
    Tilt { speed: f32 },
    Zoom { speed: f32 },
    Stop,
    GotoPreset { preset: u32 },
}

/// ONVIF 连接（发现、事件订阅、云台协商的内部细节不在网关内实现）
#[async_trait]
pub trait OnvifConnection: Send + Sync {
    async fn connect(&self, events_enabled: bool) -> Result<()>;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn supports_ptz(&self) -> bool;
    async fn send_ptz_request(&self, request: PtzRequest) -> Result<()>;
}

/// 未配置 ONVIF 时使用的空实现
#[derive(Debug, Default)]
pub struct DisabledOnvif;

#[async_trait]
impl OnvifConnection for DisabledOnvif {
    async fn connect(&self, _events_enabled: bool) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn supports_ptz(&self) -> bool {
        false
    }

    async fn send_ptz_request(&self, _request: PtzRequest) -> Result<()> {
        Err(GatewayError::InvalidParameter(
            "camera has no ONVIF connection".into(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_onvif_rejects_ptz() {
        let onvif = DisabledOnvif;
        onvif.connect(true).await.unwrap();
        assert!(!onvif.is_connected());
        assert!(!onvif.supports_ptz());
        assert!(onvif.send_ptz_request(PtzRequest::Stop).await.is_err());
    }

    #[test]
    fn test_ptz_request_json() {
        let request: PtzRequest = serde_json::from_str(r#"{"type":"goto_preset","preset":3}"#).unwrap();
        assert_eq!(request, PtzRequest::GotoPreset { preset: 3 });
    }
}
