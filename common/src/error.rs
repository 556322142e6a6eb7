use thiserror::Error;

/// 网关错误类型
///
/// 配置类错误永远不会自动重试，通信类错误会在摄像头曾经在线时触发重连。
#[derive(Error, Debug)]
pub enum GatewayError {
    // ========== 配置错误 ==========
    /// URL格式错误、缺少凭据、端口无效等
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== 通信错误 ==========
    /// 超时、连接被拒绝、响应格式错误
    #[error("Communication error: {0}")]
    Communication(String),

    /// 实际收到的字节数与声明的长度不符
    #[error("Protocol anomaly: {0}")]
    ProtocolAnomaly(String),

    /// 同一摄像头打开的连接过多
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    // ========== 其他错误 ==========
    #[error("Transcoder error: {0}")]
    Transcoder(String),

    #[error("Camera not found: {0}")]
    CameraNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GatewayError {
    /// 是否属于可重试的通信类错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Communication(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, GatewayError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
