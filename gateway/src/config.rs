use anyhow::{Context, Result};
use common::{CameraBrand, GatewayError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 网关配置（TOML）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewaySettings,
    pub cameras: Vec<CameraConfig>,
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// 输出URL中使用的本机地址
    pub host_ip: String,
    pub api_host: String,
    pub api_port: u16,
    pub ffmpeg_location: String,
    /// 每个摄像头的ffmpeg输出目录的根目录
    pub output_root: PathBuf,
    pub log_filter: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host_ip: "127.0.0.1".to_string(),
            api_host: "0.0.0.0".to_string(),
            api_port: 8090,
            ffmpeg_location: "ffmpeg".to_string(),
            output_root: PathBuf::from("./ipcamera"),
            log_filter: None,
        }
    }
}

/// 单个摄像头的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    pub brand: CameraBrand,
    pub ip: String,
    pub port: u16,
    pub onvif_port: u16,
    /// NVR通道号，用于品牌默认URL模板
    pub nvr_channel: u32,
    pub user: String,
    pub password: String,
    pub snapshot_url: String,
    pub mjpeg_url: String,
    pub ffmpeg_input: String,
    pub ffmpeg_input_options: String,
    pub alarm_input_url: String,
    pub hls_out_options: String,
    pub mjpeg_options: String,
    pub snapshot_options: String,
    pub gif_out_options: String,
    pub mp4_out_options: String,
    pub motion_options: String,
    /// 本地流服务器端口，0 表示不启动
    pub server_port: u16,
    pub poll_time_ms: u64,
    /// GIF预录帧数，大于0时维护预录缓冲
    pub gif_preroll: u32,
    /// 何时更新 image 通道：1 一直轮询，2 首次移动，3 首次声音，4 移动期间，5 声音期间
    pub update_image_when: String,
    pub ptz_continuous: bool,
    /// ffmpeg输出目录，留空时为 output_root/id
    pub ffmpeg_output: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            brand: CameraBrand::Generic,
            ip: String::new(),
            port: 80,
            onvif_port: 80,
            nvr_channel: 1,
            user: String::new(),
            password: String::new(),
            snapshot_url: String::new(),
            mjpeg_url: String::new(),
            ffmpeg_input: String::new(),
            ffmpeg_input_options: String::new(),
            alarm_input_url: String::new(),
            hls_out_options: String::new(),
            mjpeg_options: String::new(),
            snapshot_options: String::new(),
            gif_out_options: String::new(),
            mp4_out_options: String::new(),
            motion_options: String::new(),
            server_port: 0,
            poll_time_ms: 1000,
            gif_preroll: 0,
            update_image_when: "0".to_string(),
            ptz_continuous: false,
            ffmpeg_output: PathBuf::new(),
        }
    }
}

impl CameraConfig {
    /// 启动会话前的配置检查，失败即为配置错误，不会重试
    pub fn validate(&self) -> common::Result<()> {
        if self.id.trim().is_empty() {
            return Err(GatewayError::Configuration("camera id is empty".into()));
        }
        if self.ip.trim().is_empty() {
            return Err(GatewayError::Configuration(format!(
                "camera {} has no ip address",
                self.id
            )));
        }
        if !self.user.is_empty() && self.password.is_empty() {
            return Err(GatewayError::Configuration(format!(
                "camera {} has a user but no password",
                self.id
            )));
        }
        Ok(())
    }

    pub fn update_image_when(&self, mode: char) -> bool {
        self.update_image_when.contains(mode)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// 摄像头分组配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub id: String,
    pub name: String,
    /// 成员摄像头ID，顺序即成员编号
    pub members: Vec<String>,
    pub poll_time_ms: u64,
    pub motion_changes_order: bool,
    pub server_port: u16,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            members: Vec::new(),
            poll_time_ms: 10_000,
            motion_changes_order: true,
            server_port: 0,
        }
    }
}

impl Config {
    /// 加载配置文件，文件不存在时使用默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("⚠️ Config file {:?} not found, starting without cameras", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config = Self::parse(&content)?;
        config.resolve();

        info!(
            "Loaded {} cameras and {} groups from {:?}",
            config.cameras.len(),
            config.groups.len(),
            path
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 填充依赖全局设置的摄像头字段
    pub fn resolve(&mut self) {
        for camera in &mut self.cameras {
            if camera.ffmpeg_output.as_os_str().is_empty() {
                camera.ffmpeg_output = self.gateway.output_root.join(&camera.id);
            }
        }
    }
}
