//! 摄像头会话控制器
//!
//! 会话负责一个摄像头的完整生命周期：初始化、连接检测、上线后的周期轮询、
//! 通信失败后的重连和释放。所有后台任务都登记在会话的 `TaskSet` 中，
//! 释放时统一取消；连接回调通过代数（generation）丢弃旧会话的迟到事件。

use super::brand::{correct_url_format, profile_for, BrandEvent, BrandProfile, PollAction, UrlContext};
use super::snapshot::SnapshotStore;
use super::streams::StreamHub;
use crate::config::CameraConfig;
use crate::connection::{AuthState, CameraClient, ConnectionRegistry, ResponseHead, ResponseSink};
use crate::group::{GroupMember, OnlineRegistry};
use crate::onvif::OnvifConnection;
use crate::scheduler::TaskSet;
use crate::server::{self, ServerHandle};
use crate::status::StatusSink;
use crate::transcoder::{AlarmSignal, TranscoderFactory, TranscoderManager};
use bytes::Bytes;
use common::auth::masked_uri;
use common::{CameraBrand, CameraStatus, ChannelValue, GatewayError, Result, StreamFormat};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 同时打开的连接超过这个数量时清理已结束的连接
pub const MAX_OPEN_CONNECTIONS: usize = 18;
/// 快照轮询的最小间隔
pub const MIN_POLL_TIME: Duration = Duration::from_millis(250);
/// GIF/MP4 历史记录的最大条数
pub const HISTORY_LIMIT: usize = 50;

/// 会话的各种定时参数
#[derive(Debug, Clone)]
pub struct SessionTimings {
    /// 上线后的周期轮询
    pub poll_period: Duration,
    /// 离线时的连接检测周期
    pub connect_period: Duration,
    /// 上线到第一次轮询之间的延迟
    pub online_delay: Duration,
    /// 首次请求 m3u8 时等待 ffmpeg 生成播放列表的时间
    pub hls_startup: Duration,
    /// 原生 MJPEG 流开始前的延迟，部分摄像头在快照请求后立即打开流会重启
    pub mjpeg_delay: Duration,
    /// 等待摄像头 MJPEG 响应头的时间
    pub mjpeg_head_timeout: Duration,
    /// 非保持连接的空闲超时
    pub idle_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(8),
            connect_period: Duration::from_secs(30),
            online_delay: Duration::from_secs(1),
            hls_startup: Duration::from_millis(4500),
            mjpeg_delay: Duration::from_millis(500),
            mjpeg_head_timeout: Duration::from_secs(5),
            idle_timeout: crate::connection::client::IDLE_TIMEOUT,
        }
    }
}

/// 会话依赖的外部组件
#[derive(Clone)]
pub struct SessionDeps {
    pub transcoders: Arc<dyn TranscoderFactory>,
    pub onvif: Arc<dyn OnvifConnection>,
    pub status: Arc<dyn StatusSink>,
    pub online: OnlineRegistry,
    /// 本地流服务器绑定的地址
    pub bind_host: String,
    pub timings: SessionTimings,
}

/// 会话的可变状态，统一由一把锁保护
#[derive(Debug, Default)]
pub(super) struct SessionState {
    pub status: CameraStatus,
    pub online: bool,
    /// initialize 之后、dispose 之前为 true
    pub live: bool,
    pub generation: u64,

    pub snapshot_uri: String,
    pub mjpeg_uri: String,
    pub rtsp_uri: String,

    pub motion_detected: bool,
    pub first_motion_alarm: bool,
    pub motion_alarm_update_snapshot: bool,
    pub first_audio_alarm: bool,
    pub audio_alarm_update_snapshot: bool,
    pub update_image_channel: bool,

    pub snapshot_polling: bool,
    pub ffmpeg_snapshot_generation: bool,
    pub streaming_snapshot_mjpeg: bool,
    pub streaming_auto_fps: bool,
    pub update_auto_fps: bool,

    pub low_priority_index: usize,
    /// 用户或分组请求的HLS，重连后恢复
    pub hls_requested: bool,
    pub ffmpeg_motion_threshold: Option<f64>,
    pub ffmpeg_audio_threshold: Option<u32>,

    /// 预录GIF剩余的快照数，到0时开始生成
    pub snap_count: u32,
    pub pending_gif: Option<(String, u32)>,
    pub gif_history: VecDeque<String>,
    pub mp4_history: VecDeque<String>,
}

impl SessionState {
    /// 重新初始化时清除的运行期标志，用户请求（HLS、报警阈值、历史）保留
    fn reset_runtime(&mut self) {
        self.online = false;
        self.motion_detected = false;
        self.first_motion_alarm = false;
        self.motion_alarm_update_snapshot = false;
        self.first_audio_alarm = false;
        self.audio_alarm_update_snapshot = false;
        self.update_image_channel = false;
        self.snapshot_polling = false;
        self.ffmpeg_snapshot_generation = false;
        self.streaming_snapshot_mjpeg = false;
        self.streaming_auto_fps = false;
        self.update_auto_fps = false;
        self.low_priority_index = 0;
        self.snap_count = 0;
        self.pending_gif = None;
    }
}

pub(super) struct SessionInner {
    pub config: CameraConfig,
    pub profile: &'static dyn BrandProfile,
    pub timings: SessionTimings,
    pub bind_host: String,
    pub state: RwLock<SessionState>,
    pub snapshots: Mutex<SnapshotStore>,
    pub registry: ConnectionRegistry,
    pub tasks: TaskSet,
    pub transcoders: TranscoderManager,
    pub onvif: Arc<dyn OnvifConnection>,
    pub status: Arc<dyn StatusSink>,
    pub online: OnlineRegistry,
    pub auth: Arc<Mutex<AuthState>>,
    pub client: CameraClient,
    pub keep_open: Option<String>,
    pub low_priority: Vec<String>,
    pub hub: StreamHub,
    pub server: Mutex<Option<ServerHandle>>,
    pub alarm_tx: Mutex<Option<mpsc::UnboundedSender<AlarmSignal>>>,
    /// 摄像头原生 MJPEG 流的 Content-Type，收到响应头后才知道
    pub mjpeg_content_type: watch::Sender<Option<String>>,
}

/// 一个摄像头的会话
#[derive(Clone)]
pub struct CameraSession {
    pub(super) inner: Arc<SessionInner>,
}

impl CameraSession {
    pub fn new(config: CameraConfig, deps: SessionDeps) -> Result<Self> {
        let profile = profile_for(config.brand);
        let ctx = url_context(&config);
        let keep_open = profile.keep_open_path(&ctx);
        let low_priority = profile.low_priority_requests(&ctx);

        let auth = Arc::new(Mutex::new(AuthState::new(&config.user, &config.password)));
        let registry = ConnectionRegistry::new();
        let client = CameraClient::new(&config.ip, config.port, auth.clone(), registry.clone(), keep_open.clone())?
            .with_idle_timeout(deps.timings.idle_timeout);
        let (mjpeg_content_type, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(SessionInner {
                snapshots: Mutex::new(SnapshotStore::new(preroll_capacity(&config, 5))),
                profile,
                timings: deps.timings,
                bind_host: deps.bind_host,
                state: RwLock::new(SessionState::default()),
                registry,
                tasks: TaskSet::new(),
                transcoders: TranscoderManager::new(deps.transcoders),
                onvif: deps.onvif,
                status: deps.status,
                online: deps.online,
                auth,
                client,
                keep_open,
                low_priority,
                hub: StreamHub::new(),
                server: Mutex::new(None),
                alarm_tx: Mutex::new(None),
                mjpeg_content_type,
                config,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn config(&self) -> &CameraConfig {
        &self.inner.config
    }

    pub fn status(&self) -> CameraStatus {
        self.inner.state.read().status
    }

    pub fn is_online(&self) -> bool {
        self.inner.state.read().online
    }

    pub fn is_live(&self) -> bool {
        self.inner.state.read().live
    }

    pub fn snapshot_uri(&self) -> String {
        self.inner.state.read().snapshot_uri.clone()
    }

    pub fn mjpeg_uri(&self) -> String {
        self.inner.state.read().mjpeg_uri.clone()
    }

    pub fn rtsp_uri(&self) -> String {
        self.inner.state.read().rtsp_uri.clone()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.inner.tasks
    }

    pub fn transcoders(&self) -> &TranscoderManager {
        &self.inner.transcoders
    }

    pub fn current_snapshot(&self) -> Option<Bytes> {
        self.inner.snapshots.lock().current()
    }

    pub fn is_motion_detected(&self) -> bool {
        self.inner.state.read().motion_detected
    }

    /// 本地流服务器实际监听的端口
    pub fn server_port(&self) -> Option<u16> {
        self.inner.server.lock().as_ref().map(|s| s.port())
    }

    pub(super) fn generation(&self) -> u64 {
        self.inner.state.read().generation
    }

    pub(super) fn url_context(&self) -> UrlContext<'_> {
        url_context(&self.inner.config)
    }

    pub(super) fn set_channel(&self, channel: &str, value: ChannelValue) {
        self.inner.status.channel_updated(&self.inner.config.id, channel, value);
    }

    /// 快照轮询间隔，限制最小值
    pub(super) fn poll_time(&self) -> Duration {
        Duration::from_millis(self.inner.config.poll_time_ms).max(MIN_POLL_TIME)
    }

    /// 一个轮询周期内的随机延迟，同时启动的摄像头因此错开请求
    pub(super) fn poll_jitter(&self) -> Duration {
        let millis = self.poll_time().as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..millis.max(1)))
    }

    /// 发送一个 GET 请求，回复经解复用后交回本会话
    pub(super) fn send_get(&self, path: &str) {
        if path.is_empty() {
            return;
        }
        let generation = {
            let state = self.inner.state.read();
            if !state.live {
                return;
            }
            state.generation
        };
        let sink = Arc::new(SessionSink {
            session: self.clone(),
            generation,
        });
        self.inner.client.send_get(path, sink);
    }

    /// 初始化会话；已经在运行的会话先被释放
    pub async fn initialize(&self) -> Result<()> {
        let live = self.inner.state.read().live;
        if live {
            self.dispose();
        }
        match self.start_session().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_configuration() {
                    self.config_error(&e.to_string());
                } else {
                    // 启动到一半失败时不能留下没有连接检测的会话
                    self.dispose();
                    self.inner
                        .status
                        .status_changed(&self.inner.config.id, CameraStatus::Offline, &e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn start_session(&self) -> Result<()> {
        let config = &self.inner.config;
        config.validate()?;

        let profile = self.inner.profile;
        let ctx = self.url_context();
        let mut snapshot_uri = correct_url_format(&config.snapshot_url)?;
        if snapshot_uri.is_empty() {
            snapshot_uri = profile.default_snapshot_path(&ctx);
        }
        let mut mjpeg_uri = correct_url_format(&config.mjpeg_url)?;
        if mjpeg_uri.is_empty() {
            mjpeg_uri = profile.default_mjpeg_path(&ctx);
        }
        let rtsp_uri = if config.ffmpeg_input.trim().is_empty() {
            profile.default_ffmpeg_input(&ctx)
        } else {
            config.ffmpeg_input.trim().to_string()
        };
        if (snapshot_uri.is_empty() || snapshot_uri == "ffmpeg") && rtsp_uri.is_empty() {
            return Err(GatewayError::Configuration(format!(
                "camera {} has neither a snapshot url nor an ffmpeg input",
                config.id
            )));
        }

        {
            let mut state = self.inner.state.write();
            state.reset_runtime();
            state.live = true;
            state.status = CameraStatus::Connecting;
            state.snapshot_uri = snapshot_uri;
            state.mjpeg_uri = mjpeg_uri;
            state.rtsp_uri = rtsp_uri;
        }
        *self.inner.auth.lock() = AuthState::new(&config.user, &config.password);
        self.inner.snapshots.lock().set_capacity(preroll_capacity(config, 5));
        self.inner.mjpeg_content_type.send_replace(None);
        self.inner.status.status_changed(&config.id, CameraStatus::Connecting, "");

        if config.server_port == 0 {
            debug!("Camera {} has no server_port, local streams are disabled", config.id);
        } else {
            if config.server_port < 1025 {
                warn!(
                    "⚠️ Camera {} uses server_port {}, ports below 1025 may need extra privileges",
                    config.id, config.server_port
                );
            }
            let cancel = CancellationToken::new();
            let app = server::camera::router(self.clone(), cancel.clone());
            let handle = ServerHandle::bind(
                &self.inner.bind_host,
                config.server_port,
                app,
                cancel,
                &format!("Camera {}", config.id),
            )
            .await?;
            *self.inner.server.lock() = Some(handle);
        }

        // ffmpeg 的 HLS、录像和 GIF 都写到这个目录
        if !config.ffmpeg_output.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(&config.ffmpeg_output).await {
                warn!(
                    "⚠️ Camera {} cannot create output folder {:?}: {}",
                    config.id, config.ffmpeg_output, e
                );
            }
        }

        let (alarm_tx, mut alarm_rx) = mpsc::unbounded_channel();
        *self.inner.alarm_tx.lock() = Some(alarm_tx);
        let session = self.clone();
        self.inner.tasks.spawn_once("alarms", Duration::ZERO, async move {
            while let Some(signal) = alarm_rx.recv().await {
                session.on_alarm_signal(signal);
            }
            Ok(())
        });

        if config.brand != CameraBrand::Generic {
            if let Err(e) = self.inner.onvif.connect(config.brand == CameraBrand::Onvif).await {
                warn!("⚠️ ONVIF connect failed for camera {}: {}", config.id, e);
            }
        }

        let jitter = self.poll_jitter();
        let session = self.clone();
        self.inner
            .tasks
            .spawn_repeating("connect", jitter, self.inner.timings.connect_period, move || {
                let session = session.clone();
                async move { session.poll_connection().await }
            });

        info!(
            "📹 Camera {} ({}) initialized: brand={}, snapshot={:?}, mjpeg={:?}",
            config.id,
            config.display_name(),
            config.brand,
            masked_uri(&self.snapshot_uri()),
            masked_uri(&self.mjpeg_uri())
        );
        Ok(())
    }

    /// 离线时的连接检测，上线后该任务被取消
    async fn poll_connection(&self) -> Result<()> {
        let brand = self.inner.config.brand;
        if brand != CameraBrand::Generic && !self.inner.onvif.is_connected() {
            debug!("Camera {} trying ONVIF connection", self.id());
            if let Err(e) = self.inner.onvif.connect(brand == CameraBrand::Onvif).await {
                debug!("ONVIF connect failed for camera {}: {}", self.id(), e);
            }
        }

        let snapshot_uri = self.snapshot_uri();
        if snapshot_uri.is_empty() || snapshot_uri == "ffmpeg" {
            self.snapshot_is_ffmpeg();
        } else {
            self.send_get(&snapshot_uri);
        }
        Ok(())
    }

    /// 快照只能由 ffmpeg 生成时，直接认为摄像头在线
    fn snapshot_is_ffmpeg(&self) {
        self.bring_online();
        {
            let mut state = self.inner.state.write();
            state.snapshot_uri.clear();
            state.update_image_channel = false;
            state.ffmpeg_snapshot_generation = true;
        }
        if let Err(e) = self.start_output(super::outputs::OutputRequest::Snapshot) {
            warn!("⚠️ Camera {} cannot generate snapshots with ffmpeg: {}", self.id(), e);
        }
    }

    /// 第一次收到有效响应时上线
    pub(super) fn bring_online(&self) {
        let (hls_requested, alarms_enabled) = {
            let mut state = self.inner.state.write();
            if state.online || !state.live {
                return;
            }
            state.online = true;
            state.status = CameraStatus::Online;
            state.update_image_channel = self.inner.config.update_image_when('1');
            (
                state.hls_requested,
                state.ffmpeg_motion_threshold.is_some() || state.ffmpeg_audio_threshold.is_some(),
            )
        };
        let config = &self.inner.config;
        self.inner.status.status_changed(&config.id, CameraStatus::Online, "");
        self.inner.tasks.cancel("connect");

        if config.gif_preroll > 0 || config.update_image_when('1') {
            self.schedule_snapshot_polling(self.inner.timings.online_delay);
        }
        let session = self.clone();
        self.inner.tasks.spawn_repeating(
            "poll",
            self.inner.timings.online_delay,
            self.inner.timings.poll_period,
            move || {
                let session = session.clone();
                async move { session.poll_cycle().await }
            },
        );

        if let Some(path) = self.inner.keep_open.clone() {
            self.send_get(&path);
        }
        if alarms_enabled {
            self.restart_alarm_transcoder();
        }
        if self.inner.hub.has_consumers(super::streams::StreamKind::Mjpeg) {
            self.start_mjpeg_source();
        }
        self.inner.online.insert(Arc::new(self.clone()));
        if hls_requested {
            self.set_hls(true);
        }
    }

    /// 上线后的周期轮询
    async fn poll_cycle(&self) -> Result<()> {
        let (snapshot_uri, auto_fps, polling, ffmpeg_snapshot, low_priority) = {
            let mut state = self.inner.state.write();
            if state.streaming_auto_fps {
                state.update_auto_fps = true;
            }
            let low_priority = if self.inner.low_priority.is_empty() {
                None
            } else {
                let index = state.low_priority_index % self.inner.low_priority.len();
                state.low_priority_index = index + 1;
                Some(self.inner.low_priority[index].clone())
            };
            (
                state.snapshot_uri.clone(),
                state.streaming_auto_fps,
                state.snapshot_polling,
                state.ffmpeg_snapshot_generation,
                low_priority,
            )
        };

        if auto_fps {
            if !polling && !ffmpeg_snapshot {
                self.send_get(&snapshot_uri);
            }
        } else if !polling {
            self.send_get(&snapshot_uri);
        }
        if let Some(path) = low_priority {
            self.send_get(&path);
        }

        for action in self.inner.profile.poll_actions(&self.url_context()) {
            match action {
                PollAction::RestartAlarmStream => {
                    if let Some(path) = &self.inner.keep_open {
                        if self.inner.registry.is_stopped(path) {
                            info!("Alarm stream of camera {} was not running, re-starting it now", self.id());
                            self.send_get(path);
                        }
                    }
                }
                PollAction::Request(path) => self.send_get(&path),
                PollAction::ClearAlarms => {
                    self.no_motion_detected(common::channels::MOTION_ALARM);
                    self.no_motion_detected(common::channels::PIR_ALARM);
                    self.no_audio_detected();
                }
                PollAction::ReconnectOnvif => {
                    if !self.inner.onvif.is_connected() {
                        if let Err(e) = self.inner.onvif.connect(true).await {
                            debug!("ONVIF reconnect failed for camera {}: {}", self.id(), e);
                        }
                    }
                }
            }
        }

        self.inner.transcoders.check_keep_alive(StreamFormat::Hls);

        let open = self.inner.registry.open_count();
        if open > MAX_OPEN_CONNECTIONS {
            let removed = self.inner.registry.sweep();
            warn!(
                "⚠️ {}",
                GatewayError::ResourceExhausted(format!(
                    "camera {} has {} open connections, cleaned {}",
                    self.id(),
                    open,
                    removed
                ))
            );
        }
        Ok(())
    }

    /// 配置错误：停止会话，不会重试
    pub(super) fn config_error(&self, reason: &str) {
        warn!("⚠️ Camera {} configuration error: {}", self.id(), reason);
        self.dispose();
        self.inner
            .status
            .status_changed(&self.inner.config.id, CameraStatus::Offline, reason);
    }

    /// 通信错误：已在线的会话释放后重新初始化，未上线的等待下次连接检测
    pub(super) fn communication_error(&self, reason: &str) {
        let (was_online, status_changed, generation) = {
            let mut state = self.inner.state.write();
            if !state.live {
                return;
            }
            let was_online = state.online;
            let changed = state.status != CameraStatus::Offline;
            state.online = false;
            state.status = CameraStatus::Offline;
            (was_online, changed, state.generation)
        };
        if status_changed {
            self.inner
                .status
                .status_changed(&self.inner.config.id, CameraStatus::Offline, reason);
        } else {
            debug!("Camera {} still unreachable: {}", self.id(), reason);
        }

        if was_online {
            info!("Camera {} lost its connection, reconnecting", self.id());
            let session = self.clone();
            tokio::spawn(async move {
                // 期间已被释放或重新初始化时放弃
                if session.generation() != generation {
                    return;
                }
                session.dispose();
                if let Err(e) = session.initialize().await {
                    warn!("⚠️ Camera {} failed to re-initialize: {}", session.id(), e);
                }
            });
        }
    }

    /// 释放会话持有的所有资源，可重复调用
    pub fn dispose(&self) {
        let status_changed = {
            let mut state = self.inner.state.write();
            state.generation += 1;
            let changed = state.status != CameraStatus::Offline;
            let was_live = state.live;
            state.live = false;
            state.reset_runtime();
            state.status = CameraStatus::Offline;
            if was_live {
                debug!("Disposing camera {} (generation {})", self.inner.config.id, state.generation);
            }
            changed
        };

        self.inner.tasks.cancel_all();
        self.inner.onvif.disconnect();
        self.inner.online.remove(&self.inner.config.id);
        self.inner.auth.lock().clear();
        *self.inner.alarm_tx.lock() = None;
        if let Some(server) = self.inner.server.lock().take() {
            server.stop();
        }
        self.inner.registry.close_all();
        self.inner.transcoders.stop_all();
        self.inner.hub.clear();
        self.inner.mjpeg_content_type.send_replace(None);

        if status_changed {
            self.inner
                .status
                .status_changed(&self.inner.config.id, CameraStatus::Offline, "");
        }
    }

    fn on_head(&self, path: &str, head: &ResponseHead) {
        if head.is_unauthorized() {
            return;
        }
        self.bring_online();
        if head.is_multipart() && path == self.mjpeg_uri() {
            self.inner.mjpeg_content_type.send_replace(head.content_type.clone());
        }
    }

    fn on_multipart(&self, path: &str, chunk: Bytes) {
        if path == self.mjpeg_uri() {
            self.inner.hub.publish(super::streams::StreamKind::Mjpeg, chunk);
        } else {
            self.on_text(path, &String::from_utf8_lossy(&chunk));
        }
    }

    fn on_text(&self, path: &str, reply: &str) {
        for event in self.inner.profile.parse_reply(path, reply) {
            self.apply_event(event);
        }
    }

    pub(super) fn apply_event(&self, event: BrandEvent) {
        match event {
            BrandEvent::Motion { channel, active: true } => self.motion_detected(channel),
            BrandEvent::Motion { channel, active: false } => self.no_motion_detected(channel),
            BrandEvent::Audio(true) => self.audio_detected(),
            BrandEvent::Audio(false) => self.no_audio_detected(),
            BrandEvent::Channel { channel, value } => self.set_channel(channel, value),
        }
    }

    /// 历史记录：最新的在前，最多 `HISTORY_LIMIT` 条
    pub(super) fn push_history(history: &mut VecDeque<String>, name: &str) -> String {
        if history.front().map(String::as_str) != Some(name) {
            history.push_front(name.to_string());
        }
        history.truncate(HISTORY_LIMIT);
        history.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

fn url_context(config: &CameraConfig) -> UrlContext<'_> {
    UrlContext {
        ip: &config.ip,
        nvr_channel: config.nvr_channel,
        user: &config.user,
        password: &config.password,
    }
}

/// 预录缓冲大小：预录帧数加录像时长，不预录时为0
pub(super) fn preroll_capacity(config: &CameraConfig, record_secs: u32) -> usize {
    if config.gif_preroll == 0 {
        0
    } else {
        (config.gif_preroll + record_secs) as usize
    }
}

/// 把连接事件交回会话，旧代数的事件直接丢弃
struct SessionSink {
    session: CameraSession,
    generation: u64,
}

impl SessionSink {
    fn is_current(&self) -> bool {
        self.session.generation() == self.generation
    }
}

impl ResponseSink for SessionSink {
    fn on_head(&self, path: &str, head: &ResponseHead) {
        if self.is_current() {
            self.session.on_head(path, head);
        }
    }

    fn on_image(&self, path: &str, jpeg: Bytes) {
        if self.is_current() {
            debug!(
                "Camera {} sent {} byte image for {}",
                self.session.id(),
                jpeg.len(),
                masked_uri(path)
            );
            self.session.process_snapshot(jpeg);
        }
    }

    fn on_multipart(&self, path: &str, chunk: Bytes) {
        if self.is_current() {
            self.session.on_multipart(path, chunk);
        }
    }

    fn on_text(&self, path: &str, reply: String) {
        if self.is_current() {
            self.session.on_text(path, &reply);
        }
    }

    fn on_failure(&self, path: &str, error: GatewayError) {
        if !self.is_current() {
            return;
        }
        debug!(
            "Request {} to camera {} failed: {}",
            masked_uri(path),
            self.session.id(),
            error
        );
        if error.is_configuration() {
            self.session.config_error(&error.to_string());
        } else {
            self.session.communication_error(&error.to_string());
        }
    }
}

impl GroupMember for CameraSession {
    fn id(&self) -> String {
        self.inner.config.id.clone()
    }

    fn has_motion(&self) -> bool {
        self.is_motion_detected()
    }

    fn hls_folder(&self) -> PathBuf {
        self.inner.config.ffmpeg_output.clone()
    }

    fn set_hls(&self, on: bool) {
        CameraSession::set_hls(self, on);
    }

    fn current_snapshot(&self) -> Option<Bytes> {
        CameraSession::current_snapshot(self)
    }
}
