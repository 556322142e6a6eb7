//! HLS、MJPEG 等按需输出和云台控制

use super::outputs::{build_job, OutputRequest};
use super::session::CameraSession;
use super::streams::StreamKind;
use crate::onvif::PtzRequest;
use bytes::Bytes;
use common::mjpeg::{frame_part, stream_content_type};
use common::{channels, ChannelValue, GatewayError, Result, StreamFormat};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transcoder::{DEFAULT_KEEP_ALIVE, KEEP_ALIVE_FOREVER};

/// 一个下游 MJPEG 消费者
pub struct Subscription {
    pub content_type: String,
    /// 先于广播帧发送的帧
    pub initial: Vec<Bytes>,
    pub receiver: broadcast::Receiver<Bytes>,
    pub guard: ConsumerGuard,
}

/// 消费者断开（响应体被丢弃）时离开消费者集合
pub struct ConsumerGuard {
    session: CameraSession,
    kind: StreamKind,
    id: Uuid,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.session.leave_stream(self.kind, self.id);
    }
}

impl CameraSession {
    /// 按请求生成转码任务并启动
    ///
    /// 录像、GIF 和报警每次请求参数都可能不同，先停止旧进程。
    pub(super) fn start_output(&self, request: OutputRequest) -> Result<()> {
        let format = request.format();
        let rtsp_uri = self.rtsp_uri();
        let job = build_job(&self.inner.config, &rtsp_uri, &request)?;
        let alarms = match format {
            StreamFormat::RtspAlarms => self.inner.alarm_tx.lock().clone(),
            _ => None,
        };
        if matches!(format, StreamFormat::Gif | StreamFormat::Record | StreamFormat::RtspAlarms) {
            self.inner.transcoders.stop(format);
        }
        self.inner.transcoders.start(job, alarms)
    }

    /// 打开或关闭持续的HLS输出
    pub fn set_hls(&self, on: bool) {
        let online = {
            let mut state = self.inner.state.write();
            state.hls_requested = on;
            state.online
        };
        if on {
            if !online {
                debug!("Camera {} is offline, HLS starts once it is online", self.id());
                return;
            }
            if let Err(e) = self.start_output(OutputRequest::Hls) {
                warn!("⚠️ Camera {} cannot start HLS: {}", self.id(), e);
                return;
            }
            self.inner.transcoders.set_keep_alive(StreamFormat::Hls, KEEP_ALIVE_FOREVER);
            self.set_channel(channels::START_STREAM, ChannelValue::OnOff(true));
        } else {
            // 下一次保活检查时停止
            self.inner.transcoders.set_keep_alive(StreamFormat::Hls, 1);
            self.set_channel(channels::START_STREAM, ChannelValue::OnOff(false));
        }
    }

    pub fn hls_playlist_path(&self) -> PathBuf {
        self.inner.config.ffmpeg_output.join(crate::group::CAMERA_PLAYLIST)
    }

    /// 下游请求 `ipcamera.m3u8`：未运行时启动HLS并等待播放列表生成，运行中则续期保活
    pub async fn request_hls(&self) -> Result<PathBuf> {
        if self.inner.transcoders.is_running(StreamFormat::Hls) {
            self.inner.transcoders.set_keep_alive(StreamFormat::Hls, DEFAULT_KEEP_ALIVE);
            return Ok(self.hls_playlist_path());
        }
        self.start_output(OutputRequest::Hls)?;
        self.set_channel(channels::START_STREAM, ChannelValue::OnOff(true));
        tokio::time::sleep(self.inner.timings.hls_startup).await;
        Ok(self.hls_playlist_path())
    }

    /// 加入一种 MJPEG 流
    pub async fn subscribe(&self, kind: StreamKind) -> Result<Subscription> {
        let (id, receiver, first) = self.inner.hub.join(kind);
        let guard = ConsumerGuard {
            session: self.clone(),
            kind,
            id,
        };

        let mut initial = Vec::new();
        let content_type = match kind {
            StreamKind::Mjpeg => {
                let mut content_type = self.inner.mjpeg_content_type.subscribe();
                if first {
                    self.start_mjpeg_source();
                }
                if self.native_mjpeg() {
                    let wait = content_type.wait_for(|value| value.is_some());
                    match tokio::time::timeout(self.inner.timings.mjpeg_head_timeout, wait).await {
                        Ok(Ok(value)) => value.clone().unwrap_or_else(stream_content_type),
                        _ => {
                            return Err(GatewayError::Communication(format!(
                                "camera {} did not start its mjpeg stream",
                                self.id()
                            )))
                        }
                    }
                } else {
                    stream_content_type()
                }
            }
            StreamKind::Snapshots => {
                if let Some(current) = self.current_snapshot() {
                    initial.push(frame_part(&current));
                }
                self.inner.state.write().streaming_snapshot_mjpeg = true;
                self.start_snapshot_polling();
                stream_content_type()
            }
            StreamKind::AutoFps => {
                // 部分播放器需要两帧才开始显示
                if let Some(current) = self.current_snapshot() {
                    let frame = frame_part(&current);
                    initial.push(frame.clone());
                    initial.push(frame);
                }
                let motion = {
                    let mut state = self.inner.state.write();
                    state.streaming_auto_fps = true;
                    state.motion_detected
                };
                if motion {
                    self.start_snapshot_polling();
                }
                stream_content_type()
            }
        };

        debug!(
            "Camera {} has {} {:?} consumers",
            self.id(),
            self.inner.hub.consumers(kind),
            kind
        );
        Ok(Subscription {
            content_type,
            initial,
            receiver,
            guard,
        })
    }

    /// 摄像头自带 MJPEG 流，否则由 ffmpeg 从 RTSP 生成
    fn native_mjpeg(&self) -> bool {
        let uri = self.mjpeg_uri();
        !(uri.is_empty() || uri == "ffmpeg")
    }

    pub(super) fn start_mjpeg_source(&self) {
        if !self.is_online() {
            return;
        }
        if self.native_mjpeg() {
            self.inner.mjpeg_content_type.send_replace(None);
            let session = self.clone();
            let uri = self.mjpeg_uri();
            self.inner
                .tasks
                .spawn_once("mjpeg", self.inner.timings.mjpeg_delay, async move {
                    session.send_get(&uri);
                    Ok(())
                });
        } else if let Err(e) = self.start_output(OutputRequest::Mjpeg) {
            warn!("⚠️ Camera {} cannot start ffmpeg mjpeg: {}", self.id(), e);
        }
    }

    fn leave_stream(&self, kind: StreamKind, id: Uuid) {
        if !self.inner.hub.leave(kind, id) {
            return;
        }
        match kind {
            StreamKind::Mjpeg => {
                info!("All ipcamera.mjpeg streams of camera {} have stopped", self.id());
                if self.native_mjpeg() {
                    self.inner.tasks.cancel("mjpeg");
                    self.inner.registry.close(&self.mjpeg_uri());
                    self.inner.mjpeg_content_type.send_replace(None);
                } else {
                    self.inner.transcoders.stop(StreamFormat::Mjpeg);
                }
            }
            StreamKind::Snapshots => {
                self.inner.state.write().streaming_snapshot_mjpeg = false;
                self.stop_snapshot_polling();
            }
            StreamKind::AutoFps => {
                self.inner.state.write().streaming_auto_fps = false;
                self.stop_snapshot_polling();
            }
        }
    }

    /// 云台控制，只对支持 PTZ 的 ONVIF 连接有效
    pub async fn ptz(&self, request: PtzRequest) -> Result<()> {
        if !self.inner.onvif.supports_ptz() {
            return Err(GatewayError::InvalidParameter(format!(
                "camera {} does not support PTZ",
                self.id()
            )));
        }
        debug!("Camera {} PTZ {:?}", self.id(), request);
        self.inner.onvif.send_ptz_request(request).await
    }
}
