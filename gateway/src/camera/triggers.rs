//! 移动/声音触发与快照轮询

use super::brand::instar_alarm_events;
use super::outputs::OutputRequest;
use super::session::CameraSession;
use super::streams::StreamKind;
use crate::transcoder::AlarmSignal;
use bytes::Bytes;
use common::mjpeg::frame_part;
use common::{channels, ChannelValue, GatewayError, Result, StreamFormat};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 开始快照轮询前的延迟
const SNAPSHOT_POLL_DELAY: Duration = Duration::from_millis(200);

impl CameraSession {
    pub fn motion_detected(&self, channel: &str) {
        self.set_channel(channels::LAST_MOTION_TYPE, ChannelValue::Text(channel.to_string()));
        self.set_channel(channel, ChannelValue::OnOff(true));

        let config = &self.inner.config;
        let (auto_fps, first_snapshot) = {
            let mut state = self.inner.state.write();
            state.motion_detected = true;
            let mut first_snapshot = None;
            if config.update_image_when('2') {
                if !state.first_motion_alarm {
                    state.first_motion_alarm = true;
                    first_snapshot = Some(state.snapshot_uri.clone());
                }
            } else if config.update_image_when('4') {
                state.first_motion_alarm = true;
                state.motion_alarm_update_snapshot = true;
            }
            (state.streaming_auto_fps, first_snapshot)
        };

        if auto_fps || config.update_image_when('4') {
            self.start_snapshot_polling();
        }
        if let Some(uri) = first_snapshot {
            self.send_get(&uri);
        }
    }

    pub fn no_motion_detected(&self, channel: &str) {
        self.set_channel(channel, ChannelValue::OnOff(false));
        {
            let mut state = self.inner.state.write();
            state.motion_detected = false;
            state.first_motion_alarm = false;
            state.motion_alarm_update_snapshot = false;
        }
        self.stop_snapshot_polling();
    }

    pub fn audio_detected(&self) {
        self.set_channel(channels::AUDIO_ALARM, ChannelValue::OnOff(true));
        let config = &self.inner.config;
        let first_snapshot = {
            let mut state = self.inner.state.write();
            let mut first_snapshot = None;
            if config.update_image_when('3') {
                if !state.first_audio_alarm {
                    state.first_audio_alarm = true;
                    first_snapshot = Some(state.snapshot_uri.clone());
                }
            } else if config.update_image_when('5') {
                state.first_audio_alarm = true;
                state.audio_alarm_update_snapshot = true;
            }
            first_snapshot
        };
        if let Some(uri) = first_snapshot {
            self.send_get(&uri);
        }
    }

    pub fn no_audio_detected(&self) {
        self.set_channel(channels::AUDIO_ALARM, ChannelValue::OnOff(false));
        let mut state = self.inner.state.write();
        state.first_audio_alarm = false;
        state.audio_alarm_update_snapshot = false;
    }

    /// 外部系统（例如另一个传感器）报告的移动
    pub fn external_motion(&self, on: bool) {
        if on {
            self.motion_detected(channels::EXTERNAL_MOTION);
        } else {
            self.no_motion_detected(channels::EXTERNAL_MOTION);
        }
    }

    /// Instar 摄像头推送到 `/instar?active=N` 的报警
    pub fn instar_alarm(&self, active: u32) {
        debug!("Camera {} pushed instar alarm {}", self.id(), active);
        for event in instar_alarm_events(active) {
            self.apply_event(event);
        }
    }

    pub(super) fn on_alarm_signal(&self, signal: AlarmSignal) {
        match signal {
            AlarmSignal::Motion(true) => self.motion_detected(channels::FFMPEG_MOTION_ALARM),
            AlarmSignal::Motion(false) => self.no_motion_detected(channels::FFMPEG_MOTION_ALARM),
            AlarmSignal::Audio(true) => self.audio_detected(),
            AlarmSignal::Audio(false) => self.no_audio_detected(),
        }
    }

    /// 按需开始快照轮询
    pub(super) fn start_snapshot_polling(&self) {
        let start = {
            let state = self.inner.state.read();
            if state.snapshot_polling || state.ffmpeg_snapshot_generation || !state.online {
                false
            } else {
                state.streaming_snapshot_mjpeg
                    || state.streaming_auto_fps
                    || state.pending_gif.is_some()
                    || self.inner.config.update_image_when('4')
            }
        };
        if start {
            self.schedule_snapshot_polling(SNAPSHOT_POLL_DELAY);
        }
    }

    pub(super) fn schedule_snapshot_polling(&self, delay: Duration) {
        self.inner.state.write().snapshot_polling = true;
        let session = self.clone();
        self.inner
            .tasks
            .spawn_repeating("snapshot", delay + self.poll_jitter(), self.poll_time(), move || {
                let session = session.clone();
                async move { session.snapshot_tick().await }
            });
        debug!("Camera {} snapshot polling started", self.id());
    }

    /// 没有任何需要持续快照的理由时停止轮询
    pub(super) fn stop_snapshot_polling(&self) {
        let config = &self.inner.config;
        let stop = {
            let mut state = self.inner.state.write();
            let keep = state.streaming_snapshot_mjpeg
                || state.pending_gif.is_some()
                || config.gif_preroll > 0
                || config.update_image_when('1')
                || (state.motion_detected && (state.streaming_auto_fps || config.update_image_when('4')));
            if state.snapshot_polling && !keep {
                state.snapshot_polling = false;
                true
            } else {
                false
            }
        };
        if stop {
            self.inner.tasks.cancel("snapshot");
            debug!("Camera {} snapshot polling stopped", self.id());
        }
    }

    async fn snapshot_tick(&self) -> Result<()> {
        let (snapshot_uri, gif_ready) = {
            let mut state = self.inner.state.write();
            let mut gif_ready = None;
            if state.snap_count > 0 {
                state.snap_count -= 1;
                if state.snap_count == 0 {
                    gif_ready = state.pending_gif.take();
                }
            }
            (state.snapshot_uri.clone(), gif_ready)
        };
        self.send_get(&snapshot_uri);

        if let Some((name, secs)) = gif_ready {
            self.finish_preroll_gif(&name, secs).await?;
            self.stop_snapshot_polling();
        }
        Ok(())
    }

    /// 处理一张完整的快照
    pub fn process_snapshot(&self, jpeg: Bytes) {
        self.inner.snapshots.lock().push(jpeg.clone());

        let (update_image, auto_fps_frame) = {
            let mut state = self.inner.state.write();
            let mut update_image = state.update_image_channel;
            if state.first_motion_alarm || state.motion_alarm_update_snapshot {
                update_image = true;
                state.first_motion_alarm = false;
            }
            if state.first_audio_alarm || state.audio_alarm_update_snapshot {
                update_image = true;
                state.first_audio_alarm = false;
            }
            let auto_fps_frame = state.streaming_auto_fps && (state.motion_detected || state.update_auto_fps);
            if auto_fps_frame {
                state.update_auto_fps = false;
            }
            (update_image, auto_fps_frame)
        };

        let hub = &self.inner.hub;
        if hub.has_consumers(StreamKind::Snapshots) || auto_fps_frame {
            let frame = frame_part(&jpeg);
            if hub.has_consumers(StreamKind::Snapshots) {
                hub.publish(StreamKind::Snapshots, frame.clone());
            }
            if auto_fps_frame {
                hub.publish(StreamKind::AutoFps, frame);
            }
        }
        if update_image {
            self.set_channel(channels::IMAGE, ChannelValue::Image(jpeg));
        }
    }

    /// ffmpeg 从 RTSP 生成的 MJPEG 帧
    pub fn process_ffmpeg_frame(&self, jpeg: Bytes) {
        self.inner.hub.publish(StreamKind::Mjpeg, frame_part(&jpeg));
    }

    /// 单次刷新 image 通道
    pub fn poll_image(&self) {
        let uri = self.snapshot_uri();
        if uri.is_empty() {
            if let Some(current) = self.current_snapshot() {
                self.set_channel(channels::IMAGE, ChannelValue::Image(current));
            }
        } else {
            self.inner.state.write().first_motion_alarm = true;
            self.send_get(&uri);
        }
    }

    /// 设置 ffmpeg 场景变化阈值（0..=100），0 关闭
    pub fn set_ffmpeg_motion(&self, threshold: u32) -> Result<()> {
        if threshold > 100 {
            return Err(GatewayError::InvalidParameter(format!(
                "motion threshold {} is outside 0..=100",
                threshold
            )));
        }
        self.inner.state.write().ffmpeg_motion_threshold =
            (threshold > 0).then(|| f64::from(threshold) / 10000.0);
        if threshold == 0 {
            self.no_motion_detected(channels::FFMPEG_MOTION_ALARM);
        }
        info!("Camera {} ffmpeg motion threshold set to {}", self.id(), threshold);
        self.restart_alarm_transcoder();
        Ok(())
    }

    /// 设置 ffmpeg 静音检测阈值（dB），0 关闭
    pub fn set_ffmpeg_audio(&self, threshold: u32) -> Result<()> {
        if threshold > 100 {
            return Err(GatewayError::InvalidParameter(format!(
                "audio threshold {} is outside 0..=100",
                threshold
            )));
        }
        self.inner.state.write().ffmpeg_audio_threshold = (threshold > 0).then_some(threshold);
        if threshold == 0 {
            self.no_audio_detected();
        }
        self.restart_alarm_transcoder();
        Ok(())
    }

    /// 按当前阈值重启报警转码进程，离线时等上线后再启动
    pub(super) fn restart_alarm_transcoder(&self) {
        self.inner.transcoders.stop(StreamFormat::RtspAlarms);
        let (motion_threshold, audio_threshold, online) = {
            let state = self.inner.state.read();
            (state.ffmpeg_motion_threshold, state.ffmpeg_audio_threshold, state.online)
        };
        if !online || (motion_threshold.is_none() && audio_threshold.is_none()) {
            return;
        }
        if let Err(e) = self.start_output(OutputRequest::RtspAlarms {
            motion_threshold,
            audio_threshold,
        }) {
            warn!("⚠️ Camera {} cannot start ffmpeg alarms: {}", self.id(), e);
        }
    }
}
