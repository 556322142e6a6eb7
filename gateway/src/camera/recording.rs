//! MP4 录像和 GIF 生成

use super::outputs::OutputRequest;
use super::session::{preroll_capacity, CameraSession};
use super::snapshot::SnapshotStore;
use common::{channels, ChannelValue, GatewayError, Result, StreamFormat};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct RecordingHistory {
    pub gif: Vec<String>,
    pub mp4: Vec<String>,
}

/// 文件名只允许出现在输出目录内
fn check_file_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && name.chars().all(|c| !c.is_control());
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidParameter(format!("invalid recording name {:?}", name)))
    }
}

fn check_secs(secs: u32) -> Result<()> {
    if secs == 0 || secs > 3600 {
        return Err(GatewayError::InvalidParameter(format!(
            "recording length {} is outside 1..=3600 seconds",
            secs
        )));
    }
    Ok(())
}

impl CameraSession {
    /// 从 RTSP 录制 `secs` 秒的 MP4
    pub fn record_mp4(&self, name: &str, secs: u32) -> Result<()> {
        check_file_name(name)?;
        check_secs(secs)?;
        self.start_output(OutputRequest::Record {
            name: name.to_string(),
            secs,
        })?;
        info!("📹 Camera {} recording {}.mp4 for {}s", self.id(), name, secs);

        let history = {
            let mut state = self.inner.state.write();
            Self::push_history(&mut state.mp4_history, name)
        };
        self.set_channel(channels::RECORDING_MP4, ChannelValue::Number(f64::from(secs)));
        self.set_channel(channels::MP4_HISTORY, ChannelValue::Text(history));
        self.publish_history_lengths();
        Ok(())
    }

    /// 生成 `secs` 秒的 GIF；配置了预录时先收集快照，数量够了再生成
    pub fn record_gif(&self, name: &str, secs: u32) -> Result<()> {
        check_file_name(name)?;
        check_secs(secs)?;
        let config = &self.inner.config;

        if config.gif_preroll > 0 {
            {
                let mut state = self.inner.state.write();
                state.snap_count = secs;
                state.pending_gif = Some((name.to_string(), secs));
            }
            self.inner
                .snapshots
                .lock()
                .set_capacity(preroll_capacity(config, secs));
            self.start_snapshot_polling();
            debug!("Camera {} collecting {} snapshots for {}.gif", self.id(), secs, name);
        } else {
            self.start_output(OutputRequest::Gif {
                name: name.to_string(),
                secs,
                preroll_frames: 0,
            })?;
            self.push_gif_history(name);
        }
        self.set_channel(channels::RECORDING_GIF, ChannelValue::Number(f64::from(secs)));
        Ok(())
    }

    /// 预录快照已收集完：写出文件后由 ffmpeg 合成 GIF
    pub(super) async fn finish_preroll_gif(&self, name: &str, secs: u32) -> Result<()> {
        let frames = self.inner.snapshots.lock().preroll();
        let folder = self.inner.config.ffmpeg_output.clone();
        let written = tokio::task::spawn_blocking(move || SnapshotStore::write_preroll(&frames, &folder))
            .await
            .map_err(|e| GatewayError::Transcoder(format!("snapshot writer failed: {}", e)))??;
        debug!("Camera {} wrote {} preroll snapshots", self.id(), written.len());

        self.start_output(OutputRequest::Gif {
            name: name.to_string(),
            secs,
            preroll_frames: self.inner.config.gif_preroll,
        })?;
        self.push_gif_history(name);
        Ok(())
    }

    fn push_gif_history(&self, name: &str) {
        info!("📹 Camera {} creating {}.gif", self.id(), name);
        let history = {
            let mut state = self.inner.state.write();
            Self::push_history(&mut state.gif_history, name)
        };
        self.set_channel(channels::GIF_HISTORY, ChannelValue::Text(history));
        self.publish_history_lengths();
    }

    fn publish_history_lengths(&self) {
        let (gif, mp4) = {
            let state = self.inner.state.read();
            (state.gif_history.len(), state.mp4_history.len())
        };
        self.set_channel(channels::GIF_HISTORY_LENGTH, ChannelValue::Number(gif as f64));
        self.set_channel(channels::MP4_HISTORY_LENGTH, ChannelValue::Number(mp4 as f64));
    }

    pub fn recording_history(&self) -> RecordingHistory {
        let state = self.inner.state.read();
        RecordingHistory {
            gif: state.gif_history.iter().cloned().collect(),
            mp4: state.mp4_history.iter().cloned().collect(),
        }
    }

    /// 清空某种格式的历史
    pub fn clear_history(&self, format: StreamFormat) -> Result<()> {
        {
            let mut state = self.inner.state.write();
            match format {
                StreamFormat::Gif => state.gif_history.clear(),
                StreamFormat::Record => state.mp4_history.clear(),
                other => {
                    return Err(GatewayError::InvalidParameter(format!(
                        "{} has no recording history",
                        other
                    )))
                }
            }
        }
        let channel = if format == StreamFormat::Gif {
            channels::GIF_HISTORY
        } else {
            channels::MP4_HISTORY
        };
        self.set_channel(channel, ChannelValue::Text(String::new()));
        self.publish_history_lengths();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::session::tests::{camera_config, harness, mount_snapshot, wait_until};
    use super::*;
    use wiremock::MockServer;

    #[test]
    fn test_file_names() {
        assert!(check_file_name("front_door").is_ok());
        assert!(check_file_name("../etc/passwd").is_err());
        assert!(check_file_name("").is_err());
        assert!(check_secs(0).is_err());
        assert!(check_secs(10).is_ok());
    }

    #[tokio::test]
    async fn test_mp4_recording_updates_history() {
        let server = MockServer::start().await;
        mount_snapshot(&server).await;
        let h = harness(camera_config(&server));
        h.session.initialize().await.unwrap();

        h.session.record_mp4("first", 10).unwrap();
        h.session.record_mp4("second", 5).unwrap();
        assert_eq!(h.factory.started(StreamFormat::Record), 2);
        let job = h.factory.last_job(StreamFormat::Record).unwrap();
        assert!(job.output.ends_with("second.mp4"));
        assert!(job.input_options.contains("-t 5"));

        assert_eq!(
            h.store.channel("front", channels::MP4_HISTORY),
            Some(ChannelValue::Text("second,first".into()))
        );
        assert_eq!(h.session.recording_history().mp4, vec!["second", "first"]);
        h.session.clear_history(StreamFormat::Record).unwrap();
        assert_eq!(
            h.store.channel("front", channels::MP4_HISTORY_LENGTH),
            Some(ChannelValue::Number(0.0))
        );
        assert!(h.session.clear_history(StreamFormat::Hls).is_err());
        h.session.dispose();
    }

    #[tokio::test]
    async fn test_gif_with_preroll_waits_for_snapshots() {
        let server = MockServer::start().await;
        mount_snapshot(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = camera_config(&server);
        config.gif_preroll = 2;
        config.ffmpeg_output = dir.path().to_path_buf();
        let h = harness(config);
        h.session.initialize().await.unwrap();
        wait_until(|| h.session.is_online()).await;

        h.session.record_gif("preroll", 2).unwrap();
        assert_eq!(h.factory.started(StreamFormat::Gif), 0);

        wait_until(|| h.factory.started(StreamFormat::Gif) == 1).await;
        let job = h.factory.last_job(StreamFormat::Gif).unwrap();
        assert!(job.input.ends_with("snapshot%d.jpg"));
        assert!(dir.path().join("snapshot0.jpg").exists());
        assert_eq!(
            h.store.channel("front", channels::GIF_HISTORY),
            Some(ChannelValue::Text("preroll".into()))
        );
        h.session.dispose();
    }
}
