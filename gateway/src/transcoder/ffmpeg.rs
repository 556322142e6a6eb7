use super::{AlarmParser, AlarmSignal, KeepAlive, KeepAliveAction, TranscodeJob, Transcoder, TranscoderFactory};
use common::{GatewayError, Result};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// 基于 ffmpeg 命令行的转码进程
pub struct FfmpegTranscoder {
    location: String,
    job: TranscodeJob,
    child: Mutex<Option<Child>>,
    keep_alive: KeepAlive,
    alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
}

impl FfmpegTranscoder {
    pub fn new(
        location: &str,
        job: TranscodeJob,
        alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
    ) -> Self {
        Self {
            location: location.to_string(),
            job,
            child: Mutex::new(None),
            keep_alive: KeepAlive::default(),
            alarms,
        }
    }

    fn spawn_stderr_reader(&self, child: &mut Child) {
        let Some(stderr) = child.stderr.take() else {
            return;
        };
        let format = self.job.format;
        let alarms = self.alarms.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = AlarmParser::new();
            while let Ok(Some(line)) = lines.next_line().await {
                match &alarms {
                    Some(sender) => {
                        if let Some(signal) = parser.feed_line(&line) {
                            if sender.send(signal).is_err() {
                                break;
                            }
                        }
                    }
                    None => trace!("{}: {}", format, line),
                }
            }
            debug!("{} transcoder output closed", format);
        });
    }
}

impl Transcoder for FfmpegTranscoder {
    fn start_converting(&self) -> Result<()> {
        let mut child = self.child.lock();
        if let Some(running) = child.as_mut() {
            if matches!(running.try_wait(), Ok(None)) {
                return Ok(());
            }
        }

        self.keep_alive.reset();

        info!(
            "📹 Starting {} transcoder: {} {}",
            self.job.format,
            self.location,
            self.job.masked_command_line()
        );

        let mut process = Command::new(&self.location)
            .args(self.job.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GatewayError::Transcoder(format!("failed to start {}: {}", self.location, e))
            })?;

        self.spawn_stderr_reader(&mut process);
        *child = Some(process);
        Ok(())
    }

    fn stop_converting(&self) {
        if let Some(mut process) = self.child.lock().take() {
            debug!("Stopping {} transcoder", self.job.format);
            if let Err(e) = process.start_kill() {
                warn!("Failed to kill {} transcoder: {}", self.job.format, e);
            }
        }
    }

    fn check_keep_alive(&self) {
        match self.keep_alive.tick(self.is_alive()) {
            KeepAliveAction::Stop => self.stop_converting(),
            KeepAliveAction::Restart => {
                warn!("⚠️ {} transcoder stopped unexpectedly, restarting", self.job.format);
                if let Err(e) = self.start_converting() {
                    warn!("Restart failed: {}", e);
                }
            }
            KeepAliveAction::Nothing => {}
        }
    }

    fn set_keep_alive(&self, value: i32) {
        self.keep_alive.set(value);
    }

    fn is_alive(&self) -> bool {
        self.child
            .lock()
            .as_mut()
            .map(|process| matches!(process.try_wait(), Ok(None)))
            .unwrap_or(false)
    }
}

/// 创建 ffmpeg 转码进程的工厂
pub struct FfmpegFactory {
    location: String,
}

impl FfmpegFactory {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
        }
    }
}

impl TranscoderFactory for FfmpegFactory {
    fn create(
        &self,
        job: TranscodeJob,
        alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
    ) -> Arc<dyn Transcoder> {
        Arc::new(FfmpegTranscoder::new(&self.location, job, alarms))
    }
}
