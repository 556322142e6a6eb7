//! 转码进程管理
//!
//! 每种输出格式（HLS、GIF、MP4录像、RTSP报警、MJPEG、快照）最多一个外部进程。
//! 会话只通过 start/stop/keep-alive 接口使用进程。

pub mod alarms;
pub mod ffmpeg;
#[cfg(test)]
pub(crate) mod fake;

pub use alarms::{AlarmParser, AlarmSignal};
pub use ffmpeg::FfmpegFactory;

use common::{Result, StreamFormat};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// 默认保活计数，每次检查减一，减到1时停止
pub const DEFAULT_KEEP_ALIVE: i32 = 8;
/// 永久保活
pub const KEEP_ALIVE_FOREVER: i32 = -1;

/// 一次转码任务的参数：`[输入选项] -i 输入 [输出选项] 输出`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub format: StreamFormat,
    pub input_options: String,
    pub input: String,
    pub output_options: String,
    pub output: String,
    pub user: String,
    pub password: String,
}

impl TranscodeJob {
    /// rtsp 输入地址中没有凭据时插入 `user:pass@`
    pub fn input_with_credentials(&self) -> String {
        let input = &self.input;
        if input.to_ascii_lowercase().starts_with("rtsp://")
            && !input.contains('@')
            && !self.user.is_empty()
        {
            format!("{}{}:{}@{}", &input[..7], self.user, self.password, &input[7..])
        } else {
            input.clone()
        }
    }

    pub fn arguments(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .input_options
            .split_whitespace()
            .map(str::to_string)
            .collect();
        args.push("-i".to_string());
        args.push(self.input_with_credentials());
        args.extend(self.output_options.split_whitespace().map(str::to_string));
        args.push(self.output.clone());
        args
    }

    /// 用于日志的命令行，密码被隐藏
    pub fn masked_command_line(&self) -> String {
        let line = self.arguments().join(" ");
        if self.password.is_empty() {
            line
        } else {
            line.replace(&self.password, "****")
        }
    }
}

/// 外部转码进程
pub trait Transcoder: Send + Sync {
    /// 进程已在运行时不做任何事
    fn start_converting(&self) -> Result<()>;
    /// 对已停止的进程调用也是安全的
    fn stop_converting(&self);
    fn check_keep_alive(&self);
    fn set_keep_alive(&self, value: i32);
    fn is_alive(&self) -> bool;
}

pub trait TranscoderFactory: Send + Sync {
    fn create(
        &self,
        job: TranscodeJob,
        alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
    ) -> Arc<dyn Transcoder>;
}

/// 保活检查的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    Stop,
    Restart,
    Nothing,
}

/// 保活计数
#[derive(Debug)]
pub struct KeepAlive(AtomicI32);

impl Default for KeepAlive {
    fn default() -> Self {
        Self(AtomicI32::new(DEFAULT_KEEP_ALIVE))
    }
}

impl KeepAlive {
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }

    /// 永久保活状态下忽略大于1的普通保活请求
    pub fn set(&self, value: i32) {
        if self.get() == KEEP_ALIVE_FOREVER && value > 1 {
            return;
        }
        self.0.store(value, Ordering::SeqCst);
    }

    /// 进程启动时重置，永久保活保持不变
    pub fn reset(&self) {
        if self.get() != KEEP_ALIVE_FOREVER {
            self.0.store(DEFAULT_KEEP_ALIVE, Ordering::SeqCst);
        }
    }

    pub fn tick(&self, alive: bool) -> KeepAliveAction {
        let value = self.get();
        let action = if value == 1 {
            KeepAliveAction::Stop
        } else if value <= KEEP_ALIVE_FOREVER && !alive {
            KeepAliveAction::Restart
        } else {
            KeepAliveAction::Nothing
        };
        if value > 0 {
            self.0.store(value - 1, Ordering::SeqCst);
        }
        action
    }
}

/// 按格式管理转码进程
#[derive(Clone)]
pub struct TranscoderManager {
    factory: Arc<dyn TranscoderFactory>,
    processes: Arc<DashMap<StreamFormat, Arc<dyn Transcoder>>>,
}

impl TranscoderManager {
    pub fn new(factory: Arc<dyn TranscoderFactory>) -> Self {
        Self {
            factory,
            processes: Arc::new(DashMap::new()),
        }
    }

    /// 启动某种格式的转码；已有运行中的进程时为空操作
    pub fn start(
        &self,
        job: TranscodeJob,
        alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
    ) -> Result<()> {
        let format = job.format;
        if let Some(existing) = self.get(format) {
            if existing.is_alive() {
                debug!("{} transcoder already running", format);
                return Ok(());
            }
            existing.stop_converting();
        }

        let transcoder = self.factory.create(job, alarms);
        self.processes.insert(format, transcoder.clone());
        transcoder.start_converting()
    }

    pub fn get(&self, format: StreamFormat) -> Option<Arc<dyn Transcoder>> {
        self.processes.get(&format).map(|t| t.value().clone())
    }

    pub fn stop(&self, format: StreamFormat) {
        if let Some((_, transcoder)) = self.processes.remove(&format) {
            transcoder.stop_converting();
        }
    }

    pub fn stop_all(&self) {
        for format in StreamFormat::ALL {
            self.stop(format);
        }
    }

    pub fn check_keep_alive(&self, format: StreamFormat) {
        if let Some(transcoder) = self.get(format) {
            transcoder.check_keep_alive();
        }
    }

    pub fn set_keep_alive(&self, format: StreamFormat, value: i32) {
        if let Some(transcoder) = self.get(format) {
            transcoder.set_keep_alive(value);
        }
    }

    pub fn is_running(&self, format: StreamFormat) -> bool {
        self.get(format).map(|t| t.is_alive()).unwrap_or(false)
    }

    pub fn running_formats(&self) -> Vec<StreamFormat> {
        StreamFormat::ALL
            .into_iter()
            .filter(|format| self.is_running(*format))
            .collect()
    }
}
