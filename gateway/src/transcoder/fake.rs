//! 测试用的转码进程替身

use super::{AlarmSignal, KeepAlive, KeepAliveAction, TranscodeJob, Transcoder, TranscoderFactory};
use common::{Result, StreamFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) struct FakeTranscoder {
    pub job: TranscodeJob,
    alive: AtomicBool,
    keep_alive: KeepAlive,
    starts: Arc<Mutex<Vec<StreamFormat>>>,
    pub alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
}

impl Transcoder for FakeTranscoder {
    fn start_converting(&self) -> Result<()> {
        if self.alive.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.keep_alive.reset();
        self.starts.lock().push(self.job.format);
        Ok(())
    }

    fn stop_converting(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn check_keep_alive(&self) {
        match self.keep_alive.tick(self.is_alive()) {
            KeepAliveAction::Stop => self.stop_converting(),
            KeepAliveAction::Restart => {
                let _ = self.start_converting();
            }
            KeepAliveAction::Nothing => {}
        }
    }

    fn set_keep_alive(&self, value: i32) {
        self.keep_alive.set(value);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// 记录创建与启动次数的工厂
#[derive(Default)]
pub(crate) struct FakeFactory {
    jobs: Mutex<Vec<TranscodeJob>>,
    starts: Arc<Mutex<Vec<StreamFormat>>>,
    alarm_senders: Mutex<Vec<mpsc::UnboundedSender<AlarmSignal>>>,
}

impl FakeFactory {
    pub fn created(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn started(&self, format: StreamFormat) -> usize {
        self.starts.lock().iter().filter(|f| **f == format).count()
    }

    pub fn last_job(&self, format: StreamFormat) -> Option<TranscodeJob> {
        self.jobs.lock().iter().rev().find(|j| j.format == format).cloned()
    }

    /// 模拟报警转码进程输出的信号
    pub fn emit_alarm(&self, signal: AlarmSignal) {
        for sender in self.alarm_senders.lock().iter() {
            let _ = sender.send(signal);
        }
    }
}

impl TranscoderFactory for FakeFactory {
    fn create(
        &self,
        job: TranscodeJob,
        alarms: Option<mpsc::UnboundedSender<AlarmSignal>>,
    ) -> Arc<dyn Transcoder> {
        self.jobs.lock().push(job.clone());
        if let Some(sender) = &alarms {
            self.alarm_senders.lock().push(sender.clone());
        }
        Arc::new(FakeTranscoder {
            job,
            alive: AtomicBool::new(false),
            keep_alive: KeepAlive::default(),
            starts: self.starts.clone(),
            alarms,
        })
    }
}
