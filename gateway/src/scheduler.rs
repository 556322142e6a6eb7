use dashmap::DashMap;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// 一组具名的后台任务
///
/// 同名任务只保留一个，重新调度会中止旧任务。周期任务中的错误和panic
/// 在任务边界被捕获并记录，不会中断后续调度。
#[derive(Clone, Default)]
pub struct TaskSet {
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定间隔（上一轮结束后再等待 period）重复执行
    pub fn spawn_repeating<F, Fut>(&self, name: &str, initial_delay: Duration, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = common::Result<()>> + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                run_guarded(&task_name, job()).await;
                tokio::time::sleep(period).await;
            }
        });
        self.insert(name, handle);
    }

    /// 延迟后执行一次
    pub fn spawn_once<Fut>(&self, name: &str, delay: Duration, job: Fut)
    where
        Fut: Future<Output = common::Result<()>> + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            run_guarded(&task_name, job).await;
        });
        self.insert(name, handle);
    }

    fn insert(&self, name: &str, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.insert(name.to_string(), handle) {
            debug!("Replacing scheduled task {}", name);
            previous.abort();
        }
    }

    pub fn cancel(&self, name: &str) {
        if let Some((_, handle)) = self.tasks.remove(name) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let names: Vec<String> = self.tasks.iter().map(|t| t.key().clone()).collect();
        for name in names {
            self.cancel(&name);
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks
            .get(name)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// 仍在运行的任务数
    pub fn live_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.value().is_finished()).count()
    }
}

async fn run_guarded<Fut>(name: &str, job: Fut)
where
    Fut: Future<Output = common::Result<()>>,
{
    match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Task {} failed: {}", name, e),
        Err(_) => error!("Task {} panicked", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::GatewayError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_repeating_task_survives_errors() {
        let tasks = TaskSet::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        tasks.spawn_repeating("poll", Duration::ZERO, Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 {
                    return Err(GatewayError::Communication("timeout".into()));
                }
                if n == 3 {
                    panic!("poll cycle blew up");
                }
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(runs.load(Ordering::SeqCst) >= 5);
        assert!(tasks.is_scheduled("poll"));
        tasks.cancel_all();
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_task() {
        let tasks = TaskSet::new();
        tasks.spawn_repeating("poll", Duration::from_secs(60), Duration::from_secs(60), || async { Ok(()) });
        tasks.spawn_repeating("poll", Duration::from_secs(60), Duration::from_secs(60), || async { Ok(()) });
        assert_eq!(tasks.live_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_everything() {
        let tasks = TaskSet::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        tasks.spawn_repeating("a", Duration::ZERO, Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        tasks.spawn_once("b", Duration::from_secs(60), async { Ok(()) });
        assert_eq!(tasks.live_count(), 2);

        tasks.cancel_all();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped_at = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), stopped_at);
        assert_eq!(tasks.live_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_once_finishes() {
        let tasks = TaskSet::new();
        tasks.spawn_once("once", Duration::ZERO, async { Ok(()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tasks.is_scheduled("once"));
        assert_eq!(tasks.live_count(), 0);
    }
}
