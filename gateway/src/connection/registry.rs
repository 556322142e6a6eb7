use common::auth::masked_uri;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// 一个出站连接的句柄，关闭即取消读取任务
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    path: String,
    cancel: CancellationToken,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub fn new(path: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.to_string(),
            cancel: CancellationToken::new(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!("Closing connection for {}", masked_uri(&self.path));
        }
        self.cancel.cancel();
    }

    /// 连接被关闭时完成
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    fn mark_finished(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// 请求路径对应的连接与最近一次文本回复
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub request_path: String,
    pub handle: ConnectionHandle,
    pub reply: String,
}

/// 连接登记表
///
/// 每个请求路径最多一个活动连接；新请求会替换并关闭同一路径上的旧连接。
/// `open` 记录所有仍在读取中的连接，用于连接过多时的清理。
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<String, ConnectionEntry>>,
    open: Arc<DashMap<Uuid, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为一次出站请求登记连接，在连接使用前调用
    pub fn record(&self, path: &str) -> ConnectionHandle {
        let handle = ConnectionHandle::new(path);
        self.open.insert(handle.id(), handle.clone());

        let previous = self.entries.insert(
            path.to_string(),
            ConnectionEntry {
                request_path: path.to_string(),
                handle: handle.clone(),
                reply: String::new(),
            },
        );
        if let Some(previous) = previous {
            if previous.handle.is_open() {
                debug!("Replacing open connection for {}", masked_uri(path));
                previous.handle.close();
            }
        }
        handle
    }

    /// 读取任务结束时调用
    pub fn finished(&self, handle: &ConnectionHandle) {
        handle.mark_finished();
        self.open.remove(&handle.id());
        // 没有回复内容的已关闭连接不再保留
        self.entries
            .remove_if(handle.path(), |_, entry| entry.handle.id() == handle.id() && entry.reply.is_empty());
    }

    pub fn store_reply(&self, path: &str, reply: &str) {
        if let Some(mut entry) = self.entries.get_mut(path) {
            entry.reply = reply.to_string();
        }
    }

    pub fn reply(&self, path: &str) -> Option<String> {
        self.entries.get(path).map(|entry| entry.reply.clone())
    }

    pub fn entry(&self, path: &str) -> Option<ConnectionEntry> {
        self.entries.get(path).map(|entry| entry.value().clone())
    }

    /// 路径上没有仍然打开的连接
    pub fn is_stopped(&self, path: &str) -> bool {
        self.entries
            .get(path)
            .map(|entry| !entry.handle.is_open())
            .unwrap_or(true)
    }

    /// 关闭某个路径上的连接
    pub fn close(&self, path: &str) {
        if let Some((_, entry)) = self.entries.remove(path) {
            entry.handle.close();
            self.open.remove(&entry.handle.id());
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.open.is_empty()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// 连接过多时的清理：关闭不在登记表中的连接，并移除已关闭且无回复的条目
    pub fn sweep(&self) -> usize {
        let tracked: std::collections::HashSet<Uuid> =
            self.entries.iter().map(|entry| entry.handle.id()).collect();

        let stale: Vec<ConnectionHandle> = self
            .open
            .iter()
            .filter(|handle| !tracked.contains(handle.key()))
            .map(|handle| handle.value().clone())
            .collect();
        for handle in &stale {
            handle.close();
            self.open.remove(&handle.id());
        }

        self.entries
            .retain(|_, entry| entry.handle.is_open() || !entry.reply.is_empty());

        stale.len()
    }

    /// 关闭全部连接并清空登记表
    pub fn close_all(&self) {
        for entry in self.entries.iter() {
            entry.handle.close();
        }
        for handle in self.open.iter() {
            handle.close();
        }
        self.entries.clear();
        self.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_request_replaces_and_closes_previous() {
        let registry = ConnectionRegistry::new();
        let first = registry.record("/snapshot.jpg");
        let second = registry.record("/snapshot.jpg");

        assert!(!first.is_open());
        assert!(second.is_open());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entry("/snapshot.jpg").unwrap().handle.id(), second.id());
    }

    #[test]
    fn test_reply_cleared_on_new_request() {
        let registry = ConnectionRegistry::new();
        registry.record("/status");
        registry.store_reply("/status", "ok");
        assert_eq!(registry.reply("/status").as_deref(), Some("ok"));

        registry.record("/status");
        assert_eq!(registry.reply("/status").as_deref(), Some(""));
    }

    #[test]
    fn test_finished_prunes_empty_entries() {
        let registry = ConnectionRegistry::new();
        let image = registry.record("/snapshot.jpg");
        let status = registry.record("/status");
        registry.store_reply("/status", "<ok/>");

        registry.finished(&image);
        registry.finished(&status);

        assert!(registry.entry("/snapshot.jpg").is_none());
        assert!(registry.is_stopped("/status"));
        assert_eq!(registry.reply("/status").as_deref(), Some("<ok/>"));
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn test_finished_old_handle_keeps_new_entry() {
        let registry = ConnectionRegistry::new();
        let old = registry.record("/events");
        let new = registry.record("/events");
        registry.finished(&old);
        assert!(!registry.is_stopped("/events"));
        assert_eq!(registry.entry("/events").unwrap().handle.id(), new.id());
    }

    #[test]
    fn test_sweep_closes_untracked_connections() {
        let registry = ConnectionRegistry::new();
        // 被替换的旧连接在读取任务结束前仍留在打开集合中
        let replaced = registry.record("/a");
        registry.record("/a");
        registry.record("/b");

        assert_eq!(registry.open_count(), 3);
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.open_count(), 2);
        assert!(!replaced.is_open());
    }

    #[test]
    fn test_close_all_empties_registry() {
        let registry = ConnectionRegistry::new();
        let a = registry.record("/a");
        let b = registry.record("/b");
        registry.close_all();
        assert!(registry.is_empty());
        assert!(!a.is_open());
        assert!(!b.is_open());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let registry = ConnectionRegistry::new();
        let handle = registry.record("/events");
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.closed().await });
        registry.close("/events");
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
