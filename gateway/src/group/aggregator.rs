use super::online::{GroupMember, MembershipListener, OnlineRegistry};
use super::playlist::{how_many_segments, parse_segments, split_member_segment, PlaylistState};
use super::selector::select_next;
use crate::config::GroupConfig;
use crate::scheduler::TaskSet;
use crate::server::{self, ServerHandle};
use bytes::Bytes;
use common::Result;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 摄像头自己的HLS播放列表文件名
pub const CAMERA_PLAYLIST: &str = "ipcamera.m3u8";

/// 分组聚合器
///
/// 维护在线成员的顺序，每个轮询周期挑选一个成员，把它最新的HLS分片并入分组播放列表。
#[derive(Clone)]
pub struct GroupAggregator {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    config: GroupConfig,
    host: String,
    online: OnlineRegistry,
    order: RwLock<Vec<Arc<dyn GroupMember>>>,
    current: Mutex<Option<usize>>,
    playlist: Mutex<PlaylistState>,
    rendered: RwLock<String>,
    hls_on: AtomicBool,
    tasks: TaskSet,
    subscription: Mutex<Option<Uuid>>,
    server: Mutex<Option<ServerHandle>>,
}

impl GroupAggregator {
    pub fn new(config: GroupConfig, host: &str, online: OnlineRegistry) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                config,
                host: host.to_string(),
                online,
                order: RwLock::new(Vec::new()),
                current: Mutex::new(None),
                playlist: Mutex::new(PlaylistState::new()),
                rendered: RwLock::new(String::new()),
                hls_on: AtomicBool::new(false),
                tasks: TaskSet::new(),
                subscription: Mutex::new(None),
                server: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn config(&self) -> &GroupConfig {
        &self.inner.config
    }

    /// 订阅在线集合、启动服务器并开始轮询
    pub async fn start(&self) -> Result<()> {
        let config = &self.inner.config;

        if config.server_port > 0 {
            let cancel = CancellationToken::new();
            let app = server::group::router(self.clone(), cancel.clone());
            let handle =
                ServerHandle::bind(&self.inner.host, config.server_port, app, cancel, "Group").await?;
            *self.inner.server.lock() = Some(handle);
        }

        let subscription = self.inner.online.subscribe(Arc::new(self.clone()));
        *self.inner.subscription.lock() = Some(subscription);

        let period = Duration::from_millis(config.poll_time_ms.max(1000));
        let group = self.clone();
        self.inner
            .tasks
            .spawn_repeating("poll", period, period, move || {
                let group = group.clone();
                async move { group.poll_cycle().await }
            });

        info!("✓ Group {} started with {} configured members", config.id, config.members.len());
        Ok(())
    }

    /// 停止轮询和服务器，退出在线集合订阅
    pub fn dispose(&self) {
        self.inner.tasks.cancel_all();
        if let Some(id) = self.inner.subscription.lock().take() {
            self.inner.online.unsubscribe(id);
        }
        if let Some(server) = self.inner.server.lock().take() {
            server.stop();
        }
        self.inner.order.write().clear();
        *self.inner.current.lock() = None;
        debug!("Group {} disposed", self.inner.config.id);
    }

    /// 一个轮询周期：选择成员，HLS开启时并入它的分片
    pub async fn poll_cycle(&self) -> Result<()> {
        let Some(member) = self.select_member() else {
            return Ok(());
        };
        if self.is_hls_on() {
            self.create_playlist(member).await;
        }
        Ok(())
    }

    fn select_member(&self) -> Option<Arc<dyn GroupMember>> {
        let order = self.inner.order.read();
        let mut current = self.inner.current.lock();
        let selected = select_next(
            *current,
            order.len(),
            self.inner.config.motion_changes_order,
            |i| order[i].has_motion(),
        )?;
        *current = Some(selected);
        order.get(selected).cloned()
    }

    async fn create_playlist(&self, member: Arc<dyn GroupMember>) {
        let id = member.id();
        let Some(member_index) = self.member_index(&id) else {
            return;
        };

        let file = member.hls_folder().join(CAMERA_PLAYLIST);
        let m3u8 = match tokio::fs::read_to_string(&file).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Group {} skipping {}: {}", self.inner.config.id, id, e);
                return;
            }
        };

        let segments = parse_segments(&m3u8);
        if segments.is_empty() {
            debug!("Group {} skipping {}: no segments yet", self.inner.config.id, id);
            return;
        }
        let window = self.inner.config.poll_time_ms as f64 / 1000.0;
        let keep = how_many_segments(&segments, window);
        debug!("Using {} segments of {} to fill a poll period", keep, id);

        let text = {
            let mut playlist = self.inner.playlist.lock();
            playlist.append(member_index, &segments, keep);
            playlist.render()
        };
        *self.inner.rendered.write() = text;
    }

    /// 成员在配置中的位置，用于区分分片文件名
    pub fn member_index(&self, id: &str) -> Option<usize> {
        self.inner.config.members.iter().position(|m| m == id)
    }

    pub fn is_hls_on(&self) -> bool {
        self.inner.hls_on.load(Ordering::SeqCst)
    }

    /// 开启时让所有当前成员开始输出HLS
    pub fn set_hls(&self, on: bool) {
        self.inner.hls_on.store(on, Ordering::SeqCst);
        if on {
            for member in self.inner.order.read().iter() {
                member.set_hls(true);
            }
        }
        info!("Group {} HLS {}", self.inner.config.id, if on { "on" } else { "off" });
    }

    pub fn playlist(&self) -> String {
        self.inner.rendered.read().clone()
    }

    pub fn media_sequence(&self) -> u64 {
        self.inner.playlist.lock().media_sequence()
    }

    pub fn discontinuity_sequence(&self) -> u64 {
        self.inner.playlist.lock().discontinuity_sequence()
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.inner.order.read().iter().map(|m| m.id()).collect()
    }

    pub fn current_member(&self) -> Option<String> {
        let order = self.inner.order.read();
        let current = (*self.inner.current.lock())?;
        order.get(current).map(|m| m.id())
    }

    /// 当前播放成员的快照
    pub fn current_snapshot(&self) -> Option<Bytes> {
        let order = self.inner.order.read();
        let current = (*self.inner.current.lock()).unwrap_or(0);
        order.get(current).and_then(|m| m.current_snapshot())
    }

    /// 把 `cam{n}_文件名` 解析为成员目录中的文件
    pub fn segment_path(&self, name: &str) -> Option<PathBuf> {
        let (index, file) = split_member_segment(name)?;
        let id = self.inner.config.members.get(index)?;
        let member = self.inner.online.get(id)?;
        Some(member.hls_folder().join(file))
    }

    pub fn server_port(&self) -> Option<u16> {
        self.inner.server.lock().as_ref().map(|s| s.port())
    }

    #[cfg(test)]
    fn poll_tasks(&self) -> usize {
        self.inner.tasks.live_count()
    }
}

impl MembershipListener for GroupAggregator {
    fn member_online(&self, member: Arc<dyn GroupMember>) {
        let id = member.id();
        if self.member_index(&id).is_none() {
            return;
        }
        let mut order = self.inner.order.write();
        if order.iter().any(|m| m.id() == id) {
            return;
        }
        info!("Adding {} to group {}", id, self.inner.config.id);
        if self.is_hls_on() {
            member.set_hls(true);
        }
        order.push(member);
    }

    fn member_offline(&self, id: &str) {
        let mut order = self.inner.order.write();
        let before = order.len();
        order.retain(|m| m.id() != id);
        if order.len() != before {
            warn!("⚠️ Camera {} went offline and was removed from group {}", id, self.inner.config.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::online::fake::FakeMember;
    use super::*;
    use std::sync::atomic::Ordering;

    const SEGMENTS: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:1\n#EXTINF:1.000,\nipcamera1.ts\n#EXTINF:1.000,\nipcamera2.ts\n#EXTINF:1.000,\nipcamera3.ts\n";

    fn group(members: &[&str], poll_time_ms: u64) -> GroupConfig {
        GroupConfig {
            id: "yard".into(),
            name: "Yard".into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            poll_time_ms,
            motion_changes_order: true,
            server_port: 0,
        }
    }

    fn member_with_playlist(dir: &tempfile::TempDir, id: &str, m3u8: &str) -> Arc<FakeMember> {
        let folder = dir.path().join(id);
        std::fs::create_dir_all(&folder).unwrap();
        if !m3u8.is_empty() {
            std::fs::write(folder.join(CAMERA_PLAYLIST), m3u8).unwrap();
        }
        FakeMember::new(id, folder)
    }

    #[tokio::test]
    async fn test_order_follows_online_registry() {
        let online = OnlineRegistry::new();
        let aggregator = GroupAggregator::new(group(&["a", "b"], 2000), "127.0.0.1", online.clone());
        aggregator.start().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        online.insert(member_with_playlist(&dir, "b", ""));
        online.insert(member_with_playlist(&dir, "other", ""));
        online.insert(member_with_playlist(&dir, "a", ""));
        assert_eq!(aggregator.member_ids(), vec!["b", "a"]);

        online.remove("b");
        assert_eq!(aggregator.member_ids(), vec!["a"]);

        aggregator.dispose();
        assert_eq!(aggregator.poll_tasks(), 0);
        online.insert(member_with_playlist(&dir, "b", ""));
        assert!(aggregator.member_ids().is_empty());
    }

    #[tokio::test]
    async fn test_hand_off_between_two_cameras() {
        let dir = tempfile::tempdir().unwrap();
        let online = OnlineRegistry::new();
        let aggregator = GroupAggregator::new(group(&["a", "b"], 2000), "127.0.0.1", online.clone());
        aggregator.start().await.unwrap();

        let a = member_with_playlist(&dir, "a", SEGMENTS);
        let b = member_with_playlist(&dir, "b", SEGMENTS);
        online.insert(a.clone());
        online.insert(b.clone());
        aggregator.set_hls(true);
        assert_eq!(a.hls_on.load(Ordering::SeqCst), 1);

        for _ in 0..4 {
            aggregator.poll_cycle().await.unwrap();
        }

        let playlist = aggregator.playlist();
        assert_eq!(playlist.matches("#EXTINF:").count(), 6);
        assert_eq!(playlist.matches("#EXT-X-DISCONTINUITY\n").count(), 3);
        assert!(playlist.contains("cam0_ipcamera3.ts"));
        assert!(playlist.contains("cam1_ipcamera3.ts"));
        assert_eq!(aggregator.discontinuity_sequence(), 4);
        assert_eq!(aggregator.media_sequence(), 3);

        assert_eq!(
            aggregator.segment_path("cam1_ipcamera2.ts"),
            Some(dir.path().join("b").join("ipcamera2.ts"))
        );
        aggregator.dispose();
    }

    #[tokio::test]
    async fn test_member_without_segments_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let online = OnlineRegistry::new();
        let aggregator = GroupAggregator::new(group(&["a", "b"], 2000), "127.0.0.1", online.clone());
        aggregator.start().await.unwrap();
        online.insert(member_with_playlist(&dir, "a", SEGMENTS));
        online.insert(member_with_playlist(&dir, "b", ""));
        aggregator.set_hls(true);

        aggregator.poll_cycle().await.unwrap();
        aggregator.poll_cycle().await.unwrap();
        assert_eq!(aggregator.current_member().as_deref(), Some("b"));
        assert_eq!(aggregator.discontinuity_sequence(), 1);
        assert_eq!(aggregator.media_sequence(), 1);
        aggregator.dispose();
    }

    #[tokio::test]
    async fn test_motion_takes_priority() {
        let dir = tempfile::tempdir().unwrap();
        let online = OnlineRegistry::new();
        let aggregator =
            GroupAggregator::new(group(&["a", "b", "c"], 2000), "127.0.0.1", online.clone());
        aggregator.start().await.unwrap();
        let c = member_with_playlist(&dir, "c", "");
        online.insert(member_with_playlist(&dir, "a", ""));
        online.insert(member_with_playlist(&dir, "b", ""));
        online.insert(c.clone());
        c.motion.store(true, Ordering::SeqCst);

        for _ in 0..3 {
            aggregator.poll_cycle().await.unwrap();
            assert_eq!(aggregator.current_member().as_deref(), Some("c"));
        }
        aggregator.dispose();
    }
}
