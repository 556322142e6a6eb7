use bytes::Bytes;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 分组聚合器需要的摄像头视图
pub trait GroupMember: Send + Sync {
    fn id(&self) -> String;
    fn has_motion(&self) -> bool;
    /// ffmpeg 输出目录，其中有 `ipcamera.m3u8` 和分片文件
    fn hls_folder(&self) -> PathBuf;
    fn set_hls(&self, on: bool);
    fn current_snapshot(&self) -> Option<Bytes>;
}

/// 摄像头上线/下线的订阅方
pub trait MembershipListener: Send + Sync {
    fn member_online(&self, member: Arc<dyn GroupMember>);
    fn member_offline(&self, id: &str);
}

/// 当前在线的摄像头集合
///
/// 显式传给分组聚合器，而不是进程级全局表。会话只有在登记于此时才会被分组使用。
#[derive(Clone, Default)]
pub struct OnlineRegistry {
    cameras: Arc<DashMap<String, Arc<dyn GroupMember>>>,
    listeners: Arc<DashMap<Uuid, Arc<dyn MembershipListener>>>,
}

impl OnlineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, member: Arc<dyn GroupMember>) {
        let id = member.id();
        if self.cameras.insert(id.clone(), member.clone()).is_none() {
            debug!("Camera {} registered online", id);
        }
        for listener in self.listeners() {
            listener.member_online(member.clone());
        }
    }

    pub fn remove(&self, id: &str) {
        if self.cameras.remove(id).is_some() {
            debug!("Camera {} removed from online set", id);
            for listener in self.listeners() {
                listener.member_offline(id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn GroupMember>> {
        self.cameras.get(id).map(|m| m.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cameras.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// 订阅后立即收到当前所有在线成员
    pub fn subscribe(&self, listener: Arc<dyn MembershipListener>) -> Uuid {
        let id = Uuid::new_v4();
        self.listeners.insert(id, listener.clone());
        let members: Vec<Arc<dyn GroupMember>> =
            self.cameras.iter().map(|m| m.value().clone()).collect();
        for member in members {
            listener.member_online(member);
        }
        id
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.listeners.remove(&id);
    }

    // 回调前先复制，避免持有分片锁时重入
    fn listeners(&self) -> Vec<Arc<dyn MembershipListener>> {
        self.listeners.iter().map(|l| l.value().clone()).collect()
    }
}
