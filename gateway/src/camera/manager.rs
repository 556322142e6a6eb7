use super::session::{CameraSession, SessionDeps};
use crate::config::{CameraConfig, GroupConfig};
use crate::group::{GroupAggregator, OnlineRegistry};
use crate::status::ChannelStateStore;
use common::{GatewayError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 所有摄像头会话和分组
#[derive(Clone)]
pub struct CameraManager {
    cameras: Arc<DashMap<String, CameraSession>>,
    groups: Arc<DashMap<String, GroupAggregator>>,
    online: OnlineRegistry,
    store: ChannelStateStore,
}

impl CameraManager {
    pub fn new(online: OnlineRegistry, store: ChannelStateStore) -> Self {
        Self {
            cameras: Arc::new(DashMap::new()),
            groups: Arc::new(DashMap::new()),
            online,
            store,
        }
    }

    /// 注册摄像头（尚未初始化）
    pub fn add_camera(&self, config: CameraConfig, deps: SessionDeps) -> Result<CameraSession> {
        if self.cameras.contains_key(&config.id) {
            return Err(GatewayError::Configuration(format!(
                "duplicate camera id {}",
                config.id
            )));
        }
        let session = CameraSession::new(config, deps)?;
        info!("Registering camera: {}", session.id());
        self.cameras.insert(session.id().to_string(), session.clone());
        Ok(session)
    }

    /// 注册分组，分组从在线集合中取成员
    pub fn add_group(&self, config: GroupConfig, host: &str) -> Result<GroupAggregator> {
        if self.groups.contains_key(&config.id) {
            return Err(GatewayError::Configuration(format!(
                "duplicate group id {}",
                config.id
            )));
        }
        for member in &config.members {
            if !self.cameras.contains_key(member) {
                warn!("⚠️ Group {} lists unknown camera {}", config.id, member);
            }
        }
        let group = GroupAggregator::new(config, host, self.online.clone());
        info!("Registering group: {}", group.id());
        self.groups.insert(group.id().to_string(), group.clone());
        Ok(group)
    }

    /// 初始化所有摄像头并启动所有分组，单个失败只记录
    pub async fn start_all(&self) {
        for session in self.cameras() {
            if let Err(e) = session.initialize().await {
                warn!("⚠️ Camera {} failed to start: {}", session.id(), e);
            }
        }
        for group in self.groups() {
            if let Err(e) = group.start().await {
                warn!("⚠️ Group {} failed to start: {}", group.id(), e);
            }
        }
    }

    pub fn camera(&self, id: &str) -> Result<CameraSession> {
        self.cameras
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::CameraNotFound(id.to_string()))
    }

    pub fn group(&self, id: &str) -> Result<GroupAggregator> {
        self.groups
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::GroupNotFound(id.to_string()))
    }

    /// 按ID排序
    pub fn cameras(&self) -> Vec<CameraSession> {
        let mut cameras: Vec<CameraSession> = self.cameras.iter().map(|e| e.value().clone()).collect();
        cameras.sort_by(|a, b| a.id().cmp(b.id()));
        cameras
    }

    pub fn groups(&self) -> Vec<GroupAggregator> {
        let mut groups: Vec<GroupAggregator> = self.groups.iter().map(|e| e.value().clone()).collect();
        groups.sort_by(|a, b| a.id().cmp(b.id()));
        groups
    }

    pub fn online(&self) -> &OnlineRegistry {
        &self.online
    }

    pub fn store(&self) -> &ChannelStateStore {
        &self.store
    }

    /// 释放并重新初始化一个摄像头
    pub async fn restart_camera(&self, id: &str) -> Result<()> {
        let session = self.camera(id)?;
        session.dispose();
        session.initialize().await
    }

    pub fn dispose_all(&self) {
        for group in self.groups() {
            group.dispose();
        }
        for session in self.cameras() {
            session.dispose();
        }
        info!("All cameras and groups disposed");
    }
}
