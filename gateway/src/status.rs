use chrono::{DateTime, Utc};
use common::{CameraStatus, ChannelValue};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 状态与通道更新的接收方（持久化/通知子系统）
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, camera_id: &str, status: CameraStatus, message: &str);
    fn channel_updated(&self, camera_id: &str, channel: &str, value: ChannelValue);
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub status: CameraStatus,
    pub message: String,
    pub changed_at: DateTime<Utc>,
}

/// 内存中的通道状态表，记录每个摄像头每个通道的最新值
#[derive(Clone, Default)]
pub struct ChannelStateStore {
    statuses: Arc<DashMap<String, StatusRecord>>,
    channels: Arc<DashMap<String, BTreeMap<String, ChannelValue>>>,
}

impl ChannelStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, camera_id: &str) -> Option<StatusRecord> {
        self.statuses.get(camera_id).map(|s| s.value().clone())
    }

    pub fn channel(&self, camera_id: &str, channel: &str) -> Option<ChannelValue> {
        self.channels
            .get(camera_id)
            .and_then(|channels| channels.get(channel).cloned())
    }

    pub fn channels(&self, camera_id: &str) -> BTreeMap<String, ChannelValue> {
        self.channels
            .get(camera_id)
            .map(|channels| channels.value().clone())
            .unwrap_or_default()
    }
}

impl StatusSink for ChannelStateStore {
    fn status_changed(&self, camera_id: &str, status: CameraStatus, message: &str) {
        match status {
            CameraStatus::Online => info!("✅ Camera {} is ONLINE", camera_id),
            CameraStatus::Offline if message.is_empty() => info!("Camera {} is OFFLINE", camera_id),
            CameraStatus::Offline => warn!("⚠️ Camera {} is OFFLINE: {}", camera_id, message),
            CameraStatus::Connecting => debug!("Camera {} connecting", camera_id),
        }
        self.statuses.insert(
            camera_id.to_string(),
            StatusRecord {
                status,
                message: message.to_string(),
                changed_at: Utc::now(),
            },
        );
    }

    fn channel_updated(&self, camera_id: &str, channel: &str, value: ChannelValue) {
        match &value {
            ChannelValue::Image(bytes) => debug!("{}: {} updated ({} bytes)", camera_id, channel, bytes.len()),
            other => debug!("{}: {} = {:?}", camera_id, channel, other),
        }
        self.channels
            .entry(camera_id.to_string())
            .or_default()
            .insert(channel.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_latest_values() {
        let store = ChannelStateStore::new();
        store.status_changed("cam", CameraStatus::Online, "");
        store.channel_updated("cam", "motionAlarm", ChannelValue::OnOff(true));
        store.channel_updated("cam", "motionAlarm", ChannelValue::OnOff(false));

        assert_eq!(store.status("cam").unwrap().status, CameraStatus::Online);
        assert_eq!(store.channel("cam", "motionAlarm"), Some(ChannelValue::OnOff(false)));
        assert_eq!(store.channels("cam").len(), 1);
        assert!(store.channels("other").is_empty());
    }
}
