//! 向下游消费者推送的三种 MJPEG 流

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// 广播通道容量，慢消费者落后太多时丢帧
const FRAME_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// `/ipcamera.mjpeg`，摄像头原生流或 ffmpeg 生成
    Mjpeg,
    /// `/snapshots.mjpeg`，每张轮询到的快照都是一帧
    Snapshots,
    /// `/autofps.mjpeg`，移动期间全速，否则每个轮询周期一帧
    AutoFps,
}

struct Channel {
    sender: broadcast::Sender<Bytes>,
    consumers: DashMap<Uuid, ()>,
}

impl Channel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(FRAME_BUFFER);
        Self {
            sender,
            consumers: DashMap::new(),
        }
    }
}

/// 每种流一个广播通道加一个消费者集合
pub struct StreamHub {
    mjpeg: Channel,
    snapshots: Channel,
    autofps: Channel,
}

impl Default for StreamHub {
    fn default() -> Self {
        Self {
            mjpeg: Channel::new(),
            snapshots: Channel::new(),
            autofps: Channel::new(),
        }
    }
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, kind: StreamKind) -> &Channel {
        match kind {
            StreamKind::Mjpeg => &self.mjpeg,
            StreamKind::Snapshots => &self.snapshots,
            StreamKind::AutoFps => &self.autofps,
        }
    }

    /// 加入消费者集合，返回消费者id、接收端以及它是否是第一个消费者
    pub fn join(&self, kind: StreamKind) -> (Uuid, broadcast::Receiver<Bytes>, bool) {
        let channel = self.channel(kind);
        let id = Uuid::new_v4();
        let receiver = channel.sender.subscribe();
        let first = channel.consumers.is_empty();
        channel.consumers.insert(id, ());
        (id, receiver, first)
    }

    /// 离开消费者集合，返回集合是否已经为空
    pub fn leave(&self, kind: StreamKind, id: Uuid) -> bool {
        let channel = self.channel(kind);
        channel.consumers.remove(&id).is_some() && channel.consumers.is_empty()
    }

    pub fn consumers(&self, kind: StreamKind) -> usize {
        self.channel(kind).consumers.len()
    }

    pub fn has_consumers(&self, kind: StreamKind) -> bool {
        !self.channel(kind).consumers.is_empty()
    }

    /// 推送已经封装好的数据，没有消费者时直接丢弃
    pub fn publish(&self, kind: StreamKind, data: Bytes) {
        let _ = self.channel(kind).sender.send(data);
    }

    pub fn clear(&self) {
        for kind in [StreamKind::Mjpeg, StreamKind::Snapshots, StreamKind::AutoFps] {
            self.channel(kind).consumers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_publish_leave() {
        let hub = StreamHub::new();
        let (first_id, mut first_rx, first) = hub.join(StreamKind::Snapshots);
        let (second_id, _second_rx, second) = hub.join(StreamKind::Snapshots);
        assert!(first);
        assert!(!second);
        assert_eq!(hub.consumers(StreamKind::Snapshots), 2);
        assert!(!hub.has_consumers(StreamKind::Mjpeg));

        hub.publish(StreamKind::Snapshots, Bytes::from_static(b"frame"));
        assert_eq!(first_rx.recv().await.unwrap(), Bytes::from_static(b"frame"));

        assert!(!hub.leave(StreamKind::Snapshots, first_id));
        assert!(hub.leave(StreamKind::Snapshots, second_id));
        // 重复离开不会再次报告为空
        assert!(!hub.leave(StreamKind::Snapshots, second_id));
    }
}
