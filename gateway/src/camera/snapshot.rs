use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// 当前快照和预录缓冲
///
/// 网络读取路径写入、流消费路径读取，调用方必须持有会话中的锁。
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Option<Bytes>,
    preroll: VecDeque<Bytes>,
    capacity: usize,
}

impl SnapshotStore {
    /// `capacity` 为 0 时不保留预录帧
    pub fn new(capacity: usize) -> Self {
        Self {
            current: None,
            preroll: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn current(&self) -> Option<Bytes> {
        self.current.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 预录加录像时长决定缓冲大小，超出时丢弃最旧的帧
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.preroll.len() > capacity {
            self.preroll.pop_front();
        }
    }

    pub fn push(&mut self, jpeg: Bytes) {
        if self.capacity > 0 {
            self.preroll.push_back(jpeg.clone());
            while self.preroll.len() > self.capacity {
                self.preroll.pop_front();
            }
        }
        self.current = Some(jpeg);
    }

    pub fn preroll_len(&self) -> usize {
        self.preroll.len()
    }

    /// 预录帧的副本，按时间顺序
    pub fn preroll(&self) -> Vec<Bytes> {
        self.preroll.iter().cloned().collect()
    }

    /// 按时间顺序写出 `snapshot0.jpg`、`snapshot1.jpg`...，返回写出的文件
    ///
    /// 阻塞IO，在 `spawn_blocking` 中调用。
    pub fn write_preroll(frames: &[Bytes], folder: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(folder)?;
        let mut written = Vec::with_capacity(frames.len());
        for (count, jpeg) in frames.iter().enumerate() {
            let file = folder.join(format!("snapshot{}.jpg", count));
            std::fs::write(&file, jpeg)?;
            written.push(file);
        }
        Ok(written)
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.preroll.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preroll_is_bounded_fifo() {
        let mut store = SnapshotStore::new(3);
        for i in 0..5u8 {
            store.push(Bytes::from(vec![i]));
        }
        assert_eq!(store.preroll_len(), 3);
        assert_eq!(store.current(), Some(Bytes::from(vec![4u8])));

        let dir = tempfile::tempdir().unwrap();
        let files = SnapshotStore::write_preroll(&store.preroll(), dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(std::fs::read(dir.path().join("snapshot0.jpg")).unwrap(), vec![2u8]);
        assert_eq!(std::fs::read(dir.path().join("snapshot2.jpg")).unwrap(), vec![4u8]);
    }

    #[test]
    fn test_without_preroll_only_current_is_kept() {
        let mut store = SnapshotStore::new(0);
        store.push(Bytes::from_static(b"a"));
        store.push(Bytes::from_static(b"b"));
        assert_eq!(store.preroll_len(), 0);
        assert_eq!(store.current(), Some(Bytes::from_static(b"b")));

        store.set_capacity(1);
        store.push(Bytes::from_static(b"c"));
        store.set_capacity(0);
        assert_eq!(store.preroll_len(), 0);
        store.clear();
        assert!(store.current().is_none());
    }
}
