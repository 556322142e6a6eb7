//! 分组滚动播放列表
//!
//! 每个轮询周期把一个成员最新的若干分片追加到列表末尾（前面插入 discontinuity），
//! 超过 3 倍分片数时从头部裁剪并推进 media sequence。序号从不回退。

use std::collections::VecDeque;
use tracing::{debug, warn};

/// 成员播放列表中的一个分片
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration: f64,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    discontinuity: bool,
    duration: f64,
    uri: String,
}

/// 分组播放列表状态
#[derive(Debug, Clone)]
pub struct PlaylistState {
    media_sequence: u64,
    discontinuity_sequence: u64,
    entries: VecDeque<Entry>,
}

impl Default for PlaylistState {
    fn default() -> Self {
        Self {
            media_sequence: 1,
            discontinuity_sequence: 0,
            entries: VecDeque::new(),
        }
    }
}

/// 解析 m3u8 中的 `#EXTINF:<秒>,` 和随后的分片URI
pub fn parse_segments(m3u8: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut duration = None;

    for line in m3u8.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let value = rest.split(',').next().unwrap_or_default().trim();
            duration = value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0);
            if duration.is_none() {
                warn!("Ignoring malformed segment duration: {}", line);
            }
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else if let Some(duration) = duration.take() {
            segments.push(Segment {
                duration,
                uri: line.to_string(),
            });
        }
    }
    segments
}

/// 从末尾累加分片时长直到填满轮询窗口，返回需要的分片数
pub fn how_many_segments(segments: &[Segment], window_secs: f64) -> usize {
    let mut total = 0.0;
    let mut count = 0;
    for segment in segments.iter().rev() {
        if total >= window_secs && count > 0 {
            break;
        }
        total += segment.duration;
        count += 1;
    }
    if total < window_secs {
        debug!("Group did not find enough segments, lower the poll time if this continues");
    }
    count
}

/// 分组中使用的分片名，按成员序号区分不同摄像头的同名文件
pub fn member_segment_name(member_index: usize, uri: &str) -> String {
    let file = uri.rsplit('/').next().unwrap_or(uri);
    format!("cam{}_{}", member_index, file)
}

/// 从分组分片名还原成员序号和原文件名
pub fn split_member_segment(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("cam")?;
    let (index, file) = rest.split_once('_')?;
    let index = index.parse().ok()?;
    if file.is_empty() || file.contains('/') || file.contains("..") {
        return None;
    }
    Some((index, file))
}

impl PlaylistState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    pub fn discontinuity_sequence(&self) -> u64 {
        self.discontinuity_sequence
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// 追加一个成员的最后 `keep` 个分片，返回从头部裁剪掉的条目数
    pub fn append(&mut self, member_index: usize, segments: &[Segment], keep: usize) -> usize {
        if keep == 0 || segments.is_empty() {
            return 0;
        }
        let keep = keep.min(segments.len());
        let start = segments.len() - keep;

        for (i, segment) in segments[start..].iter().enumerate() {
            self.entries.push_back(Entry {
                discontinuity: i == 0,
                duration: segment.duration,
                uri: member_segment_name(member_index, &segment.uri),
            });
        }
        self.discontinuity_sequence += 1;

        let limit = keep * 3;
        let mut removed = 0;
        while self.entries.len() > limit {
            self.entries.pop_front();
            removed += 1;
        }
        self.media_sequence += removed as u64;
        removed
    }

    pub fn render(&self) -> String {
        let target = self
            .entries
            .iter()
            .map(|e| e.duration.ceil() as u64)
            .max()
            .unwrap_or(0)
            .max(5);

        let mut out = String::new();
        out.push_str("#EXTM3U\n#EXT-X-VERSION:6\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", target));
        out.push_str("#EXT-X-ALLOW-CACHE:NO\n");
        out.push_str(&format!(
            "#EXT-X-DISCONTINUITY-SEQUENCE:{}\n",
            self.discontinuity_sequence
        ));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));
        for entry in &self.entries {
            if entry.discontinuity {
                out.push_str("#EXT-X-DISCONTINUITY\n");
            }
            out.push_str(&format!("#EXTINF:{:.3},\n{}\n", entry.duration, entry.uri));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CAMERA_M3U8: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:40\n#EXTINF:1.000000,\nipcamera40.ts\n#EXTINF:1.000000,\nipcamera41.ts\n#EXTINF:1.000000,\nipcamera42.ts\n#EXTINF:1.000000,\nipcamera43.ts\n";

    fn segments(n: usize, duration: f64) -> Vec<Segment> {
        (0..n)
            .map(|i| Segment {
                duration,
                uri: format!("ipcamera{}.ts", i),
            })
            .collect()
    }

    #[test]
    fn test_parse_segments() {
        let parsed = parse_segments(CAMERA_M3U8);
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0].uri, "ipcamera40.ts");
        assert_eq!(parsed[3].duration, 1.0);
        assert!(parse_segments("").is_empty());
    }

    #[test]
    fn test_how_many_segments_fills_window() {
        let parsed = parse_segments(CAMERA_M3U8);
        assert_eq!(how_many_segments(&parsed, 2.0), 2);
        assert_eq!(how_many_segments(&parsed, 2.5), 3);
        // 不够填满窗口时使用全部分片
        assert_eq!(how_many_segments(&parsed, 10.0), 4);
        assert_eq!(how_many_segments(&[], 2.0), 0);
    }

    #[test]
    fn test_member_segment_names() {
        assert_eq!(member_segment_name(1, "ipcamera42.ts"), "cam1_ipcamera42.ts");
        assert_eq!(member_segment_name(0, "/tmp/a/ipcamera1.ts"), "cam0_ipcamera1.ts");
        assert_eq!(split_member_segment("cam1_ipcamera42.ts"), Some((1, "ipcamera42.ts")));
        assert_eq!(split_member_segment("cam1_../secret"), None);
        assert_eq!(split_member_segment("ipcamera.m3u8"), None);
    }

    #[test]
    fn test_two_cameras_hand_off() {
        let parsed = parse_segments(CAMERA_M3U8);
        let keep = how_many_segments(&parsed, 2.0);
        let mut playlist = PlaylistState::new();

        for cycle in 0..6 {
            playlist.append(cycle % 2, &parsed, keep);
        }

        let text = playlist.render();
        assert!(text.starts_with("#EXTM3U\n#EXT-X-VERSION:6\n#EXT-X-TARGETDURATION:5\n"));
        assert_eq!(playlist.entry_count(), 6);
        assert_eq!(text.matches("#EXT-X-DISCONTINUITY\n").count(), 3);
        assert_eq!(playlist.discontinuity_sequence(), 6);
        // 12 个条目裁剪掉 6 个
        assert_eq!(playlist.media_sequence(), 7);
        assert!(text.contains("cam0_ipcamera43.ts"));
        assert!(text.contains("cam1_ipcamera43.ts"));
    }

    proptest! {
        #[test]
        fn prop_sequences_monotonic_and_bounded(
            cycles in proptest::collection::vec((0usize..4, 0usize..6, 1usize..4), 1..40)
        ) {
            let mut playlist = PlaylistState::new();
            let mut media = playlist.media_sequence();
            let mut discontinuity = playlist.discontinuity_sequence();

            for (member, available, keep) in cycles {
                // available == 0 表示成员这一轮没有分片，被跳过
                let before = playlist.entry_count();
                let removed = playlist.append(member, &segments(available, 1.0), keep);

                prop_assert!(playlist.media_sequence() >= media);
                prop_assert!(playlist.discontinuity_sequence() >= discontinuity);
                prop_assert_eq!(playlist.media_sequence() - media, removed as u64);
                if available > 0 {
                    let kept = keep.min(available);
                    prop_assert!(playlist.entry_count() <= kept * 3);
                    prop_assert_eq!(before + kept - removed, playlist.entry_count());
                } else {
                    prop_assert_eq!(before, playlist.entry_count());
                }

                media = playlist.media_sequence();
                discontinuity = playlist.discontinuity_sequence();
            }
        }
    }
}
