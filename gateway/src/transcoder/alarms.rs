/// ffmpeg 报警滤镜输出解析得到的信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmSignal {
    Motion(bool),
    Audio(bool),
}

/// 连续多少次场景变化后才认为有移动
const MOTION_DEBOUNCE: u32 = 4;

/// 解析 RTSP 报警转码进程的 stderr 行
///
/// `lavfi.` 行是 select/metadata 滤镜输出的场景变化，`speed=` 是每秒的进度行，
/// `silence_start`/`silence_end` 来自 silencedetect。
#[derive(Debug, Default)]
pub struct AlarmParser {
    motion_count: u32,
}

impl AlarmParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) -> Option<AlarmSignal> {
        if line.contains("lavfi.") {
            if self.motion_count == MOTION_DEBOUNCE {
                return Some(AlarmSignal::Motion(true));
            }
            self.motion_count += 1;
            None
        } else if line.contains("speed=") {
            if self.motion_count > 0 {
                self.motion_count = self.motion_count.saturating_sub(2);
                if self.motion_count == 0 {
                    return Some(AlarmSignal::Motion(false));
                }
            }
            None
        } else if line.contains("silence_start") {
            Some(AlarmSignal::Audio(false))
        } else if line.contains("silence_end") {
            Some(AlarmSignal::Audio(true))
        } else {
            None
        }
    }
}
