use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 摄像头品牌
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBrand {
    /// 通用HTTP摄像头，URL全部由配置提供
    #[default]
    Generic,
    /// 只支持ONVIF的摄像头
    Onvif,
    Amcrest,
    Dahua,
    Doorbird,
    Foscam,
    Hikvision,
    Instar,
}

impl fmt::Display for CameraBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraBrand::Generic => "generic",
            CameraBrand::Onvif => "onvif",
            CameraBrand::Amcrest => "amcrest",
            CameraBrand::Dahua => "dahua",
            CameraBrand::Doorbird => "doorbird",
            CameraBrand::Foscam => "foscam",
            CameraBrand::Hikvision => "hikvision",
            CameraBrand::Instar => "instar",
        };
        f.write_str(name)
    }
}

/// 摄像头会话状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CameraStatus {
    #[default]
    Offline,
    Connecting,
    Online,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Offline => f.write_str("OFFLINE"),
            CameraStatus::Connecting => f.write_str("CONNECTING"),
            CameraStatus::Online => f.write_str("ONLINE"),
        }
    }
}

/// 转码输出格式，每种格式同一时刻最多一个进程
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    Hls,
    Gif,
    Record,
    RtspAlarms,
    Mjpeg,
    Snapshot,
}

impl StreamFormat {
    pub const ALL: [StreamFormat; 6] = [
        StreamFormat::Hls,
        StreamFormat::Gif,
        StreamFormat::Record,
        StreamFormat::RtspAlarms,
        StreamFormat::Mjpeg,
        StreamFormat::Snapshot,
    ];
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamFormat::Hls => "HLS",
            StreamFormat::Gif => "GIF",
            StreamFormat::Record => "RECORD",
            StreamFormat::RtspAlarms => "RTSP_ALARMS",
            StreamFormat::Mjpeg => "MJPEG",
            StreamFormat::Snapshot => "SNAPSHOT",
        };
        f.write_str(name)
    }
}

/// 通道值
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ChannelValue {
    OnOff(bool),
    Text(String),
    Number(f64),
    Image(Bytes),
}

impl ChannelValue {
    pub fn is_on(&self) -> bool {
        matches!(self, ChannelValue::OnOff(true))
    }
}

/// 通道名称
pub mod channels {
    pub const MOTION_ALARM: &str = "motionAlarm";
    pub const AUDIO_ALARM: &str = "audioAlarm";
    pub const PIR_ALARM: &str = "pirAlarm";
    pub const FFMPEG_MOTION_ALARM: &str = "ffmpegMotionAlarm";
    pub const EXTERNAL_MOTION: &str = "externalMotion";
    pub const EXTERNAL_ALARM_INPUT: &str = "externalAlarmInput";
    pub const LINE_CROSSING_ALARM: &str = "lineCrossingAlarm";
    pub const FIELD_DETECTION_ALARM: &str = "fieldDetectionAlarm";
    pub const FACE_DETECTED: &str = "faceDetected";
    pub const TAMPER_ALARM: &str = "tamperAlarm";
    pub const DOORBELL: &str = "doorbell";
    pub const ENABLE_MOTION_ALARM: &str = "enableMotionAlarm";
    pub const ENABLE_AUDIO_ALARM: &str = "enableAudioAlarm";
    pub const ENABLE_PIR_ALARM: &str = "enablePirAlarm";
    pub const ENABLE_LED: &str = "enableLed";
    pub const LAST_MOTION_TYPE: &str = "lastMotionType";
    pub const IMAGE: &str = "image";
    pub const START_STREAM: &str = "startStream";
    pub const RECORDING_GIF: &str = "recordingGif";
    pub const RECORDING_MP4: &str = "recordingMp4";
    pub const GIF_HISTORY: &str = "gifHistory";
    pub const MP4_HISTORY: &str = "mp4History";
    pub const GIF_HISTORY_LENGTH: &str = "gifHistoryLength";
    pub const MP4_HISTORY_LENGTH: &str = "mp4HistoryLength";
}
