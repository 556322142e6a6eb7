//! 品牌差异表
//!
//! 每个品牌只提供默认URL、保持打开的报警路径、每轮轮询附加动作和回复解析，
//! 会话控制逻辑本身与品牌无关。

use common::auth::masked_uri;
use common::channels;
use common::{CameraBrand, ChannelValue, GatewayError, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

/// 生成品牌URL所需的摄像头参数
#[derive(Debug, Clone, Copy)]
pub struct UrlContext<'a> {
    pub ip: &'a str,
    pub nvr_channel: u32,
    pub user: &'a str,
    pub password: &'a str,
}

/// 每轮轮询的附加动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// 报警流已断开时重新订阅
    RestartAlarmStream,
    Request(String),
    /// 清除上一轮由报警推送置位的通道
    ClearAlarms,
    ReconnectOnvif,
}

/// 从摄像头回复中解析出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum BrandEvent {
    Motion { channel: &'static str, active: bool },
    Audio(bool),
    Channel { channel: &'static str, value: ChannelValue },
}

pub trait BrandProfile: Send + Sync {
    fn brand(&self) -> CameraBrand;

    fn default_snapshot_path(&self, _ctx: &UrlContext) -> String {
        String::new()
    }

    fn default_mjpeg_path(&self, _ctx: &UrlContext) -> String {
        String::new()
    }

    fn default_ffmpeg_input(&self, _ctx: &UrlContext) -> String {
        String::new()
    }

    /// 永不因空闲而关闭的报警/事件订阅路径
    fn keep_open_path(&self, _ctx: &UrlContext) -> Option<String> {
        None
    }

    /// 每轮轮询轮流发送其中一个
    fn low_priority_requests(&self, _ctx: &UrlContext) -> Vec<String> {
        Vec::new()
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        Vec::new()
    }

    fn parse_reply(&self, _path: &str, _reply: &str) -> Vec<BrandEvent> {
        Vec::new()
    }
}

pub fn profile_for(brand: CameraBrand) -> &'static dyn BrandProfile {
    match brand {
        CameraBrand::Generic => &Generic,
        CameraBrand::Onvif => &Onvif,
        CameraBrand::Amcrest => &Amcrest,
        CameraBrand::Dahua => &Dahua,
        CameraBrand::Doorbird => &Doorbird,
        CameraBrand::Foscam => &Foscam,
        CameraBrand::Hikvision => &Hikvision,
        CameraBrand::Instar => &Instar,
    }
}

/// 把完整URL缩短为请求路径：`/path?query`，非默认端口时为 `:port/path?query`
///
/// 空串和 `ffmpeg` 原样返回，已经是路径形式的也原样返回。
pub fn correct_url_format(long_url: &str) -> Result<String> {
    let long_url = long_url.trim();
    if long_url.is_empty() || long_url == "ffmpeg" || long_url.starts_with('/') {
        return Ok(long_url.to_string());
    }
    if long_url.starts_with(':') && long_url.contains('/') {
        return Ok(long_url.to_string());
    }

    let url = Url::parse(long_url).map_err(|e| {
        GatewayError::Configuration(format!("invalid camera url {}: {}", masked_uri(long_url), e))
    })?;
    let mut short = match url.port() {
        Some(port) => format!(":{}{}", port, url.path()),
        None => url.path().to_string(),
    };
    if let Some(query) = url.query() {
        short.push('?');
        short.push_str(query);
    }
    Ok(short)
}

fn motion(channel: &'static str, active: bool) -> BrandEvent {
    BrandEvent::Motion { channel, active }
}

fn switch(channel: &'static str, on: bool) -> BrandEvent {
    BrandEvent::Channel {
        channel,
        value: ChannelValue::OnOff(on),
    }
}

/// 取出 `<tag>value</tag>` 中的值
fn xml_value<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim())
}

pub struct Generic;

impl BrandProfile for Generic {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Generic
    }
}

pub struct Onvif;

impl BrandProfile for Onvif {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Onvif
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        vec![PollAction::ReconnectOnvif]
    }
}

// ========== Dahua / Amcrest ==========

fn dahua_snapshot(ctx: &UrlContext) -> String {
    format!("/cgi-bin/snapshot.cgi?channel={}", ctx.nvr_channel)
}

fn dahua_mjpeg(ctx: &UrlContext) -> String {
    format!("/cgi-bin/mjpg/video.cgi?channel={}&subtype=1", ctx.nvr_channel)
}

fn dahua_rtsp(ctx: &UrlContext) -> String {
    format!(
        "rtsp://{}:554/cam/realmonitor?channel={}&subtype=0",
        ctx.ip, ctx.nvr_channel
    )
}

/// 解析 `Code=VideoMotion;action=Start;index=0` 形式的事件
fn parse_dahua_events(reply: &str) -> Vec<BrandEvent> {
    let mut events = Vec::new();
    for part in reply.split("Code=").skip(1) {
        let code = part.split(';').next().unwrap_or_default().trim();
        let Some(action) = part
            .split(';')
            .find_map(|field| field.trim().strip_prefix("action="))
        else {
            continue;
        };
        let active = match action.split_whitespace().next().unwrap_or_default() {
            "Start" | "Pulse" => true,
            "Stop" => false,
            _ => continue,
        };

        let event = match code {
            "VideoMotion" => motion(channels::MOTION_ALARM, active),
            "AudioMutation" => BrandEvent::Audio(active),
            "CrossLineDetection" => motion(channels::LINE_CROSSING_ALARM, active),
            "CrossRegionDetection" => motion(channels::FIELD_DETECTION_ALARM, active),
            "FaceDetection" => motion(channels::FACE_DETECTED, active),
            "VideoBlind" => switch(channels::TAMPER_ALARM, active),
            "AlarmLocal" => switch(channels::EXTERNAL_ALARM_INPUT, active),
            _ => continue,
        };
        events.push(event);
    }
    events
}

pub struct Dahua;

impl BrandProfile for Dahua {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Dahua
    }

    fn default_snapshot_path(&self, ctx: &UrlContext) -> String {
        dahua_snapshot(ctx)
    }

    fn default_mjpeg_path(&self, ctx: &UrlContext) -> String {
        dahua_mjpeg(ctx)
    }

    fn default_ffmpeg_input(&self, ctx: &UrlContext) -> String {
        dahua_rtsp(ctx)
    }

    fn keep_open_path(&self, _ctx: &UrlContext) -> Option<String> {
        Some("/cgi-bin/eventManager.cgi?action=attach&codes=[All]".to_string())
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        vec![PollAction::RestartAlarmStream]
    }

    fn parse_reply(&self, _path: &str, reply: &str) -> Vec<BrandEvent> {
        parse_dahua_events(reply)
    }
}

const AMCREST_MOTION_INDEX: &str = "/cgi-bin/eventManager.cgi?action=getEventIndexes&code=VideoMotion";
const AMCREST_AUDIO_INDEX: &str = "/cgi-bin/eventManager.cgi?action=getEventIndexes&code=AudioMutation";

pub struct Amcrest;

impl BrandProfile for Amcrest {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Amcrest
    }

    fn default_snapshot_path(&self, ctx: &UrlContext) -> String {
        dahua_snapshot(ctx)
    }

    fn default_mjpeg_path(&self, ctx: &UrlContext) -> String {
        dahua_mjpeg(ctx)
    }

    fn default_ffmpeg_input(&self, ctx: &UrlContext) -> String {
        dahua_rtsp(ctx)
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        vec![
            PollAction::Request(AMCREST_MOTION_INDEX.to_string()),
            PollAction::Request(AMCREST_AUDIO_INDEX.to_string()),
        ]
    }

    /// 事件索引回复中出现 `channels[0]=0` 表示事件正在发生
    fn parse_reply(&self, path: &str, reply: &str) -> Vec<BrandEvent> {
        let active = if reply.contains("channels[") {
            true
        } else if reply.contains("Error") {
            false
        } else {
            return parse_dahua_events(reply);
        };

        if path == AMCREST_MOTION_INDEX {
            vec![motion(channels::MOTION_ALARM, active)]
        } else if path == AMCREST_AUDIO_INDEX {
            vec![BrandEvent::Audio(active)]
        } else {
            Vec::new()
        }
    }
}

// ========== Doorbird ==========

pub struct Doorbird;

impl BrandProfile for Doorbird {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Doorbird
    }

    fn default_snapshot_path(&self, _ctx: &UrlContext) -> String {
        "/bha-api/image.cgi".to_string()
    }

    fn default_mjpeg_path(&self, _ctx: &UrlContext) -> String {
        "/bha-api/video.cgi".to_string()
    }

    fn default_ffmpeg_input(&self, ctx: &UrlContext) -> String {
        format!("rtsp://{}:8557/mpeg/media.amp", ctx.ip)
    }

    fn keep_open_path(&self, _ctx: &UrlContext) -> Option<String> {
        Some("/bha-api/monitor.cgi?ring=doorbell,motionsensor".to_string())
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        vec![PollAction::RestartAlarmStream]
    }

    fn parse_reply(&self, _path: &str, reply: &str) -> Vec<BrandEvent> {
        let mut events = Vec::new();
        if reply.contains("doorbell:H") {
            events.push(switch(channels::DOORBELL, true));
        } else if reply.contains("doorbell:L") {
            events.push(switch(channels::DOORBELL, false));
        }
        if reply.contains("motionsensor:H") {
            events.push(motion(channels::MOTION_ALARM, true));
        } else if reply.contains("motionsensor:L") {
            events.push(motion(channels::MOTION_ALARM, false));
        }
        events
    }
}

// ========== Foscam ==========

fn foscam_credentials(ctx: &UrlContext) -> (String, String) {
    (
        utf8_percent_encode(ctx.user, NON_ALPHANUMERIC).to_string(),
        utf8_percent_encode(ctx.password, NON_ALPHANUMERIC).to_string(),
    )
}

pub struct Foscam;

impl BrandProfile for Foscam {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Foscam
    }

    fn default_snapshot_path(&self, ctx: &UrlContext) -> String {
        let (user, password) = foscam_credentials(ctx);
        format!("/cgi-bin/CGIProxy.fcgi?usr={}&pwd={}&cmd=snapPicture2", user, password)
    }

    fn default_mjpeg_path(&self, ctx: &UrlContext) -> String {
        let (user, password) = foscam_credentials(ctx);
        format!("/cgi-bin/CGIStream.cgi?cmd=GetMJStream&usr={}&pwd={}", user, password)
    }

    fn default_ffmpeg_input(&self, ctx: &UrlContext) -> String {
        format!("rtsp://{}:88/videoMain", ctx.ip)
    }

    fn low_priority_requests(&self, ctx: &UrlContext) -> Vec<String> {
        let (user, password) = foscam_credentials(ctx);
        vec![format!(
            "/cgi-bin/CGIProxy.fcgi?cmd=getDevState&usr={}&pwd={}",
            user, password
        )]
    }

    /// 0 表示未启用，1 启用但未触发，2 正在报警
    fn parse_reply(&self, _path: &str, reply: &str) -> Vec<BrandEvent> {
        let mut events = Vec::new();
        if let Some(state) = xml_value(reply, "motionDetectAlarm") {
            match state {
                "0" => {
                    events.push(switch(channels::ENABLE_MOTION_ALARM, false));
                    events.push(motion(channels::MOTION_ALARM, false));
                }
                "1" => {
                    events.push(switch(channels::ENABLE_MOTION_ALARM, true));
                    events.push(motion(channels::MOTION_ALARM, false));
                }
                "2" => {
                    events.push(switch(channels::ENABLE_MOTION_ALARM, true));
                    events.push(motion(channels::MOTION_ALARM, true));
                }
                _ => {}
            }
        }
        if let Some(state) = xml_value(reply, "soundAlarm") {
            match state {
                "0" => {
                    events.push(switch(channels::ENABLE_AUDIO_ALARM, false));
                    events.push(BrandEvent::Audio(false));
                }
                "1" => {
                    events.push(switch(channels::ENABLE_AUDIO_ALARM, true));
                    events.push(BrandEvent::Audio(false));
                }
                "2" => {
                    events.push(switch(channels::ENABLE_AUDIO_ALARM, true));
                    events.push(BrandEvent::Audio(true));
                }
                _ => {}
            }
        }
        events
    }
}

// ========== Hikvision ==========

pub struct Hikvision;

impl BrandProfile for Hikvision {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Hikvision
    }

    fn default_snapshot_path(&self, ctx: &UrlContext) -> String {
        format!("/ISAPI/Streaming/channels/{}01/picture", ctx.nvr_channel)
    }

    fn default_mjpeg_path(&self, ctx: &UrlContext) -> String {
        format!("/ISAPI/Streaming/channels/{}02/httppreview", ctx.nvr_channel)
    }

    fn default_ffmpeg_input(&self, ctx: &UrlContext) -> String {
        format!("rtsp://{}:554/ISAPI/Streaming/channels/{}01", ctx.ip, ctx.nvr_channel)
    }

    fn keep_open_path(&self, _ctx: &UrlContext) -> Option<String> {
        Some("/ISAPI/Event/notification/alertStream".to_string())
    }

    fn low_priority_requests(&self, ctx: &UrlContext) -> Vec<String> {
        vec![format!("/ISAPI/System/IO/inputs/{}/status", ctx.nvr_channel)]
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        vec![PollAction::RestartAlarmStream]
    }

    fn parse_reply(&self, _path: &str, reply: &str) -> Vec<BrandEvent> {
        let mut events = Vec::new();

        if let Some(state) = xml_value(reply, "ioState") {
            events.push(switch(channels::EXTERNAL_ALARM_INPUT, state == "active"));
        }

        for alert in reply.split("</EventNotificationAlert>") {
            let Some(event_type) = xml_value(alert, "eventType") else {
                continue;
            };
            let active = xml_value(alert, "eventState") == Some("active");
            let event = match event_type.to_ascii_lowercase().as_str() {
                "vmd" => motion(channels::MOTION_ALARM, active),
                "linedetection" => motion(channels::LINE_CROSSING_ALARM, active),
                "fielddetection" => motion(channels::FIELD_DETECTION_ALARM, active),
                "facedetection" => motion(channels::FACE_DETECTED, active),
                "audioexception" => BrandEvent::Audio(active),
                "shelteralarm" | "tamperdetection" => switch(channels::TAMPER_ALARM, active),
                "io" => switch(channels::EXTERNAL_ALARM_INPUT, active),
                // videoloss inactive 是摄像头的心跳
                _ => continue,
            };
            events.push(event);
        }
        events
    }
}

// ========== Instar ==========

/// 取出 `var name="value";` 中的值
fn instar_var<'a>(reply: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("var {}=\"", name);
    let start = reply.find(&marker)? + marker.len();
    let end = reply[start..].find('"')? + start;
    Some(&reply[start..end])
}

/// Instar 报警服务器推送 `active=N` 时对应的事件
pub fn instar_alarm_events(active: u32) -> Vec<BrandEvent> {
    match active {
        1..=4 | 7..=10 => vec![motion(channels::MOTION_ALARM, true)],
        5 => vec![motion(channels::PIR_ALARM, true)],
        6 => vec![BrandEvent::Audio(true)],
        _ => Vec::new(),
    }
}

pub struct Instar;

impl BrandProfile for Instar {
    fn brand(&self) -> CameraBrand {
        CameraBrand::Instar
    }

    fn default_snapshot_path(&self, _ctx: &UrlContext) -> String {
        "/tmpfs/snap.jpg".to_string()
    }

    fn default_mjpeg_path(&self, _ctx: &UrlContext) -> String {
        "/mjpegstream.cgi?-chn=12".to_string()
    }

    fn default_ffmpeg_input(&self, ctx: &UrlContext) -> String {
        format!("rtsp://{}:554/12", ctx.ip)
    }

    fn low_priority_requests(&self, _ctx: &UrlContext) -> Vec<String> {
        vec![
            "/cgi-bin/hi3510/param.cgi?cmd=getinfrared".to_string(),
            "/cgi-bin/hi3510/param.cgi?cmd=getmdattr".to_string(),
            "/cgi-bin/hi3510/param.cgi?cmd=getaudioalarmattr".to_string(),
            "/cgi-bin/hi3510/param.cgi?cmd=getpirattr".to_string(),
        ]
    }

    fn poll_actions(&self, _ctx: &UrlContext) -> Vec<PollAction> {
        vec![PollAction::ClearAlarms]
    }

    fn parse_reply(&self, _path: &str, reply: &str) -> Vec<BrandEvent> {
        let mut events = Vec::new();
        if let Some(value) = instar_var(reply, "infraredstat") {
            events.push(switch(channels::ENABLE_LED, value == "auto"));
        }
        if let Some(value) = instar_var(reply, "m1_enable") {
            events.push(switch(channels::ENABLE_MOTION_ALARM, value == "1"));
        }
        if let Some(value) = instar_var(reply, "aa_enable") {
            events.push(switch(channels::ENABLE_AUDIO_ALARM, value == "1"));
        }
        if let Some(value) = instar_var(reply, "pir_enable") {
            events.push(switch(channels::ENABLE_PIR_ALARM, value == "1"));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> UrlContext<'static> {
        UrlContext {
            ip: "192.168.1.20",
            nvr_channel: 2,
            user: "admin",
            password: "p@ss word",
        }
    }

    #[test]
    fn test_default_paths() {
        let ctx = ctx();
        assert_eq!(
            profile_for(CameraBrand::Hikvision).default_snapshot_path(&ctx),
            "/ISAPI/Streaming/channels/201/picture"
        );
        assert_eq!(
            profile_for(CameraBrand::Hikvision).default_mjpeg_path(&ctx),
            "/ISAPI/Streaming/channels/202/httppreview"
        );
        assert_eq!(
            profile_for(CameraBrand::Amcrest).default_mjpeg_path(&ctx),
            "/cgi-bin/mjpg/video.cgi?channel=2&subtype=1"
        );
        assert_eq!(profile_for(CameraBrand::Doorbird).default_snapshot_path(&ctx), "/bha-api/image.cgi");
        assert_eq!(profile_for(CameraBrand::Instar).default_snapshot_path(&ctx), "/tmpfs/snap.jpg");
        assert_eq!(profile_for(CameraBrand::Generic).default_snapshot_path(&ctx), "");
    }

    #[test]
    fn test_correct_url_format() {
        assert_eq!(correct_url_format("").unwrap(), "");
        assert_eq!(correct_url_format("ffmpeg").unwrap(), "ffmpeg");
        assert_eq!(
            correct_url_format("http://192.168.1.2/cgi-bin/snapshot.cgi?channel=1").unwrap(),
            "/cgi-bin/snapshot.cgi?channel=1"
        );
        assert_eq!(
            correct_url_format("http://192.168.1.2:8080/snap.jpg").unwrap(),
            ":8080/snap.jpg"
        );
        assert_eq!(correct_url_format("/tmpfs/snap.jpg").unwrap(), "/tmpfs/snap.jpg");
        let err = correct_url_format("not a url").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_foscam_encodes_credentials() {
        let path = profile_for(CameraBrand::Foscam).default_snapshot_path(&ctx());
        assert_eq!(
            path,
            "/cgi-bin/CGIProxy.fcgi?usr=admin&pwd=p%40ss%20word&cmd=snapPicture2"
        );
    }

    #[test]
    fn test_foscam_paths_are_masked_for_logs() {
        let profile = profile_for(CameraBrand::Foscam);
        for path in [profile.default_snapshot_path(&ctx()), profile.default_mjpeg_path(&ctx())] {
            let masked = masked_uri(&path);
            assert!(!masked.contains("p%40ss"), "{}", masked);
            assert!(!masked.contains("admin"), "{}", masked);
            assert!(masked.contains("pwd=****"));
        }
    }

    #[test]
    fn test_keep_open_paths() {
        let ctx = ctx();
        assert_eq!(
            profile_for(CameraBrand::Dahua).keep_open_path(&ctx).as_deref(),
            Some("/cgi-bin/eventManager.cgi?action=attach&codes=[All]")
        );
        assert!(profile_for(CameraBrand::Amcrest).keep_open_path(&ctx).is_none());
        assert!(profile_for(CameraBrand::Generic).keep_open_path(&ctx).is_none());
    }

    #[test]
    fn test_dahua_event_stream() {
        let chunk = "--myboundary\r\nContent-Type: text/plain\r\n\r\nCode=VideoMotion;action=Start;index=0\r\n\r\n--myboundary\r\n\r\nCode=AudioMutation;action=Stop;index=0\r\n";
        let events = Dahua.parse_reply("/cgi-bin/eventManager.cgi", chunk);
        assert_eq!(
            events,
            vec![motion(channels::MOTION_ALARM, true), BrandEvent::Audio(false)]
        );
    }

    #[test]
    fn test_amcrest_event_indexes() {
        assert_eq!(
            Amcrest.parse_reply(AMCREST_MOTION_INDEX, "channels[0]=0\r\n"),
            vec![motion(channels::MOTION_ALARM, true)]
        );
        assert_eq!(
            Amcrest.parse_reply(AMCREST_AUDIO_INDEX, "Error\r\nBad Request!"),
            vec![BrandEvent::Audio(false)]
        );
    }

    #[test]
    fn test_hikvision_alert_stream() {
        let alert = "<EventNotificationAlert version=\"2.0\"><eventType>VMD</eventType><eventState>active</eventState></EventNotificationAlert>";
        assert_eq!(
            Hikvision.parse_reply("/ISAPI/Event/notification/alertStream", alert),
            vec![motion(channels::MOTION_ALARM, true)]
        );
        let heartbeat = "<EventNotificationAlert><eventType>videoloss</eventType><eventState>inactive</eventState></EventNotificationAlert>";
        assert!(Hikvision.parse_reply("/", heartbeat).is_empty());
        assert_eq!(
            Hikvision.parse_reply("/ISAPI/System/IO/inputs/1/status", "<IOPortStatus><ioState>inactive</ioState></IOPortStatus>"),
            vec![switch(channels::EXTERNAL_ALARM_INPUT, false)]
        );
    }

    #[test]
    fn test_foscam_dev_state() {
        let reply = "<CGI_Result><result>0</result><motionDetectAlarm>2</motionDetectAlarm><soundAlarm>1</soundAlarm></CGI_Result>";
        let events = Foscam.parse_reply("/cgi-bin/CGIProxy.fcgi", reply);
        assert!(events.contains(&motion(channels::MOTION_ALARM, true)));
        assert!(events.contains(&BrandEvent::Audio(false)));
    }

    #[test]
    fn test_doorbird_monitor() {
        assert_eq!(
            Doorbird.parse_reply("/bha-api/monitor.cgi", "doorbell:H\r\n"),
            vec![switch(channels::DOORBELL, true)]
        );
        assert_eq!(
            Doorbird.parse_reply("/bha-api/monitor.cgi", "motionsensor:L"),
            vec![motion(channels::MOTION_ALARM, false)]
        );
    }

    #[test]
    fn test_instar_replies_and_alarm_server() {
        let events = Instar.parse_reply("/param.cgi", "var m1_enable=\"1\";\r\nvar m1_x=\"0\";");
        assert_eq!(events, vec![switch(channels::ENABLE_MOTION_ALARM, true)]);
        assert_eq!(instar_alarm_events(5), vec![motion(channels::PIR_ALARM, true)]);
        assert_eq!(instar_alarm_events(6), vec![BrandEvent::Audio(true)]);
        assert_eq!(instar_alarm_events(8), vec![motion(channels::MOTION_ALARM, true)]);
        assert!(instar_alarm_events(0).is_empty());
    }
}
