//! 各种输出格式对应的 ffmpeg 任务参数

use crate::config::CameraConfig;
use crate::transcoder::TranscodeJob;
use common::{GatewayError, Result, StreamFormat};

const QUIET: &str = "-hide_banner -loglevel warning";
const DEFAULT_HLS_OPTIONS: &str =
    "-vcodec copy -acodec aac -hls_flags delete_segments -hls_time 2 -hls_list_size 4";
const DEFAULT_MJPEG_OPTIONS: &str = "-q:v 5 -r 2 -vf scale=640:-2 -update 1";
const DEFAULT_SNAPSHOT_OPTIONS: &str = "-an -vsync vfr -q:v 2 -update 1";
const DEFAULT_GIF_OPTIONS: &str = "-r 2 -filter_complex scale=-2:360:flags=lanczos,setpts=0.5*PTS,split[o1][o2];[o1]palettegen[p];[o2]fifo[o3];[o3][p]paletteuse";
const DEFAULT_MP4_OPTIONS: &str = "-c:v copy -c:a copy";

/// 一次输出请求
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRequest {
    Hls,
    /// `preroll_frames` 大于0时从预录快照文件生成
    Gif { name: String, secs: u32, preroll_frames: u32 },
    Record { name: String, secs: u32 },
    /// 场景变化阈值（0..1）和静音阈值（dB）
    RtspAlarms {
        motion_threshold: Option<f64>,
        audio_threshold: Option<u32>,
    },
    Mjpeg,
    Snapshot,
}

impl OutputRequest {
    pub fn format(&self) -> StreamFormat {
        match self {
            OutputRequest::Hls => StreamFormat::Hls,
            OutputRequest::Gif { .. } => StreamFormat::Gif,
            OutputRequest::Record { .. } => StreamFormat::Record,
            OutputRequest::RtspAlarms { .. } => StreamFormat::RtspAlarms,
            OutputRequest::Mjpeg => StreamFormat::Mjpeg,
            OutputRequest::Snapshot => StreamFormat::Snapshot,
        }
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 根据摄像头配置生成转码任务
pub fn build_job(config: &CameraConfig, rtsp_uri: &str, request: &OutputRequest) -> Result<TranscodeJob> {
    let from_preroll = matches!(request, OutputRequest::Gif { preroll_frames, .. } if *preroll_frames > 0);
    if rtsp_uri.is_empty() && !from_preroll {
        return Err(GatewayError::Configuration(format!(
            "camera {} has no ffmpeg input for {}",
            config.id,
            request.format()
        )));
    }

    let mut input_options = config.ffmpeg_input_options.trim().to_string();
    if input_options.is_empty() && rtsp_uri.to_ascii_lowercase().contains("rtsp") {
        input_options = "-rtsp_transport tcp".to_string();
    }
    let folder = &config.ffmpeg_output;
    let local_post = |file: &str| -> Result<String> {
        if config.server_port == 0 {
            return Err(GatewayError::Configuration(format!(
                "camera {} needs a server_port for ffmpeg generated {}",
                config.id,
                request.format()
            )));
        }
        Ok(format!("http://127.0.0.1:{}/{}", config.server_port, file))
    };

    let (input_options, input, output_options, output) = match request {
        OutputRequest::Hls => (
            join(&[QUIET, &input_options]),
            rtsp_uri.to_string(),
            or_default(&config.hls_out_options, DEFAULT_HLS_OPTIONS).to_string(),
            folder.join("ipcamera.m3u8").to_string_lossy().into_owned(),
        ),
        OutputRequest::Gif { name, secs, preroll_frames } if *preroll_frames > 0 => (
            join(&["-y -r 1", QUIET]),
            folder.join("snapshot%d.jpg").to_string_lossy().into_owned(),
            join(&[
                &format!("-frames:v {}", preroll_frames + secs),
                or_default(&config.gif_out_options, DEFAULT_GIF_OPTIONS),
            ]),
            folder.join(format!("{}.gif", name)).to_string_lossy().into_owned(),
        ),
        OutputRequest::Gif { name, secs, .. } => (
            join(&[&format!("-y -t {}", secs), QUIET, &input_options]),
            rtsp_uri.to_string(),
            or_default(&config.gif_out_options, DEFAULT_GIF_OPTIONS).to_string(),
            folder.join(format!("{}.gif", name)).to_string_lossy().into_owned(),
        ),
        OutputRequest::Record { name, secs } => (
            join(&[&format!("-y -t {}", secs), QUIET, &input_options]),
            rtsp_uri.to_string(),
            or_default(&config.mp4_out_options, DEFAULT_MP4_OPTIONS).to_string(),
            folder.join(format!("{}.mp4", name)).to_string_lossy().into_owned(),
        ),
        OutputRequest::RtspAlarms {
            motion_threshold,
            audio_threshold,
        } => {
            let input = if config.alarm_input_url.is_empty() {
                rtsp_uri.to_string()
            } else {
                config.alarm_input_url.clone()
            };
            (
                input_options.clone(),
                input,
                alarm_filters(&config.motion_options, *motion_threshold, *audio_threshold),
                "-".to_string(),
            )
        }
        OutputRequest::Mjpeg => (
            join(&[&input_options, QUIET]),
            rtsp_uri.to_string(),
            or_default(&config.mjpeg_options, DEFAULT_MJPEG_OPTIONS).to_string(),
            local_post("ipcamera.jpg")?,
        ),
        OutputRequest::Snapshot => (
            join(&[&input_options, "-threads 1 -skip_frame nokey", QUIET]),
            rtsp_uri.to_string(),
            or_default(&config.snapshot_options, DEFAULT_SNAPSHOT_OPTIONS).to_string(),
            local_post("snapshot.jpg")?,
        ),
    };

    Ok(TranscodeJob {
        format: request.format(),
        input_options,
        input,
        output_options,
        output,
        user: config.user.clone(),
        password: config.password.clone(),
    })
}

/// 报警进程的滤镜：静音检测和场景变化检测，输出丢弃
fn alarm_filters(motion_options: &str, motion: Option<f64>, audio: Option<u32>) -> String {
    let mut filters = match audio {
        Some(db) => format!("-af silencedetect=n=-{}dB:d=2", db),
        None => "-an".to_string(),
    };
    match motion {
        None => filters.push_str(" -vn"),
        Some(threshold) => {
            let select = format!("select='gte(scene,{})',metadata=print", threshold);
            let user = motion_options.trim();
            if user.is_empty() {
                filters.push_str(&format!(" -vf {}", select));
            } else if user.starts_with('-') {
                // 用户自定义的滤镜链放在检测之前
                filters.push_str(&format!(" {},{}", user, select));
            } else {
                filters.push_str(&format!(" {} -vf {}", user, select));
            }
        }
    }
    filters.push_str(" -f null");
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn camera() -> CameraConfig {
        CameraConfig {
            id: "porch".into(),
            ip: "192.168.1.30".into(),
            user: "admin".into(),
            password: "pw".into(),
            server_port: 54321,
            ffmpeg_output: PathBuf::from("/tmp/ipcamera/porch"),
            ..Default::default()
        }
    }

    #[test]
    fn test_hls_job() {
        let job = build_job(&camera(), "rtsp://192.168.1.30:554/stream", &OutputRequest::Hls).unwrap();
        assert_eq!(job.input_options, "-hide_banner -loglevel warning -rtsp_transport tcp");
        assert_eq!(job.output, "/tmp/ipcamera/porch/ipcamera.m3u8");
        assert_eq!(job.input_with_credentials(), "rtsp://admin:pw@192.168.1.30:554/stream");
    }

    #[test]
    fn test_mjpeg_posts_back_to_local_server() {
        let job = build_job(&camera(), "rtsp://cam/stream", &OutputRequest::Mjpeg).unwrap();
        assert_eq!(job.output, "http://127.0.0.1:54321/ipcamera.jpg");

        let mut no_server = camera();
        no_server.server_port = 0;
        let err = build_job(&no_server, "rtsp://cam/stream", &OutputRequest::Snapshot).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_gif_from_preroll_needs_no_input() {
        let request = OutputRequest::Gif {
            name: "door".into(),
            secs: 5,
            preroll_frames: 3,
        };
        let job = build_job(&camera(), "", &request).unwrap();
        assert_eq!(job.input, "/tmp/ipcamera/porch/snapshot%d.jpg");
        assert!(job.output_options.starts_with("-frames:v 8 "));
        assert_eq!(job.output, "/tmp/ipcamera/porch/door.gif");

        assert!(build_job(&camera(), "", &OutputRequest::Record { name: "x".into(), secs: 5 }).is_err());
    }

    #[test]
    fn test_alarm_filters() {
        assert_eq!(alarm_filters("", None, Some(35)), "-af silencedetect=n=-35dB:d=2 -vn -f null");
        assert_eq!(
            alarm_filters("", Some(0.004), None),
            "-an -vf select='gte(scene,0.004)',metadata=print -f null"
        );
        assert_eq!(
            alarm_filters("-vf crop=200:100:0:0", Some(0.1), None),
            "-an -vf crop=200:100:0:0,select='gte(scene,0.1)',metadata=print -f null"
        );
    }
}
