mod camera;
mod config;
mod connection;
mod group;
mod onvif;
mod scheduler;
mod server;
mod status;
mod transcoder;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("ipcam-gateway")
        .about("IP camera gateway: HLS, MJPEG, snapshots and alarms for HTTP/RTSP cameras")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .default_value("gateway.toml")
                .help("Path to the gateway configuration file"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("gateway.toml"));

    // 加载配置（日志级别可能来自配置）
    let config = config::Config::load(&config_path)?;

    // 初始化日志，RUST_LOG 优先
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.gateway.log_filter.as_deref().unwrap_or("info")))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("🚀 IP camera gateway starting...");
    info!("✓ Configuration loaded from {:?}", config_path);

    let settings = &config.gateway;
    let online = group::OnlineRegistry::new();
    let store = status::ChannelStateStore::new();
    let manager = camera::CameraManager::new(online.clone(), store.clone());
    let factory = Arc::new(transcoder::ffmpeg::FfmpegFactory::new(&settings.ffmpeg_location));

    for camera_config in config.cameras.iter().cloned() {
        let deps = camera::SessionDeps {
            transcoders: factory.clone(),
            onvif: Arc::new(onvif::DisabledOnvif),
            status: Arc::new(store.clone()),
            online: online.clone(),
            bind_host: server::ALL_INTERFACES.to_string(),
            timings: camera::SessionTimings::default(),
        };
        let (id, port) = (camera_config.id.clone(), camera_config.server_port);
        match manager.add_camera(camera_config, deps) {
            Ok(_) if port != 0 => {
                info!("📹 Camera {} streams at http://{}:{}/ipcamera.m3u8", id, settings.host_ip, port)
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ Skipping camera: {}", e),
        }
    }
    for group_config in config.groups.iter().cloned() {
        let (id, port) = (group_config.id.clone(), group_config.server_port);
        match manager.add_group(group_config, server::ALL_INTERFACES) {
            Ok(_) => info!("📹 Group {} streams at http://{}:{}/ipcamera.m3u8", id, settings.host_ip, port),
            Err(e) => warn!("⚠️ Skipping group: {}", e),
        }
    }
    info!("✓ Cameras and groups registered");

    manager.start_all().await;

    // 状态API
    let cancel = tokio_util::sync::CancellationToken::new();
    let api = server::ServerHandle::bind(
        &settings.api_host,
        settings.api_port,
        server::api::create_router(manager.clone()),
        cancel,
        "API",
    )
    .await?;

    info!("✅ Gateway ready, API on port {}", api.port());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down...");
    api.stop();
    manager.dispose_all();
    Ok(())
}
