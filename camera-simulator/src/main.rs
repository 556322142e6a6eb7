mod frames;
mod server;

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, Command};
use server::{AuthMode, SimulatorSettings};
use tracing::info;

fn cli() -> Command {
    Command::new("camera-simulator")
        .about("HTTP camera simulator for exercising the gateway")
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_parser(value_parser!(u16))
                .default_value("8081"),
        )
        .arg(Arg::new("user").long("user").default_value("admin"))
        .arg(Arg::new("password").long("password").default_value("admin"))
        .arg(
            Arg::new("auth")
                .long("auth")
                .value_parser(["none", "basic", "digest"])
                .default_value("digest"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_parser(value_parser!(u32))
                .default_value("5"),
        )
        .arg(
            Arg::new("motion-every")
                .long("motion-every")
                .value_parser(value_parser!(u64))
                .default_value("30")
                .help("Average seconds between simulated motion events"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let matches = cli().get_matches();
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8081);
    let auth = matches
        .get_one::<String>("auth")
        .and_then(|value| AuthMode::parse(value))
        .ok_or_else(|| anyhow!("unknown auth mode"))?;
    let settings = SimulatorSettings {
        user: matches.get_one::<String>("user").cloned().unwrap_or_default(),
        password: matches.get_one::<String>("password").cloned().unwrap_or_default(),
        auth,
        fps: matches.get_one::<u32>("fps").copied().unwrap_or(5),
        motion_every: matches.get_one::<u64>("motion-every").copied().unwrap_or(30),
    };

    info!("🎥 Camera simulator starting...");
    info!("  Auth: {:?}, {} fps", settings.auth, settings.fps);

    let app = server::create_router(settings);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("✓ Listening on {}", listener.local_addr()?);
    info!("  Snapshot: /snapshot.jpg  MJPEG: /mjpeg  Events: /cgi-bin/eventManager.cgi");

    axum::serve(listener, app).await?;
    Ok(())
}
