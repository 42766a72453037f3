use anyhow::Context;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ytconv::{ConvertOptions, Converter};

mod api;
mod assets;
mod config;

use api::AppState;
use config::{Environment, ServerConfig};

#[derive(Parser)]
#[command(name = "ytconv-server")]
#[command(version, about = "Convert YouTube videos to MP3 or MP4 over HTTP")]
#[command(long_about = None)]
struct Cli {
    /// Port to listen on (default: 3001 in development, 5000 in production)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Deployment environment
    #[arg(long, env = "APP_ENV", value_enum, default_value = "development")]
    environment: Environment,

    /// Directory containing the built front end
    #[arg(long, env = "STATIC_DIR", default_value = "frontend")]
    static_dir: PathBuf,

    /// Path to the yt-dlp executable
    #[arg(long = "yt-dlp", env = "YT_DLP_PATH", default_value = "yt-dlp")]
    ytdlp: String,

    /// Path to the ffmpeg executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: String,

    /// MP3 audio bitrate in kbit/s
    #[arg(long, default_value = "192")]
    audio_bitrate: u32,

    /// Upstream connect timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Custom User-Agent string for upstream requests
    #[arg(long)]
    user_agent: Option<String>,

    /// Proxy URL (http://proxy:port)
    #[arg(long)]
    proxy: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli);
    run(config).await
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let converter =
        Converter::new(config.convert.clone()).context("failed to initialize converter")?;

    if !converter.check_tools().await {
        warn!("Conversions will fail until yt-dlp and ffmpeg are installed");
    }

    if !config.static_dir.join("index.html").is_file() {
        warn!(
            "No index.html in {}, front-end routes will return 404",
            config.static_dir.display()
        );
    }

    let app = api::router(AppState::new(converter), &config.static_dir);
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        "Server running in {:?} mode on http://{}",
        config.environment, addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ytconv_server=debug,ytconv=debug,tower_http=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ytconv_server=info,ytconv=info".into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(verbose))
        .with(env_filter)
        .init();
}

fn build_config(cli: &Cli) -> ServerConfig {
    let mut convert = ConvertOptions::new()
        .ytdlp_path(&cli.ytdlp)
        .ffmpeg_path(&cli.ffmpeg)
        .audio_bitrate(cli.audio_bitrate)
        .connect_timeout(cli.timeout);

    if let Some(ref ua) = cli.user_agent {
        convert = convert.user_agent(ua);
    }

    if let Some(ref proxy) = cli.proxy {
        convert = convert.proxy(proxy);
    }

    ServerConfig {
        host: cli.host,
        port: cli.port.unwrap_or_else(|| cli.environment.default_port()),
        environment: cli.environment,
        static_dir: cli.static_dir.clone(),
        convert,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, finishing in-flight requests");
}
