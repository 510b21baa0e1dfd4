use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_relay::config::{self, AppConfig};
use room_relay::events::EventBus;
use room_relay::gateway::KurentoGateway;
use room_relay::signaling::SignalingRelay;
use room_relay::state::AppState;
use room_relay::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// room-relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "room-relay")]
#[command(version, about = "WebRTC signaling relay for one-to-many rooms", long_about = None)]
struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Kurento media server WebSocket URL
    #[arg(long, env = "KMS_URL", value_name = "URL")]
    kms_url: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting room-relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(args.config.as_deref()).await?;
    apply_overrides(&mut config, &args);
    config::validate(&config)?;

    tracing::info!("Media server: {}", config.media.url);

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let events = Arc::new(EventBus::new());
    let gateway = Arc::new(KurentoGateway::new(config.media.clone()));
    let relay = Arc::new(SignalingRelay::new(
        gateway,
        events.clone(),
        config.media.negotiation_timeout(),
    ));

    let bind_addr: SocketAddr =
        format!("{}:{}", config.web.bind_address, config.web.http_port).parse()?;

    let state = AppState::new(config, relay, events, shutdown_tx.clone());
    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    // Setup graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("HTTP server error: {}", e);
    }

    cleanup(&state).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(addr) = &args.address {
        config.web.bind_address = addr.clone();
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(url) = &args.kms_url {
        config.media.url = url.clone();
    }
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "room_relay=error,tower_http=error",
        LogLevel::Warn => "room_relay=warn,tower_http=warn",
        LogLevel::Info => "room_relay=info,tower_http=info",
        LogLevel::Verbose => "room_relay=debug,tower_http=info",
        LogLevel::Debug => "room_relay=debug,tower_http=debug",
        LogLevel::Trace => "room_relay=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Release every room's media resources on shutdown
async fn cleanup(state: &Arc<AppState>) {
    let rooms = state.relay.registry().len();
    state.relay.shutdown().await;
    tracing::info!("Closed {} room(s)", rooms);
}
