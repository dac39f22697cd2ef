//! Ambi Player (ambi-player) - Main entry point
//!
//! Starts a music session for one book and plays it until stopped. Reads
//! single-letter commands from stdin: `p` pause, `r` resume, `s` stop,
//! `q` quit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ambi_common::{FadeCurve, PlayerEvent, SessionStatus};
use ambi_player::audio::{open_output, AudioOutput, OutputKind};
use ambi_player::session::{HttpControlClient, SocketIoConnector};
use ambi_player::{Book, Player, TomlConfig};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ambi-player
#[derive(Parser, Debug)]
#[command(name = "ambi-player")]
#[command(about = "Ambient reading-music player")]
#[command(version)]
struct Args {
    /// Book title
    #[arg(short, long)]
    title: String,

    /// Book author (repeatable)
    #[arg(short, long = "author")]
    authors: Vec<String>,

    /// Book subject (repeatable)
    #[arg(short, long = "subject")]
    subjects: Vec<String>,

    /// Short book description
    #[arg(short, long)]
    description: Option<String>,

    /// Music server base URL (overrides the config file)
    #[arg(long, env = "AMBI_SERVER_URL")]
    server_url: Option<String>,

    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Audio output: virtual or device
    #[arg(short, long, default_value = "virtual")]
    output: OutputKind,

    /// Volume crossfade curve between units (overrides the config file)
    #[arg(long)]
    crossfade_curve: Option<FadeCurve>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = &args.server_url {
        config.server_url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(curve) = args.crossfade_curve {
        config.playback.crossfade_curve = curve;
    }
    config.validate().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(&config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting ambi-player {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        "Server: {} (crossfade {} ms, {})",
        config.server_url, config.playback.crossfade_ms, config.playback.crossfade_curve
    );

    let settings = config.session_settings();
    let control = Arc::new(
        HttpControlClient::new(&config.server_url).context("Invalid server URL")?,
    );
    let connector = Arc::new(
        SocketIoConnector::new(&config.server_url, settings.connect_timeout)
            .context("Invalid server URL")?,
    );
    let output = open_output(args.output, config.playback.position_interval_ms)
        .context("Failed to open audio output")?;
    info!("Audio output: {}", output.name());

    let (player, actor) = Player::spawn(settings, control, connector, output);
    tokio::spawn(log_events(player.clone()));

    let book = Book {
        title: args.title,
        authors: args.authors,
        subjects: args.subjects,
        description: args.description,
    };

    tokio::select! {
        result = run(&player, book) => {
            if let Err(e) = result {
                error!("{:#}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    if let Err(e) = player.shutdown().await {
        warn!("Shutdown: {}", e);
    }
    actor.await.context("Session actor panicked")?;

    info!("Player shutdown complete");
    Ok(())
}

/// Plain levels apply to both workspace crates; anything else is a directive
fn log_filter(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("ambi_player={0},ambi_common={0}", level)
    }
}

/// Start the session and serve stdin commands until quit or stdin closes
async fn run(player: &Player, book: Book) -> Result<()> {
    player
        .play(book)
        .await
        .context("Failed to start session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let outcome = match line.trim() {
            "p" => player.pause().await,
            "r" => player.resume().await,
            "s" => player.stop().await.map(|()| SessionStatus::Idle),
            "q" => return Ok(()),
            "" => continue,
            other => {
                warn!("Unknown command '{}' (p/r/s/q)", other);
                continue;
            }
        };
        match outcome {
            Ok(status) => info!("Now {}", status),
            Err(e) => warn!("Command failed: {}", e),
        }
    }
    Ok(())
}

/// Log lifecycle events and a periodic metrics line
async fn log_events(player: Player) {
    let mut events = player.subscribe();
    let mut health = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PlayerEvent::SessionFailed { report }) => {
                    error!("Session failed ({}): {}", report.kind, report.message);
                }
                Ok(PlayerEvent::BufferUnderrun { underruns, .. }) => {
                    warn!("Buffer underrun #{}", underruns);
                }
                Ok(event) => debug!(event = event.event_type(), "Player event"),
                Err(RecvError::Lagged(skipped)) => debug!("Event log lagged by {}", skipped),
                Err(RecvError::Closed) => return,
            },
            _ = health.tick() => {
                let metrics = player.metrics();
                if player.status().has_session() {
                    info!(
                        chunks = metrics.chunks_received,
                        units = metrics.units_created,
                        played = metrics.units_played,
                        underruns = metrics.buffer_underruns,
                        queued = metrics.queue_depth,
                        "Buffer health"
                    );
                }
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
