//! Configuration management for ambi-player
//!
//! A single TOML bootstrap file, resolved in this order:
//! 1. `--config` command-line argument
//! 2. `AMBI_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/ambi/config.toml` on Linux)
//! 4. Built-in defaults
//!
//! Every field has a built-in default, so an empty or partial file is valid.
//! Command-line flags override the file after loading.
//!
//! ```toml
//! server_url = "http://localhost:8000"
//!
//! [logging]
//! level = "info"
//!
//! [stream]
//! cut_threshold_bytes = 768000
//! seam_crossfade_ms = 50
//! metrics_every_chunks = 20
//!
//! [playback]
//! min_start_units = 2
//! crossfade_ms = 400
//! crossfade_tick_ms = 20
//! crossfade_curve = "equal_power"
//! position_interval_ms = 50
//!
//! [timeouts]
//! connect_ms = 10000
//! join_ms = 10000
//! control_ms = 15000
//! ```

use crate::error::{Error, Result};
use crate::playback::SchedulerConfig;
use crate::session::SessionSettings;
use ambi_common::config::{load_toml_or_default, resolve_config_path};
use ambi_common::FadeCurve;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "AMBI_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the music server (control plane and message channel)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Chunk assembly settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Pending bytes that trigger a unit cut
    #[serde(default = "default_cut_threshold_bytes")]
    pub cut_threshold_bytes: usize,

    /// Seam blend window between consecutive units (0 disables)
    #[serde(default = "default_seam_crossfade_ms")]
    pub seam_crossfade_ms: u64,

    /// Publish metrics every N chunks during steady arrival
    #[serde(default = "default_metrics_every_chunks")]
    pub metrics_every_chunks: u64,
}

/// Scheduler settings
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Units buffered before the first unit starts
    #[serde(default = "default_min_start_units")]
    pub min_start_units: usize,

    /// Volume crossfade window for gapless handoff
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,

    /// Gain recompute interval during a crossfade
    #[serde(default = "default_crossfade_tick_ms")]
    pub crossfade_tick_ms: u64,

    #[serde(default)]
    pub crossfade_curve: FadeCurve,

    /// How often loaded sounds report their position
    #[serde(default = "default_position_interval_ms")]
    pub position_interval_ms: u64,
}

/// Client-side bounds on remote operations
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    #[serde(default = "default_join_ms")]
    pub join_ms: u64,

    #[serde(default = "default_control_ms")]
    pub control_ms: u64,
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cut_threshold_bytes() -> usize {
    crate::playback::chunk_buffer::DEFAULT_CUT_THRESHOLD_BYTES
}

fn default_seam_crossfade_ms() -> u64 {
    crate::playback::chunk_buffer::DEFAULT_SEAM_CROSSFADE_MS
}

fn default_metrics_every_chunks() -> u64 {
    20
}

fn default_min_start_units() -> usize {
    2
}

fn default_crossfade_ms() -> u64 {
    400
}

fn default_crossfade_tick_ms() -> u64 {
    20
}

fn default_position_interval_ms() -> u64 {
    50
}

fn default_connect_ms() -> u64 {
    10_000
}

fn default_join_ms() -> u64 {
    10_000
}

fn default_control_ms() -> u64 {
    15_000
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            logging: LoggingConfig::default(),
            stream: StreamConfig::default(),
            playback: PlaybackConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cut_threshold_bytes: default_cut_threshold_bytes(),
            seam_crossfade_ms: default_seam_crossfade_ms(),
            metrics_every_chunks: default_metrics_every_chunks(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_start_units: default_min_start_units(),
            crossfade_ms: default_crossfade_ms(),
            crossfade_tick_ms: default_crossfade_tick_ms(),
            crossfade_curve: FadeCurve::default(),
            position_interval_ms: default_position_interval_ms(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            join_ms: default_join_ms(),
            control_ms: default_control_ms(),
        }
    }
}

impl TomlConfig {
    /// Resolve, load, and validate the config file
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let resolved = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        let (path, source) = match &resolved {
            Some((path, source)) => (Some(path.as_path()), Some(*source)),
            None => (None, None),
        };
        if let (Some(path), Some(source)) = (path, source) {
            info!("Config file candidate: {} ({:?})", path.display(), source);
        }

        let config: TomlConfig = load_toml_or_default(path, source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = ambi_common::config::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the pipeline
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 8] = [
            (self.server_url.trim().is_empty(), "server_url must not be empty"),
            (self.stream.cut_threshold_bytes == 0, "stream.cut_threshold_bytes must be > 0"),
            (self.stream.metrics_every_chunks == 0, "stream.metrics_every_chunks must be > 0"),
            (self.playback.min_start_units == 0, "playback.min_start_units must be >= 1"),
            (self.playback.crossfade_ms == 0, "playback.crossfade_ms must be > 0"),
            (self.playback.crossfade_tick_ms == 0, "playback.crossfade_tick_ms must be > 0"),
            (self.playback.position_interval_ms == 0, "playback.position_interval_ms must be > 0"),
            (
                self.timeouts.connect_ms == 0 || self.timeouts.join_ms == 0 || self.timeouts.control_ms == 0,
                "timeouts must be > 0",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(Error::Config(message.to_string())),
            None => Ok(()),
        }
    }

    /// Settings for the session actor
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            cut_threshold_bytes: self.stream.cut_threshold_bytes,
            seam_crossfade_ms: self.stream.seam_crossfade_ms,
            metrics_every_chunks: self.stream.metrics_every_chunks,
            scheduler: SchedulerConfig {
                min_start_units: self.playback.min_start_units,
                crossfade: Duration::from_millis(self.playback.crossfade_ms),
                curve: self.playback.crossfade_curve,
            },
            crossfade_tick: Duration::from_millis(self.playback.crossfade_tick_ms),
            connect_timeout: Duration::from_millis(self.timeouts.connect_ms),
            join_timeout: Duration::from_millis(self.timeouts.join_ms),
            control_timeout: Duration::from_millis(self.timeouts.control_ms),
        }
    }
}
