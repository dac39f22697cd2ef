//! Configuration file resolution and loading
//!
//! Config file lookup follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/ambi/config.toml`)
//!
//! A missing file is never fatal: callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name under the platform config directory
pub const APP_DIR_NAME: &str = "ambi";

/// Config file name inside the app directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    PlatformDefault,
}

/// Resolve the config file path.
///
/// Returns `None` only when no candidate exists at all (no CLI argument, no
/// environment variable, and the platform has no config directory).
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Option<(PathBuf, ConfigSource)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), ConfigSource::CommandLine));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), ConfigSource::Environment));
        }
    }

    // Priority 3: platform config directory
    default_config_path().map(|path| (path, ConfigSource::PlatformDefault))
}

/// Platform default config file path, e.g. `~/.config/ambi/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Load `T` from a TOML file, falling back to `T::default()` if it is missing.
///
/// A file that exists but cannot be read or parsed is an error: silently
/// ignoring a broken config would hide the user's settings.
pub fn load_toml_or_default<T>(path: Option<&Path>, source: Option<ConfigSource>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config directory available, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        // An explicitly requested file must exist
        if matches!(source, Some(ConfigSource::CommandLine) | Some(ConfigSource::Environment)) {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("No config file at {}, using built-in defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}
