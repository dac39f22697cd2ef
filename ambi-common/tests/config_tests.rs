//! Tests for config file resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate AMBI_TEST_CONFIG are marked with #[serial].

use ambi_common::config::{
    default_config_path, load_toml_or_default, parse_toml, resolve_config_path, ConfigSource,
};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

const ENV_VAR: &str = "AMBI_TEST_CONFIG";

#[derive(Debug, Deserialize, PartialEq)]
struct SampleConfig {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    threshold: u64,
}

fn default_name() -> String {
    "default".to_string()
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            threshold: 0,
        }
    }
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let (path, source) = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), ENV_VAR).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/from-cli.toml"));
    assert_eq!(source, ConfigSource::CommandLine);

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let (path, source) = resolve_config_path(None, ENV_VAR).unwrap();
    assert_eq!(path, PathBuf::from("/tmp/from-env.toml"));
    assert_eq!(source, ConfigSource::Environment);

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_platform_default_when_nothing_set() {
    env::remove_var(ENV_VAR);

    let resolved = resolve_config_path(None, ENV_VAR);
    match default_config_path() {
        Some(expected) => {
            let (path, source) = resolved.unwrap();
            assert_eq!(path, expected);
            assert_eq!(source, ConfigSource::PlatformDefault);
            assert!(path.ends_with("ambi/config.toml"));
        }
        None => assert!(resolved.is_none()),
    }
}

#[test]
fn test_missing_platform_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("config.toml");

    let config: SampleConfig =
        load_toml_or_default(Some(&missing), Some(ConfigSource::PlatformDefault)).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let result: ambi_common::Result<SampleConfig> =
        load_toml_or_default(Some(&missing), Some(ConfigSource::CommandLine));
    assert!(matches!(result, Err(ambi_common::Error::Config(_))));
}

#[test]
fn test_existing_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = \"custom\"\nthreshold = 768000").unwrap();

    let config: SampleConfig =
        load_toml_or_default(Some(file.path()), Some(ConfigSource::CommandLine)).unwrap();
    assert_eq!(config.name, "custom");
    assert_eq!(config.threshold, 768_000);
}

#[test]
fn test_broken_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name = [unterminated").unwrap();

    let result: ambi_common::Result<SampleConfig> =
        load_toml_or_default(Some(file.path()), Some(ConfigSource::PlatformDefault));
    assert!(result.is_err());
}

#[test]
fn test_parse_toml_applies_field_defaults() {
    let config: SampleConfig = parse_toml("threshold = 5").unwrap();
    assert_eq!(config.name, "default");
    assert_eq!(config.threshold, 5);
}
