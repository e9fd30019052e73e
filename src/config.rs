//! Layered run configuration.
//!
//! Values are resolved in order: built-in defaults, `.ralph/config.toml`
//! (optional), `RALPH_*` environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::timeout::TimeoutConfig;

/// Prefix for environment overrides, e.g. `RALPH_PARALLEL=4`.
pub const CONFIG_ENV_PREFIX: &str = "RALPH";

/// Errors raised while resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for `ralph parallel-full`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RalphConfig {
    /// Maximum number of concurrently running execution units.
    pub parallel: u32,
    /// Iteration ceiling passed to each execution unit.
    pub iterations: u32,
    /// Seconds between unit state polls.
    pub poll_interval_secs: u64,
    /// Optional wall-clock limit per unit, in seconds.
    pub unit_timeout_secs: Option<u64>,
    /// Timeout for individual git commands, in seconds.
    pub git_timeout_secs: u64,
    /// Container runtime binary.
    pub docker_binary: String,
    /// Directory mounted at `/ralph-lib` inside units. Defaults to `.ralph/lib`.
    pub lib_dir: Option<PathBuf>,
    /// Image build context. Defaults to `<lib_dir>/docker`.
    pub docker_context: Option<PathBuf>,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            parallel: 3,
            iterations: 100,
            poll_interval_secs: 10,
            unit_timeout_secs: None,
            git_timeout_secs: 60,
            docker_binary: "docker".to_string(),
            lib_dir: None,
            docker_context: None,
        }
    }
}

impl RalphConfig {
    /// Load configuration from the given file (if present) and the environment.
    pub fn load(config_file: &Path) -> Result<Self, ConfigError> {
        Self::build(config_file, true)
    }

    /// Load configuration from the given file only, ignoring the environment.
    pub fn load_file(config_file: &Path) -> Result<Self, ConfigError> {
        Self::build(config_file, false)
    }

    fn build(config_file: &Path, with_env: bool) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(
            File::from(config_file)
                .format(FileFormat::Toml)
                .required(false),
        );
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX).try_parsing(true),
            );
        }

        let config: RalphConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel == 0 {
            return Err(ConfigError::Invalid("parallel must be at least 1".to_string()));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Invalid(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.unit_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "unit_timeout_secs must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Timing settings derived from this configuration.
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig::new()
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_unit_timeout(self.unit_timeout_secs.map(Duration::from_secs))
            .with_git_timeout(Duration::from_secs(self.git_timeout_secs))
    }
}
