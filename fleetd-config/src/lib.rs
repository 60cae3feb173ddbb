//! Configuration loading for the fleetd cluster controller.
//!
//! Load hierarchy: environment > file > defaults, mirroring the teacher's
//! `knhk-config` loader.

mod env;
mod schema;

pub use env::apply_env_overrides;
pub use schema::{
    ControllerConfig, PrivacyMask, SchedulerConfig, SecurityConfig, TelemetryConfig,
};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load configuration using the `CONFIG_PATH` environment variable if set,
/// falling back to `path` when provided, and to defaults otherwise.
/// Environment variables (`FLEETD_*`) are applied last and always win.
pub fn load_config(default_path: Option<&Path>) -> ConfigResult<ControllerConfig> {
    let path = std::env::var_os("CONFIG_PATH")
        .map(PathBuf::from)
        .or_else(|| default_path.map(PathBuf::from));

    let mut config = match path {
        Some(ref p) if p.exists() => load_from_file(p)?,
        _ => ControllerConfig::default(),
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> ConfigResult<ControllerConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ControllerConfig = toml::from_str(&content)?;
    Ok(config)
}
