//! # welp-config
//!
//! Layered settings for the Welp policy tooling:
//! built-in defaults, then an optional `welp.toml`, then `WELP__*` environment
//! variables (`WELP__ENGINE__COLLABORATOR_TIMEOUT_MS=500`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use welp_core::EngineConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub engine: EngineSettings,
    pub log: LogSettings,
    pub seed: SeedSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineSettings {
    pub collaborator_timeout_ms: u64,
}

impl EngineSettings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig { collaborator_timeout: Duration::from_millis(self.collaborator_timeout_ms) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedSettings {
    pub path: PathBuf,
}

impl Settings {
    /// Loads settings; `file` overrides the default `welp.{toml,json,...}` lookup
    /// and must exist when given.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("welp").required(false),
        };
        let builder = defaults()?
            .add_source(file_source)
            .add_source(Environment::with_prefix("WELP").separator("__").try_parsing(true));
        finish(builder)
    }
}

/// Reads `.env` into the process environment, if present.
pub fn load_env_file() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(err) if err.not_found() => None,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable .env file");
            None
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let default_timeout = welp_core::DEFAULT_COLLABORATOR_TIMEOUT.as_millis() as i64;
    Ok(Config::builder()
        .set_default("engine.collaborator_timeout_ms", default_timeout)?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)?
        .set_default("seed.path", "welp-seed.json")?)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.collaborator_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "engine.collaborator_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::Invalid { key: "log.filter", reason: "must not be empty".into() });
        }
        Ok(())
    }
}
