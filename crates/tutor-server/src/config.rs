use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tutor_ai::BackendConfig;
use tutor_core::DEFAULT_TOLERANCE;
use tutor_mesh::Converter;

pub const CONFIG_ENV: &str = "TUTOR_CONFIG";
pub const DEFAULT_HINTS_PER_SESSION: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub converter: Converter,
    pub collector_url: Option<String>,
    pub llm: BackendConfig,
    pub tolerance: f64,
    pub max_turns_kept: usize,
    pub hints_per_session: u32,
    pub max_concurrent_calls: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            data_dir: PathBuf::from("./tutor-data"),
            converter: Converter::default(),
            collector_url: None,
            llm: BackendConfig::default(),
            tolerance: DEFAULT_TOLERANCE,
            max_turns_kept: tutor_ai::DEFAULT_MAX_TURNS_KEPT,
            hints_per_session: DEFAULT_HINTS_PER_SESSION,
            max_concurrent_calls: tutor_ai::DEFAULT_MAX_CONCURRENT_CALLS,
        }
    }
}

impl ServerConfig {
    /// Reads the file named by `TUTOR_CONFIG` (if set), then applies `TUTOR_*`
    /// overrides from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::from_sources(path.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = parsed(&env, "TUTOR_BIND")? {
            self.bind = value;
        }
        if let Some(value) = env("TUTOR_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = env("TUTOR_COLLECTOR_URL") {
            self.collector_url = Some(value).filter(|url| !url.trim().is_empty());
        }
        if let Some(value) = env("TUTOR_LLM_URL") {
            self.llm.url = value;
        }
        if let Some(value) = env("TUTOR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = env("TUTOR_LLM_API_KEY") {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = parsed(&env, "TUTOR_LLM_TIMEOUT_SECS")? {
            self.llm.timeout_secs = value;
        }
        if let Some(value) = parsed::<f64>(&env, "TUTOR_TOLERANCE")? {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidEnv {
                    key: "TUTOR_TOLERANCE",
                    value: value.to_string(),
                });
            }
            self.tolerance = value;
        }
        if let Some(value) = parsed(&env, "TUTOR_MAX_TURNS_KEPT")? {
            self.max_turns_kept = value;
        }
        if let Some(value) = parsed(&env, "TUTOR_HINTS_PER_SESSION")? {
            self.hints_per_session = value;
        }
        if let Some(value) = parsed(&env, "TUTOR_MAX_CONCURRENT_CALLS")? {
            self.max_concurrent_calls = value;
        }
        Ok(())
    }
}

fn parsed<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
        None => Ok(None),
    }
}
