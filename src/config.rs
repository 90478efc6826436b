use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

pub const APP_DIR: &str = "taskdeck";
pub const CONFIG_FILE: &str = "config.toml";
pub const WEATHER_API_KEY_ENV: &str = "TASKDECK_WEATHER_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the task data lives; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// `metric`, `imperial` or `standard`
    pub units: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            units: "metric".to_string(),
            timeout_secs: 8,
            max_retries: 3,
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Reads `path`, or the default config file when `None`. A missing file
    /// yields the defaults.
    #[tracing::instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            debug!("no config directory available, using defaults");
            return Ok(Self::default().with_env());
        };

        let config = match fs::read_to_string(&path) {
            Ok(content) => {
                info!(config = %path.display(), "loading config");
                Self::parse(&content).map_err(|source| ConfigError::ParseFailed {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(config = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(source) => return Err(ConfigError::ReadFailed { path, source }),
        };

        Ok(config.with_env())
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env(mut self) -> Self {
        if let Some(key) = std::env::var(WEATHER_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
        {
            self.weather.api_key = Some(key.trim().to_string());
        }
        self
    }

    /// `override_dir` wins, then the config file, then the platform default
    pub fn resolve_data_dir(&self, override_dir: Option<&Path>) -> PathBuf {
        override_dir
            .map(Path::to_path_buf)
            .or_else(|| self.data_dir.clone())
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(APP_DIR)
            })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
