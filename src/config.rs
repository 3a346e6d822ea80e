//! Client configuration.
//!
//! Layers, later wins: built-in defaults, environment variables, an optional
//! TOML file, then whatever the command line sets explicitly.
//!
//! | Variable               | Field          |
//! |------------------------|----------------|
//! | `STUDY_ROOMS_API_URL`  | `api_base_url` |
//! | `STUDY_ROOMS_STORAGE`  | `storage_path` |
//! | `STUDY_ROOMS_LOG`      | `log_level`    |
//! | `STUDY_ROOMS_CONFIG`   | file to load   |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::client::RoomApiConfig;
use crate::error::{Result, StudyRoomError};

pub const ENV_API_URL: &str = "STUDY_ROOMS_API_URL";
pub const ENV_STORAGE: &str = "STUDY_ROOMS_STORAGE";
pub const ENV_LOG: &str = "STUDY_ROOMS_LOG";
pub const ENV_CONFIG: &str = "STUDY_ROOMS_CONFIG";

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub storage_path: PathBuf,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub detail_timeout: Duration,
    pub fetch_details: bool,
    pub log_level: String,
}

/// Shape of the TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_base_url: Option<String>,
    storage_path: Option<PathBuf>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    detail_timeout_ms: Option<u64>,
    fetch_details: Option<bool>,
    log_level: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api = RoomApiConfig::new(DEFAULT_API_URL);
        Self {
            api_base_url: api.base_url,
            storage_path: default_storage_path(std::env::var_os("HOME").map(PathBuf::from)),
            connect_timeout: api.connect_timeout,
            request_timeout: api.request_timeout,
            detail_timeout: api.detail_timeout,
            fetch_details: api.fetch_details,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn default_storage_path(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".study-rooms")
        .join("storage.db")
}

impl ClientConfig {
    /// Defaults overridden by the process environment, then by the config
    /// file named in `STUDY_ROOMS_CONFIG` (or `file`, which takes priority).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok(), file)
    }

    /// Same as [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>, file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(&env);

        let env_file = env(ENV_CONFIG).filter(|p| !p.trim().is_empty()).map(PathBuf::from);
        if let Some(path) = file.map(Path::to_path_buf).or(env_file) {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| StudyRoomError::Config(format!("read {}: {e}", path.display())))?;
            config.apply_toml(&contents)?;
            tracing::debug!(path = %path.display(), "loaded config file");
        }
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        let set = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = set(ENV_API_URL) {
            self.api_base_url = v;
        }
        if let Some(v) = set(ENV_STORAGE) {
            self.storage_path = PathBuf::from(v);
        }
        if let Some(v) = set(ENV_LOG) {
            self.log_level = v;
        }
    }

    /// Overlay the keys present in a TOML document.
    pub fn apply_toml(&mut self, contents: &str) -> Result<()> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| StudyRoomError::Config(format!("parse config: {e}")))?;
        if let Some(v) = file.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = file.storage_path {
            self.storage_path = v;
        }
        if let Some(ms) = file.connect_timeout_ms {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.detail_timeout_ms {
            self.detail_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = file.fetch_details {
            self.fetch_details = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn api_config(&self) -> RoomApiConfig {
        RoomApiConfig {
            base_url: self.api_base_url.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            detail_timeout: self.detail_timeout,
            fetch_details: self.fetch_details,
        }
    }
}
