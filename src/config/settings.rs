//! Application settings management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest file the backend accepts (2 GiB)
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// Backend API settings
    #[serde(default)]
    pub api: ApiSettings,

    /// Upload settings
    #[serde(default)]
    pub upload: UploadSettings,

    /// Progress monitor settings
    #[serde(default)]
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Data directory for stored credentials
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the video journal backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for request/response calls, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Size ceiling for a single upload in bytes
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Read size per streamed chunk; one progress sample is emitted per chunk
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Interval between status polls, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// First reconnect delay for the progress stream, in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Reconnect attempts after consecutive progress stream errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Switch to status polling once stream reconnects are exhausted
    #[serde(default = "default_true")]
    pub poll_after_push_exhausted: bool,
}

// Default value functions

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "vidjot", "vidjot")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share/vidjot"))
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_size_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

fn default_chunk_size_bytes() -> usize {
    256 * 1024
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            chunk_size_bytes: default_chunk_size_bytes(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            retry_base_ms: default_retry_base_ms(),
            max_retries: default_max_retries(),
            poll_after_push_exhausted: true,
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("No config file found, using defaults");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        settings.apply_env_overrides();

        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("VIDJOT_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
    }

    /// Bearer token supplied through the environment, taking precedence over stored credentials
    pub fn env_token() -> Option<String> {
        std::env::var("VIDJOT_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "vidjot", "vidjot")
            .context("Could not determine config directory")?;

        let config_dir = dirs.config_dir();
        Ok(config_dir.join("config.toml"))
    }

    /// Write default configuration to a file
    pub fn write_default(path: &PathBuf) -> Result<()> {
        let settings = Self::default();
        let content = toml::to_string_pretty(&settings)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the stored credentials path
    pub fn credentials_path(&self) -> PathBuf {
        self.general.data_dir.join("credentials.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.general.data_dir)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.poll_interval_secs.max(1))
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.monitor.retry_base_ms.max(1))
    }

    /// Configured upload ceiling, never above the backend's 2 GiB limit
    pub fn max_upload_bytes(&self) -> u64 {
        self.upload.max_size_bytes.min(MAX_UPLOAD_BYTES)
    }
}
