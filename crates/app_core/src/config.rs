//! Application configuration

use crate::AppError;
use app_fs::{ServiceOptions, WatcherOptions};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub files: FilesConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Workspace opened when none is given on the command line
    pub workspace_root: Option<PathBuf>,
    /// Default tracing filter (overridden by RUST_LOG)
    pub log_level: String,
    pub log_retention_days: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            log_level: "info".to_string(),
            log_retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// WHATWG label used when a call names no encoding
    pub encoding: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub coalescing_window_ms: u64,
    pub max_batch_delay_ms: u64,
    pub channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        let defaults = WatcherOptions::default();
        Self {
            enabled: true,
            coalescing_window_ms: defaults.coalescing_window_ms,
            max_batch_delay_ms: defaults.max_batch_delay_ms,
            channel_capacity: defaults.channel_capacity,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    /// Write configuration as TOML
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("dev", "wsfs", "wsfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Reject values the file system service cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        app_fs::resolve_encoding(&self.files.encoding)
            .map_err(|_| AppError::Config(format!("unknown encoding {:?}", self.files.encoding)))?;

        if self.watcher.coalescing_window_ms == 0 {
            return Err(AppError::Config("watcher.coalescing_window_ms must be positive".to_string()));
        }
        if self.watcher.channel_capacity == 0 {
            return Err(AppError::Config("watcher.channel_capacity must be positive".to_string()));
        }

        Ok(())
    }

    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            coalescing_window_ms: self.watcher.coalescing_window_ms,
            max_batch_delay_ms: self.watcher.max_batch_delay_ms,
            channel_capacity: self.watcher.channel_capacity,
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            encoding: self.files.encoding.clone(),
            watcher: self.watcher_options(),
        }
    }
}
