//! Configuration management for factorio-mod-sync
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/factorio-mod-sync/config.toml
//! - Data: ~/.local/share/factorio-mod-sync/

mod credentials;
mod paths;

pub use credentials::ServerCredentials;
pub use paths::Paths;

use crate::registry::{FactorioVersion, PageOptions, PageSize, DEFAULT_REGISTRY_URL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// File holding the enablement flags, inside the mods directory.
pub const MOD_LIST_FILE: &str = "mod-list.json";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mod portal base URL
    pub registry_url: String,

    /// Directory holding mod-list.json and the downloaded archives
    pub mods_dir: Option<String>,

    /// Path to a server-settings.json carrying the portal username and token
    pub server_settings_path: Option<String>,

    /// Registry query defaults
    pub registry: RegistryConfig,

    /// Download settings
    pub download: DownloadConfig,

    /// Paths configuration
    #[serde(skip)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            mods_dir: None,
            server_settings_path: None,
            registry: RegistryConfig::default(),
            download: DownloadConfig::default(),
            paths: Paths::new(),
        }
    }
}

/// Registry query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Factorio version to filter by
    pub factorio_version: FactorioVersion,

    /// Default page size: a number or "max"
    pub page_size: String,

    /// Exclude deprecated mods
    pub hide_deprecated: bool,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            factorio_version: FactorioVersion::default(),
            page_size: "20".to_string(),
            hide_deprecated: true,
            request_timeout_secs: 30,
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Archives fetched at once
    pub max_concurrent: usize,

    /// Check archives against the portal's SHA-1
    pub verify_sha1: bool,

    /// Also fetch required dependencies of enabled mods
    pub include_dependencies: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            verify_sha1: true,
            include_dependencies: true,
        }
    }
}

impl Config {
    /// Resolve the mods directory (override or default XDG path)
    pub fn mods_dir(&self) -> PathBuf {
        self.mods_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.paths.mods_dir())
    }

    /// Location of mod-list.json
    pub fn mod_list_file(&self) -> PathBuf {
        self.mods_dir().join(MOD_LIST_FILE)
    }

    /// Resolve the credentials file (override or default XDG path)
    pub fn server_settings_file(&self) -> PathBuf {
        self.server_settings_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.paths.server_settings_file())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.request_timeout_secs.max(1))
    }

    /// Page options built from the configured defaults
    pub fn page_options(&self) -> Result<PageOptions> {
        Ok(PageOptions {
            hide_deprecated: self.registry.hide_deprecated,
            page_size: PageSize::from_cli(&self.registry.page_size)
                .context("Invalid registry.page_size in config")?,
            version: self.registry.factorio_version,
            ..Default::default()
        })
    }

    /// Ensure required directories exist, including overrides.
    pub fn ensure_dirs(&self) -> Result<()> {
        self.paths
            .ensure_dirs()
            .context("Failed to create default application directories")?;
        std::fs::create_dir_all(self.mods_dir()).context("Failed to create mods directory")?;
        Ok(())
    }

    /// Load configuration from disk or create default
    pub async fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save().await?;
            config
        };

        config.paths = paths;
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }
}
