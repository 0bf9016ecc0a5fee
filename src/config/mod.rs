//! Configuration management for ctxcrop

pub mod schema;

pub use schema::{Config, CropTypeConfig, EffectConfig, EffectData, FilesConfig, StyleConfig};

use crate::error::{CropError, CropResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ctxcrop")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir(config: &Config) -> PathBuf {
        config.state.dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ctxcrop")
        })
    }

    /// Get the crop record file path
    pub fn crop_store_path(config: &Config) -> PathBuf {
        Self::state_dir(config).join("crops.json")
    }

    /// Get the lock directory path
    pub fn lock_dir(config: &Config) -> PathBuf {
        Self::state_dir(config).join("locks")
    }

    /// Load configuration, falling back to defaults if not exists
    pub async fn load(&self) -> CropResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CropResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CropError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| CropError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        validate(&config).map_err(|reason| CropError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CropResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CropError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CropResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CropError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the state directories exist
    pub async fn ensure_state_dirs(config: &Config) -> CropResult<()> {
        for dir in [Self::state_dir(config), Self::lock_dir(config)] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                CropError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject configurations the resolver cannot work with
fn validate(config: &Config) -> Result<(), String> {
    for (id, style) in &config.styles {
        if id.is_empty() || id.contains('/') {
            return Err(format!("style id '{}' must be a single path segment", id));
        }
        for effect in &style.effects {
            if effect.id == "image_convert" && effect.data.extension.is_none() {
                return Err(format!("style '{}': image_convert needs an extension", id));
            }
        }
    }
    if config.image.private_key.is_empty() {
        return Err("image.private_key must not be empty".to_string());
    }
    Ok(())
}
