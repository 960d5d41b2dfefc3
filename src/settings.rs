//! Runtime configuration, persisted as YAML

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::thumbnail::{DEFAULT_CACHE_CAPACITY, DEFAULT_THUMB_SIZE, RENDER_TIMEOUT, STOP_GRACE, ThumbSize};

const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfstack";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("thumbnail cache capacity must be at least 1")]
    InvalidCacheCapacity,

    #[error("render timeout must be nonzero")]
    InvalidRenderTimeout,

    #[error("thumbnail dimensions must be nonzero")]
    InvalidThumbSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Bound on a single external render, in seconds
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Grace period for a cancelled worker, in milliseconds
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,

    #[serde(default = "default_thumb_height")]
    pub thumb_height: u32,

    /// Hide console windows of spawned renderer processes (Windows)
    #[serde(default)]
    pub suppress_console: bool,

    /// Explicit poppler binary directory, overriding runtime resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poppler_dir: Option<PathBuf>,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_render_timeout_secs() -> u64 {
    RENDER_TIMEOUT.as_secs()
}

fn default_stop_grace_ms() -> u64 {
    STOP_GRACE.as_millis() as u64
}

fn default_thumb_width() -> u32 {
    DEFAULT_THUMB_SIZE.width
}

fn default_thumb_height() -> u32 {
    DEFAULT_THUMB_SIZE.height
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            render_timeout_secs: default_render_timeout_secs(),
            stop_grace_ms: default_stop_grace_ms(),
            thumb_width: default_thumb_width(),
            thumb_height: default_thumb_height(),
            suppress_console: false,
            poppler_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the user config dir, falling back to defaults on
    /// a missing or unreadable file. Validation failures are hard errors:
    /// a coordinator must not be constructed from invalid configuration.
    pub fn load() -> Result<Self, SettingsError> {
        let Some(path) = Self::settings_path() else {
            return Ok(Self::default());
        };

        let settings = match fs::read_to_string(&path) {
            Ok(raw) => match serde_yaml::from_str::<Settings>(&raw) {
                Ok(settings) => {
                    info!("loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("malformed settings at {}: {e}; using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cache_capacity == 0 {
            return Err(SettingsError::InvalidCacheCapacity);
        }
        if self.render_timeout_secs == 0 {
            return Err(SettingsError::InvalidRenderTimeout);
        }
        if self.thumb_width == 0 || self.thumb_height == 0 {
            return Err(SettingsError::InvalidThumbSize);
        }
        Ok(())
    }

    /// Persist to the user config dir
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::settings_path()
            .ok_or_else(|| anyhow::anyhow!("no config directory available"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_yaml::to_string(self)?)?;
        info!("saved settings to {}", path.display());
        Ok(())
    }

    #[must_use]
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(SETTINGS_FILENAME))
    }

    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    #[must_use]
    pub fn thumb_size(&self) -> ThumbSize {
        ThumbSize::new(self.thumb_width, self.thumb_height)
    }
}
