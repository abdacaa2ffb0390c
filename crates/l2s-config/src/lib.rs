//! # l2s-config
//!
//! Configuration management for link2symlink.
//!
//! Loads configuration from:
//! 1. `~/.l2s/config.toml` (global)
//! 2. `.l2s/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::logging::LogLevel;

/// Environment variable that switches the emulation off entirely.
pub const ENV_DISABLE: &str = "L2S_DISABLE";
/// Environment variable overriding `[log] level`.
pub const ENV_LOG_LEVEL: &str = "L2S_LOG_LEVEL";

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub emulation: EmulationConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Global config (~/.l2s/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::load_file(&global_path)?;
            }
        }

        // 2. Project config (.l2s/config.toml) overrides global
        let project_path = Path::new(".l2s/config.toml");
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_layer = ConfigLayer::load_file(project_path)?;
            config.merge(project_layer);
        }

        // 3. Environment
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a single config file without merging or env overrides.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.l2s/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".l2s/config.toml"))
    }

    /// Merge a project layer over this one.
    ///
    /// Switches are only ever turned off by a project, never back on, so a
    /// global `enabled = false` cannot be undone by a checked-in file. Keys
    /// the layer leaves out keep their current value.
    pub fn merge(&mut self, layer: ConfigLayer) {
        let ConfigLayer { emulation, log } = layer;
        if emulation.enabled == Some(false) {
            self.emulation.enabled = false;
        }
        if emulation.patch_metadata == Some(false) {
            self.emulation.patch_metadata = false;
        }
        if emulation.transparent_resolution == Some(false) {
            self.emulation.transparent_resolution = false;
        }
        if let Some(level) = log.level {
            self.log.level = level;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(ENV_DISABLE) {
            if is_truthy(&value) {
                self.emulation.enabled = false;
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if let Some(level) = LogLevel::parse(&level) {
                self.log.level = level;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Which parts of the hard-link emulation are active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    /// Master switch. When off, link requests reach the filesystem untouched.
    pub enabled: bool,
    /// Rewrite stat-family results so aliases report the chain's link count.
    pub patch_metadata: bool,
    /// Redirect ordinary path lookups through the chain to the backing file.
    pub transparent_resolution: bool,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patch_metadata: true,
            transparent_resolution: true,
        }
    }
}

/// One config file as written: only the keys it actually sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub emulation: EmulationLayer,
    pub log: LogLayer,
}

impl ConfigLayer {
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmulationLayer {
    pub enabled: Option<bool>,
    pub patch_metadata: Option<bool>,
    pub transparent_resolution: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogLayer {
    pub level: Option<LogLevel>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
        }
    }
}
