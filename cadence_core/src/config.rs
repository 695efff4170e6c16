//! Configuration file support for Cadence.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/cadence/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Cache lifetimes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Session state and progress
    #[serde(default = "default_short_ttl_secs")]
    pub short_ttl_secs: u64,

    /// Course session lists
    #[serde(default = "default_long_ttl_secs")]
    pub long_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_background_sweep")]
    pub background_sweep: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            short_ttl_secs: default_short_ttl_secs(),
            long_ttl_secs: default_long_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            background_sweep: default_background_sweep(),
        }
    }
}

impl CacheConfig {
    pub fn short_ttl(&self) -> Duration {
        Duration::from_secs(self.short_ttl_secs)
    }

    pub fn long_ttl(&self) -> Duration {
        Duration::from_secs(self.long_ttl_secs)
    }

    /// Sweep period, never shorter than one second
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("cadence")
}

fn default_short_ttl_secs() -> u64 {
    5 * 60
}

fn default_long_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_background_sweep() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject lifetimes that would make the cache useless or inverted
    pub fn validate(&self) -> Result<()> {
        if self.cache.short_ttl_secs > self.cache.long_ttl_secs {
            return Err(Error::Config(format!(
                "cache.short_ttl_secs ({}) exceeds cache.long_ttl_secs ({})",
                self.cache.short_ttl_secs, self.cache.long_ttl_secs
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("cadence").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
