//! Configuration management for mnemo.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (MNEMO_CONFIG, MNEMO_DATA_DIR)
//! 2. Config file (<data dir>/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use mnemo_core::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Memory engine settings (`data_dir` is taken from `paths`)
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for the database and sidecar files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "mnemo", "mnemo") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mnemo")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            debug!(path = %config_path.display(), "Loaded config file");
            Self::parse(&content)?
        } else {
            Config::default()
        };

        if let Ok(dir) = std::env::var("MNEMO_DATA_DIR") {
            config.paths.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MNEMO_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Engine configuration rooted at the configured data directory
    pub fn engine_config(&self) -> MemoryConfig {
        MemoryConfig {
            data_dir: self.paths.data_dir.clone(),
            ..self.memory.clone()
        }
    }
}
