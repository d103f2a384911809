use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_MODEL;
use crate::progress::DEFAULT_CHUNK_ESTIMATE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline server connection
    pub server: ServerConfig,

    /// Pipeline behaviour
    pub pipeline: PipelineConfig,

    /// Service availability polling
    pub status: StatusConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the server exposing the /api endpoints
    pub base_url: String,

    /// Connection timeout in seconds (streams themselves are not time-limited)
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Translation model used when none is given
    pub default_model: String,

    /// Assumed chunk count per stage for progress estimation
    pub chunk_estimate: u32,

    /// Capacity of the progress event channel
    pub event_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Seconds between availability checks
    pub poll_interval_secs: u64,

    /// Refuse to start a run while the transcription service is unavailable
    pub require_available: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:3000".to_string(),
                connect_timeout_secs: Some(10),
            },
            pipeline: PipelineConfig {
                default_model: DEFAULT_MODEL.to_string(),
                chunk_estimate: DEFAULT_CHUNK_ESTIMATE,
                event_buffer: 64,
            },
            status: StatusConfig {
                poll_interval_secs: 30,
                require_available: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config found, writing defaults to {}", config_path.display());
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Read and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("yt-translate").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        crate::utils::validate_url(&self.server.base_url)
            .context("server.base_url must be an http(s) URL")?;

        if self.pipeline.default_model.trim().is_empty() {
            anyhow::bail!("pipeline.default_model must not be empty");
        }
        if self.pipeline.chunk_estimate == 0 {
            anyhow::bail!("pipeline.chunk_estimate must be greater than zero");
        }
        if self.pipeline.event_buffer == 0 {
            anyhow::bail!("pipeline.event_buffer must be greater than zero");
        }
        if self.status.poll_interval_secs == 0 {
            anyhow::bail!("status.poll_interval_secs must be greater than zero");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Server: {}", self.server.base_url);
        if let Some(timeout) = self.server.connect_timeout_secs {
            println!("  Connect Timeout: {}s", timeout);
        }
        println!("  Default Model: {}", self.pipeline.default_model);
        println!("  Chunk Estimate: {}", self.pipeline.chunk_estimate);
        println!("  Status Poll Interval: {}s", self.status.poll_interval_secs);
        println!("  Require Available Service: {}", self.status.require_available);
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.server.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.status.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.default_model, "openai/gpt-4o");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = Config::load(Some(&path)).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load(Some(&path)).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        config.server.base_url = "localhost".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.chunk_estimate = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.status.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_timeout_is_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = serde_yaml::to_string(&Config::default())
            .unwrap()
            .replace("connect_timeout_secs: 10", "connect_timeout_secs: 3");
        fs_err::write(&path, yaml).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_load_from_rejects_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "server: [not, a, map]").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
