//! Mixing server configuration (SPEC_FULL.md §3 "(NEW) Config entity").
//! Loaded the same way `citc_compositor::config::CompositorConfig` is: a
//! TOML file merged with CLI overrides, falling back to built-in defaults
//! when the file is absent.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub socket_path: String,
    pub sink_device: String,
    pub mix_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            socket_path: "/run/citc/audio.sock".to_string(),
            sink_device: "/dev/dsp".to_string(),
            mix_interval_ms: 20,
            log_level: default_log_level(),
        }
    }
}

impl AudioConfig {
    /// Reads `path` if it exists, falling back to defaults otherwise
    /// (missing file is not an error, matching the compositor's own
    /// `Config::load`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AudioConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.is_empty() {
            return Err(ConfigError::Invalid("socket_path must be non-empty"));
        }
        if self.mix_interval_ms == 0 {
            return Err(ConfigError::Invalid("mix_interval_ms must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AudioConfig::load(Path::new("/nonexistent/citc-audio.toml")).unwrap();
        assert_eq!(cfg.socket_path, "/run/citc/audio.sock");
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = AudioConfig::default();
        cfg.mix_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
