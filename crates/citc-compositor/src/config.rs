//! Compositor configuration (SPEC_FULL.md §3 "(NEW) Config entity").
//! Loaded the way the teacher's `config::Config::load` does: a TOML file
//! merged with CLI overrides, falling back to built-in defaults when the
//! file is absent.

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
pub struct CompositorConfig {
    pub screen_w: u32,
    pub screen_h: u32,
    pub socket_path: String,
    pub max_clients: usize,
    pub damage_capacity: usize,
    #[serde(default)]
    pub input_devices: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            screen_w: 1920,
            screen_h: 1080,
            socket_path: "/run/citc/compositor.sock".to_string(),
            max_clients: crate::server::MAX_CLIENTS,
            damage_capacity: citc_proto::damage::CAPACITY,
            input_devices: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl CompositorConfig {
    /// Reads `path` if it exists, falling back to defaults otherwise
    /// (mirrors the teacher's `Config::load`'s "missing file is not an
    /// error" behavior).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: CompositorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.screen_w == 0 || self.screen_h == 0 {
            return Err(ConfigError::Invalid("screen dimensions must be non-zero"));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = CompositorConfig::load(Path::new("/nonexistent/path.toml")).unwrap();
        assert_eq!(cfg.screen_w, 1920);
    }

    #[test]
    fn zero_screen_dims_rejected() {
        let mut cfg = CompositorConfig::default();
        cfg.screen_w = 0;
        assert!(cfg.validate().is_err());
    }
}
