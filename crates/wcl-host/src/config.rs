//! Host configuration: a TOML file merged with CLI overrides, in the
//! same shape `citc_compositor::config::CompositorConfig` uses.

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
pub struct HostConfig {
    /// If `true`, an unresolved import is logged and left null instead of
    /// aborting the load (spec.md §4.9 step 5). Forward-compatible
    /// opt-out for a real CRT import set this runtime does not implement
    /// (see DESIGN.md's "CRT scope" decision) — unused today since every
    /// demo PE's imports resolve fully.
    #[serde(default)]
    pub crt_support: bool,
    #[serde(default)]
    pub tolerate_unresolved_imports: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { crt_support: false, tolerate_unresolved_imports: false, log_level: default_log_level() }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crt_support {
            return Err(ConfigError::Invalid("crt_support is not implemented by this runtime"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = HostConfig::load(Path::new("/nonexistent/path.toml")).unwrap();
        assert!(!cfg.tolerate_unresolved_imports);
    }

    #[test]
    fn crt_support_is_rejected() {
        let mut cfg = HostConfig::default();
        cfg.crt_support = true;
        assert!(cfg.validate().is_err());
    }
}
