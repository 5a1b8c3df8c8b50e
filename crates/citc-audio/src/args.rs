//! CLI surface (SPEC_FULL.md §1 "Configuration"), styled on
//! `citc_compositor::args::Args`: a `clap`-derived struct whose `Option`
//! fields override the TOML config loaded via `load_config`.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{AudioConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(name = "citc-audio")]
#[command(author = "CITC Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CITC PCM mixing server", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/citc/audio.toml")]
    pub config: PathBuf,

    /// Listening socket path override
    #[arg(long)]
    pub socket: Option<String>,

    /// Output sink device override
    #[arg(long)]
    pub device: Option<String>,

    /// Mix tick interval override, in milliseconds
    #[arg(long)]
    pub mix_interval_ms: Option<u64>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<AudioConfig, ConfigError> {
        let mut config = AudioConfig::load(&self.config)?;
        if let Some(socket) = &self.socket {
            config.socket_path = socket.clone();
        }
        if let Some(device) = &self.device {
            config.sink_device = device.clone();
        }
        if let Some(ms) = self.mix_interval_ms {
            config.mix_interval_ms = ms;
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        config.validate()?;
        Ok(config)
    }
}
