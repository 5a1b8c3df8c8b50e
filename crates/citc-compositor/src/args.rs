//! CLI surface (SPEC_FULL.md §1 "Configuration"), styled on the
//! teacher's `args.rs`: a `clap`-derived struct whose `Option` fields
//! override the TOML config loaded via `load_config`.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{CompositorConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(name = "citc-compositor")]
#[command(author = "CITC Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CITC display compositor", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/citc/compositor.toml")]
    pub config: PathBuf,

    /// Screen width override
    #[arg(long)]
    pub width: Option<u32>,

    /// Screen height override
    #[arg(long)]
    pub height: Option<u32>,

    /// CDP listening socket path override
    #[arg(long)]
    pub socket: Option<String>,

    /// evdev input device path, repeatable
    #[arg(long = "input-device")]
    pub input_devices: Vec<String>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<CompositorConfig, ConfigError> {
        let mut config = CompositorConfig::load(&self.config)?;
        if let Some(w) = self.width {
            config.screen_w = w;
        }
        if let Some(h) = self.height {
            config.screen_h = h;
        }
        if let Some(socket) = &self.socket {
            config.socket_path = socket.clone();
        }
        if !self.input_devices.is_empty() {
            config.input_devices = self.input_devices.clone();
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        config.validate()?;
        Ok(config)
    }
}
