//! CLI surface, styled on `citc_compositor::args::Args`: a `clap`-derived
//! struct whose `Option`/flag fields override the TOML config loaded via
//! `load_config`.

use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigError, HostConfig};

#[derive(Parser, Debug)]
#[command(name = "wcl-host")]
#[command(author = "CITC Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Boots a Windows PE under the WCL compatibility runtime", long_about = None)]
pub struct Args {
    /// Path to the PE image to load and run
    pub image: PathBuf,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/citc/wcl-host.toml")]
    pub config: PathBuf,

    /// Leave unresolved imports as null pointers instead of aborting the load
    #[arg(long)]
    pub tolerate_unresolved: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<HostConfig, ConfigError> {
        let mut config = HostConfig::load(&self.config)?;
        if self.tolerate_unresolved {
            config.tolerate_unresolved_imports = true;
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        config.validate()?;
        Ok(config)
    }
}
