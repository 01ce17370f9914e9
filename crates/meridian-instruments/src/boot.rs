//! Shared bootstrap for the daemon binaries.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use meridian_core::config::{ConfigError, ObservatoryConfig};

/// Command line shared by every hardware daemon.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct DaemonArgs {
    /// Path to the observatory TOML config. Environment variables prefixed
    /// with MERIDIAN_ override it.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl DaemonArgs {
    pub fn load_config(&self) -> Result<ObservatoryConfig, ConfigError> {
        ObservatoryConfig::load(self.config.as_deref())
    }
}

pub fn init_tracing(default_directive: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();
}
