//! Pilot errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for pilot operations.
pub type Result<T> = std::result::Result<T, PilotError>;

/// Errors raised by the pilot itself.
///
/// Monitor and executor failures stay inside the watch tasks; they are
/// logged and retried, never surfaced here.
#[derive(Error, Debug)]
pub enum PilotError {
    /// An observing script is already running.
    #[error("script {current:?} is already running")]
    ScriptBusy { current: String },

    /// The named script does not exist in the script directory.
    #[error("no script named {name:?} in {dir}")]
    ScriptNotFound { name: String, dir: PathBuf },

    /// The script process could not be spawned.
    #[error("failed to spawn script: {0}")]
    Spawn(#[source] std::io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] meridian_core::ConfigError),
}
