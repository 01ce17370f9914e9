//! Pidfile handling.
//!
//! Each daemon writes its pid on startup and removes the file on clean
//! shutdown. Liveness checks combine the pidfile with a signal-0 probe, so
//! a stale file left by a crash does not count as a running daemon.

use std::path::{Path, PathBuf};

use crate::error::{DaemonError, Result};

/// A written pidfile, removed on drop.
#[derive(Debug)]
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Writes the current process id to `path`.
    pub fn write(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DaemonError::Pidfile)?;
        }
        std::fs::write(&path, format!("{}\n", std::process::id())).map_err(DaemonError::Pidfile)?;
        Ok(Self { path })
    }

    /// Reads the pid recorded in a pidfile, if the file exists and parses.
    #[must_use]
    pub fn read(path: &Path) -> Option<i32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
