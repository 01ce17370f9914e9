//! Observing script execution.
//!
//! One script at a time. The pilot spawns the named executable from the
//! configured script directory, streams its output into the log and
//! records the pid so an emergency can cancel it.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{PilotError, Result};

/// How long a cancelled script gets to exit on SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct Running {
    name: String,
    pid: i32,
}

/// Launches and cancels observing scripts.
///
/// Cloning shares the single-script slot.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script_dir: PathBuf,
    current: Arc<Mutex<Option<Running>>>,
}

fn slot_lock(slot: &Mutex<Option<Running>>) -> MutexGuard<'_, Option<Running>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptRunner {
    #[must_use]
    pub fn new(script_dir: PathBuf) -> Self {
        Self {
            script_dir,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Name of the script currently running, if any.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        slot_lock(&self.current).as_ref().map(|r| r.name.clone())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        slot_lock(&self.current).is_some()
    }

    /// Spawns `name` from the script directory.
    ///
    /// Fails if a script is already running or the file does not exist.
    /// The process runs detached from the caller; completion is logged
    /// and clears the slot.
    pub fn start(&self, name: &str) -> Result<()> {
        let path = self.script_dir.join(name);
        if !path.is_file() {
            return Err(PilotError::ScriptNotFound {
                name: name.to_owned(),
                dir: self.script_dir.clone(),
            });
        }

        let mut slot = slot_lock(&self.current);
        if let Some(running) = slot.as_ref() {
            return Err(PilotError::ScriptBusy {
                current: running.name.clone(),
            });
        }

        let mut child = Command::new(&path)
            .current_dir(&self.script_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(PilotError::Spawn)?;

        let pid = child.id().map_or(-1, |id| id as i32);
        info!(script = name, pid, "script started");

        if let Some(out) = child.stdout.take() {
            tokio::spawn(stream_lines(out, name.to_owned(), false));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(stream_lines(err, name.to_owned(), true));
        }

        let current = Arc::clone(&self.current);
        let name = name.to_owned();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(script = %name, %status, "script finished"),
                Err(err) => warn!(script = %name, %err, "script wait failed"),
            }
            *slot_lock(&current) = None;
        });

        *slot = Some(Running { name: path_name(&path), pid });
        Ok(())
    }

    /// Cancels the running script, if any.
    ///
    /// SIGTERM first; SIGKILL if the process is still there after the
    /// grace period.
    pub async fn cancel(&self) {
        let running = slot_lock(&self.current).as_ref().map(|r| (r.name.clone(), r.pid));
        let Some((name, pid)) = running else {
            return;
        };

        info!(script = %name, pid, "cancelling script");
        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);

        let deadline = Instant::now() + TERM_GRACE;
        while Instant::now() < deadline {
            if slot_lock(&self.current).is_none() {
                return;
            }
            tokio::time::sleep(CANCEL_POLL).await;
        }

        warn!(script = %name, pid, "script ignored SIGTERM, killing");
        let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

fn path_name(path: &std::path::Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

async fn stream_lines<R: AsyncRead + Unpin>(reader: R, script: String, is_err: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_err {
            warn!(script = %script, "{line}");
        } else {
            info!(script = %script, "{line}");
        }
    }
}
