use thiserror::Error;

use meridian_proto::{DaemonId, DaemonStatus};

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("daemon {daemon} is not in the registry")]
    Unregistered { daemon: DaemonId },

    /// `start` found the daemon alive but unhealthy. Starting again would
    /// mask the existing problem, so it is surfaced instead.
    #[error("daemon {daemon} is already running with status: {status}")]
    AlreadyUnhealthy {
        daemon: DaemonId,
        status: DaemonStatus,
    },

    #[error("failed to spawn {daemon}: {source}")]
    SpawnFailed {
        daemon: DaemonId,
        #[source]
        source: std::io::Error,
    },

    /// The spawned process exited before becoming responsive.
    #[error("daemon {daemon} exited immediately after spawn")]
    ExitedEarly { daemon: DaemonId },

    #[error("daemon {daemon} did not become responsive within {timeout_secs}s")]
    StartTimeout { daemon: DaemonId, timeout_secs: u64 },

    #[error("daemon {daemon} still running after graceful shutdown window")]
    ShutdownTimeout { daemon: DaemonId },

    #[error("daemon {daemon} survived SIGKILL")]
    KillTimeout { daemon: DaemonId },

    #[error("signal to {daemon} failed: {source}")]
    Signal {
        daemon: DaemonId,
        #[source]
        source: nix::Error,
    },
}
