//! Outside-view status probing.

use async_trait::async_trait;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

use meridian_core::config::RpcConfig;
use meridian_core::DaemonSpec;
use meridian_daemon::{DaemonClient, Pidfile};
use meridian_proto::DaemonStatus;

/// Whether a pid refers to a live process.
#[must_use]
pub fn pid_alive(pid: i32) -> bool {
    nix::sys::signal::kill(Pid::from_raw(pid), None::<Signal>).is_ok()
}

/// Judges a daemon's status from outside its process.
///
/// A trait so the recovery engine and tests can substitute canned
/// observations for real pidfiles and sockets.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, spec: &DaemonSpec) -> DaemonStatus;
}

/// The real probe: pidfile, signal 0, then RPC.
#[derive(Debug, Clone)]
pub struct RpcProbe {
    rpc: RpcConfig,
}

impl RpcProbe {
    #[must_use]
    pub fn new(rpc: RpcConfig) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl StatusProbe for RpcProbe {
    async fn probe(&self, spec: &DaemonSpec) -> DaemonStatus {
        // A stale pidfile left by a crash reads as not running.
        match Pidfile::read(&spec.pidfile) {
            Some(pid) if pid_alive(pid) => {}
            _ => return DaemonStatus::NotRunning,
        }

        let client = DaemonClient::new(spec.id, spec.transport.clone(), &self.rpc);
        match client.get_status().await {
            Ok(status) => status,
            Err(_) => DaemonStatus::Unresponsive,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id() as i32));
    }

    #[test]
    fn recycled_pid_space_upper_bound_is_dead() {
        // Linux caps pids well below i32::MAX.
        assert!(!pid_alive(i32::MAX - 1));
    }
}
