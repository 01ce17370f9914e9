//! Lifecycle operations over registry-described daemons.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::time::Instant;
use tracing::{info, warn};

use meridian_core::config::{RpcConfig, SupervisorConfig};
use meridian_core::{DaemonRegistry, DaemonSpec};
use meridian_daemon::{DaemonClient, Pidfile};
use meridian_proto::{DaemonId, DaemonStatus};

use crate::error::{Result, SupervisorError};
use crate::probe::{pid_alive, StatusProbe};

/// Delay after spawn before checking for an immediate exit.
const PROCESS_START_DELAY: Duration = Duration::from_millis(200);

/// Poll interval while waiting for a daemon to appear or disappear.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Starts, stops and restarts daemons by identity.
pub struct Supervisor<P: StatusProbe> {
    registry: Arc<DaemonRegistry>,
    probe: P,
    config: SupervisorConfig,
    rpc: RpcConfig,
}

impl<P: StatusProbe> Supervisor<P> {
    pub fn new(
        registry: Arc<DaemonRegistry>,
        probe: P,
        config: SupervisorConfig,
        rpc: RpcConfig,
    ) -> Self {
        Self {
            registry,
            probe,
            config,
            rpc,
        }
    }

    fn spec(&self, daemon: DaemonId) -> Result<DaemonSpec> {
        self.registry
            .get(daemon)
            .ok_or(SupervisorError::Unregistered { daemon })
    }

    /// Current status as seen from outside the daemon.
    pub async fn status(&self, daemon: DaemonId) -> Result<DaemonStatus> {
        let spec = self.spec(daemon)?;
        Ok(self.probe.probe(&spec).await)
    }

    /// Starts a daemon if it is not already running.
    ///
    /// A healthy running daemon makes this a no-op. A running-but-unhealthy
    /// daemon is an error: spawning a second copy would fight the first over
    /// the endpoint and hide whatever is actually wrong.
    pub async fn start(&self, daemon: DaemonId) -> Result<DaemonStatus> {
        let spec = self.spec(daemon)?;
        match self.probe.probe(&spec).await {
            DaemonStatus::Running => {
                info!(%daemon, "already running");
                return Ok(DaemonStatus::Running);
            }
            DaemonStatus::NotRunning => {}
            status => {
                return Err(SupervisorError::AlreadyUnhealthy { daemon, status });
            }
        }

        info!(%daemon, program = %spec.program, "starting daemon");
        let mut child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed { daemon, source })?;

        // Catch a bad binary or config before the slow poll loop.
        tokio::time::sleep(PROCESS_START_DELAY).await;
        if let Ok(Some(_exit)) = child.try_wait() {
            return Err(SupervisorError::ExitedEarly { daemon });
        }

        let deadline = Instant::now() + self.config.start_timeout;
        loop {
            let status = self.probe.probe(&spec).await;
            match status {
                DaemonStatus::NotRunning | DaemonStatus::Unresponsive => {}
                status => {
                    if !status.is_running() {
                        warn!(%daemon, %status, "daemon started but reports a problem");
                    }
                    return Ok(status);
                }
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::StartTimeout {
                    daemon,
                    timeout_secs: self.config.start_timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Asks a daemon to exit and waits for the process to disappear.
    ///
    /// Never escalates to SIGKILL; a wedged daemon surfaces as
    /// `ShutdownTimeout` and killing stays an explicit, separate decision.
    pub async fn shutdown(&self, daemon: DaemonId) -> Result<()> {
        let spec = self.spec(daemon)?;
        if matches!(self.probe.probe(&spec).await, DaemonStatus::NotRunning) {
            info!(%daemon, "already stopped");
            return Ok(());
        }

        info!(%daemon, "requesting shutdown");
        let client = DaemonClient::new(daemon, spec.transport.clone(), &self.rpc);
        if let Err(e) = client.shutdown().await {
            // The poll below decides whether this mattered.
            warn!(%daemon, error = %e, "shutdown request failed");
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        loop {
            if matches!(self.probe.probe(&spec).await, DaemonStatus::NotRunning) {
                info!(%daemon, "stopped");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::ShutdownTimeout { daemon });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// SIGKILLs a daemon's process and removes its stale pidfile.
    pub async fn kill(&self, daemon: DaemonId) -> Result<()> {
        let spec = self.spec(daemon)?;
        let Some(pid) = Pidfile::read(&spec.pidfile) else {
            info!(%daemon, "no pidfile; nothing to kill");
            return Ok(());
        };
        if !pid_alive(pid) {
            let _ = std::fs::remove_file(&spec.pidfile);
            return Ok(());
        }

        warn!(%daemon, pid, "killing daemon");
        match nix::sys::signal::kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) | Err(nix::Error::ESRCH) => {}
            Err(source) => return Err(SupervisorError::Signal { daemon, source }),
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while pid_alive(pid) {
            if Instant::now() >= deadline {
                return Err(SupervisorError::KillTimeout { daemon });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        // The process never got to clean up after itself.
        let _ = std::fs::remove_file(&spec.pidfile);
        Ok(())
    }

    /// Graceful shutdown, a settle pause, then start.
    pub async fn restart(&self, daemon: DaemonId) -> Result<DaemonStatus> {
        self.shutdown(daemon).await?;
        tokio::time::sleep(self.config.restart_settle).await;
        self.start(daemon).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use meridian_core::config::ObservatoryConfig;
    use std::sync::Mutex;

    /// Probe returning a scripted sequence of observations.
    struct FakeProbe {
        script: Mutex<Vec<DaemonStatus>>,
        last: DaemonStatus,
    }

    impl FakeProbe {
        fn repeating(status: DaemonStatus) -> Self {
            Self {
                script: Mutex::new(Vec::new()),
                last: status,
            }
        }

        fn sequence(mut script: Vec<DaemonStatus>, then: DaemonStatus) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                last: then,
            }
        }
    }

    #[async_trait]
    impl StatusProbe for FakeProbe {
        async fn probe(&self, _spec: &DaemonSpec) -> DaemonStatus {
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| self.last.clone())
        }
    }

    fn supervisor(probe: FakeProbe, run_dir: &std::path::Path) -> Supervisor<FakeProbe> {
        let mut config = ObservatoryConfig::default();
        config.run_dir = run_dir.to_path_buf();
        config.supervisor.start_timeout = Duration::from_millis(400);
        config.supervisor.shutdown_timeout = Duration::from_millis(400);
        config.supervisor.restart_settle = Duration::from_millis(10);
        let registry = Arc::new(DaemonRegistry::from_config(&config));
        Supervisor::new(registry, probe, config.supervisor, config.rpc)
    }

    #[tokio::test]
    async fn start_is_idempotent_when_already_healthy() {
        let dir = tempfile::tempdir().unwrap();
        // The registry names a program that does not exist; if start tried
        // to spawn, it would fail rather than no-op.
        let supervisor = supervisor(FakeProbe::repeating(DaemonStatus::Running), dir.path());
        let status = supervisor.start(DaemonId::Cam).await.unwrap();
        assert_eq!(status, DaemonStatus::Running);
    }

    #[tokio::test]
    async fn start_surfaces_an_existing_problem_instead_of_respawning() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(FakeProbe::repeating(DaemonStatus::Unresponsive), dir.path());
        match supervisor.start(DaemonId::Cam).await {
            Err(SupervisorError::AlreadyUnhealthy { daemon, status }) => {
                assert_eq!(daemon, DaemonId::Cam);
                assert_eq!(status, DaemonStatus::Unresponsive);
            }
            other => panic!("expected AlreadyUnhealthy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_of_a_stopped_daemon_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(FakeProbe::repeating(DaemonStatus::NotRunning), dir.path());
        supervisor.shutdown(DaemonId::Foc).await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_times_out_without_killing() {
        let dir = tempfile::tempdir().unwrap();
        // Daemon acks nothing and never dies.
        let supervisor = supervisor(FakeProbe::repeating(DaemonStatus::Running), dir.path());
        match supervisor.shutdown(DaemonId::Foc).await {
            Err(SupervisorError::ShutdownTimeout { daemon }) => assert_eq!(daemon, DaemonId::Foc),
            other => panic!("expected ShutdownTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_process_to_disappear() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(
            FakeProbe::sequence(
                vec![DaemonStatus::Running, DaemonStatus::Running],
                DaemonStatus::NotRunning,
            ),
            dir.path(),
        );
        supervisor.shutdown(DaemonId::Foc).await.unwrap();
    }

    #[tokio::test]
    async fn kill_reaps_a_real_process_and_cleans_the_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(FakeProbe::repeating(DaemonStatus::Running), dir.path());

        // Stand in for a wedged daemon with a real process we own. Waiting
        // in a task reaps it as soon as the signal lands, so the pid truly
        // disappears rather than lingering as a zombie.
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap() as i32;
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        let pidfile = dir.path().join("cam.pid");
        std::fs::write(&pidfile, format!("{pid}\n")).unwrap();

        supervisor.kill(DaemonId::Cam).await.unwrap();
        assert!(!pid_alive(pid));
        assert!(!pidfile.exists());
    }

    #[tokio::test]
    async fn kill_with_no_pidfile_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(FakeProbe::repeating(DaemonStatus::NotRunning), dir.path());
        supervisor.kill(DaemonId::Covers).await.unwrap();
    }
}
