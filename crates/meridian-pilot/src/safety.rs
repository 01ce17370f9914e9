//! Site safety: emergency shutdown and the covers watchdog.
//!
//! An emergency drives the site to its safe state: observing script
//! cancelled, exposure aborted, covers closed, sensors warming. Mode
//! changes go through the shared mode map so the monitors keep
//! enforcing the safe state afterwards; the direct RPCs here just make
//! it happen now rather than on the next watch cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use meridian_core::config::RpcConfig;
use meridian_core::DaemonRegistry;
use meridian_daemon::{DaemonClient, DaemonError};
use meridian_monitor::Mode;
use meridian_proto::{CoverPosition, DaemonId, Request, RpcError, SubsystemInfo, UnitId};

use crate::notify::Notifier;
use crate::script::ScriptRunner;
use crate::watch::{EmergencyRequest, ModeCommands, MonitorStates};

pub struct SafetyController {
    registry: Arc<DaemonRegistry>,
    rpc: RpcConfig,
    units: Vec<UnitId>,
    warm_temperature: f64,
    script: ScriptRunner,
    modes: ModeCommands,
    states: MonitorStates,
    notifier: Arc<dyn Notifier>,
    in_progress: AtomicBool,
}

impl SafetyController {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        registry: Arc<DaemonRegistry>,
        rpc: RpcConfig,
        units: Vec<UnitId>,
        warm_temperature: f64,
        script: ScriptRunner,
        modes: ModeCommands,
        states: MonitorStates,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            rpc,
            units,
            warm_temperature,
            script,
            modes,
            states,
            notifier,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Drives the site to its safe state.
    ///
    /// Idempotent while one is underway; concurrent requests are dropped.
    pub async fn emergency_shutdown(&self, reason: &str) {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!(reason, "emergency already underway, ignoring");
            return;
        }

        self.notifier.emergency(reason).await;
        self.script.cancel().await;

        // The monitors enforce these from the next cycle on.
        self.modes.insert(DaemonId::Cam, Mode::Warm);
        self.modes.insert(DaemonId::Covers, Mode::Closed);

        // An idle camera refuses the abort; that is fine.
        self.command(DaemonId::Cam, Request::AbortExposure { units: Vec::new() })
            .await;
        self.command(
            DaemonId::Covers,
            Request::CloseCovers {
                units: self.units.clone(),
            },
        )
        .await;
        self.command(
            DaemonId::Cam,
            Request::SetTemperature {
                units: self.units.clone(),
                target: self.warm_temperature,
            },
        )
        .await;

        info!(reason, "emergency shutdown issued");
        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// Re-issues a close while the covers are meant to be closed but a
    /// unit sits open and not moving. Covers conditions carry an
    /// activation delay in the monitor; this closes the gap for units
    /// that stall half way.
    pub async fn covers_watchdog(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.confirm_covers_closed().await;
        }
    }

    async fn confirm_covers_closed(&self) {
        let wants_closed = self
            .states
            .get(&DaemonId::Covers)
            .is_some_and(|state| state.mode == Mode::Closed);
        if !wants_closed {
            return;
        }

        let Ok(client) = DaemonClient::from_registry(&self.registry, DaemonId::Covers, &self.rpc)
        else {
            return;
        };
        let Ok(snapshot) = client.get_info(false).await else {
            return;
        };
        let SubsystemInfo::Covers(info) = snapshot.payload else {
            return;
        };

        let stuck: Vec<UnitId> = info
            .units
            .iter()
            .filter(|unit| unit.position != CoverPosition::Closed && !unit.moving)
            .map(|unit| unit.unit)
            .collect();
        if !stuck.is_empty() {
            warn!(?stuck, "covers open while mode is closed, re-issuing close");
            self.command(DaemonId::Covers, Request::CloseCovers { units: stuck })
                .await;
        }
    }

    async fn command(&self, daemon: DaemonId, request: Request) {
        let client = match DaemonClient::from_registry(&self.registry, daemon, &self.rpc) {
            Ok(client) => client,
            Err(err) => {
                warn!(%daemon, %err, "cannot reach daemon");
                return;
            }
        };
        match client.command(request).await {
            Ok(ack) => info!(%daemon, ack, "safety command accepted"),
            Err(DaemonError::Rpc(RpcError::WrongState(state))) => {
                debug!(%daemon, state, "safety command not applicable");
            }
            Err(err) => warn!(%daemon, %err, "safety command failed"),
        }
    }
}

/// Consumes emergency requests from the watch tasks.
pub async fn emergency_listener(
    controller: Arc<SafetyController>,
    mut requests: mpsc::Receiver<EmergencyRequest>,
) {
    while let Some(request) = requests.recv().await {
        let reason = format!("recovery for {} exhausted on {}", request.daemon, request.kind);
        controller.emergency_shutdown(&reason).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dashmap::DashMap;

    use meridian_core::config::ObservatoryConfig;
    use meridian_monitor::ErrorKind;
    use meridian_proto::DaemonStatus;

    use crate::watch::MonitorSnapshot;

    use super::*;

    #[derive(Default)]
    struct RecordingNotifier {
        emergencies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn error_appeared(&self, _daemon: DaemonId, _kind: ErrorKind) {}
        async fn error_fixed(&self, _daemon: DaemonId, _kind: ErrorKind) {}
        async fn recovery_exhausted(&self, _daemon: DaemonId, _kind: ErrorKind) {}
        async fn emergency(&self, reason: &str) {
            self.emergencies.lock().unwrap().push(reason.to_owned());
        }
    }

    fn rig(script_dir: std::path::PathBuf) -> (Arc<SafetyController>, Arc<RecordingNotifier>, ScriptRunner, ModeCommands) {
        let config = ObservatoryConfig::default();
        let registry = Arc::new(DaemonRegistry::from_config(&config));
        let script = ScriptRunner::new(script_dir);
        let modes: ModeCommands = Arc::new(DashMap::new());
        let states: MonitorStates = Arc::new(DashMap::new());
        states.insert(
            DaemonId::Covers,
            MonitorSnapshot {
                daemon: DaemonId::Covers,
                mode: Mode::Closed,
                status: DaemonStatus::Running,
                errors: Vec::new(),
                exhausted: false,
            },
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = Arc::new(SafetyController::new(
            registry,
            config.rpc.clone(),
            config.units.clone(),
            config.camera.warm_temperature,
            script.clone(),
            modes.clone(),
            states,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        ));
        (controller, notifier, script, modes)
    }

    #[tokio::test]
    async fn emergency_cancels_the_script_and_sets_safe_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.sh");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        let (controller, notifier, script, modes) = rig(dir.path().to_path_buf());
        script.start("long.sh").unwrap();

        // The daemons are not up; the direct RPCs fail and are logged,
        // the rest of the sequence still runs.
        controller.emergency_shutdown("test").await;

        assert_eq!(notifier.emergencies.lock().unwrap().as_slice(), ["test"]);
        assert!(!script.is_running());
        assert_eq!(*modes.get(&DaemonId::Cam).unwrap(), Mode::Warm);
        assert_eq!(*modes.get(&DaemonId::Covers).unwrap(), Mode::Closed);
    }

    #[tokio::test]
    async fn listener_formats_the_reason() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, notifier, _script, _modes) = rig(dir.path().to_path_buf());

        let (tx, rx) = mpsc::channel(1);
        tx.send(EmergencyRequest {
            daemon: DaemonId::Covers,
            kind: ErrorKind::NotRunning,
        })
        .await
        .unwrap();
        drop(tx);
        emergency_listener(controller, rx).await;

        assert_eq!(
            notifier.emergencies.lock().unwrap().as_slice(),
            ["recovery for covers exhausted on not_running"]
        );
    }
}
