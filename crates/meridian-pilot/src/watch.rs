//! Per-daemon watch tasks.
//!
//! One task per hardware daemon. Each cycle it observes the daemon from
//! outside, feeds the observation to its [`Monitor`], notifies on error
//! edges, executes whatever recovery rung is due and publishes the
//! result for the status API. Exhausted recovery escalates to an
//! emergency shutdown request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use meridian_core::config::{MonitorConfig, RpcConfig};
use meridian_core::{DaemonRegistry, DaemonSpec};
use meridian_daemon::DaemonClient;
use meridian_monitor::{
    ActionExecutor, CheckReport, ErrorKind, Mode, Monitor, MonitorError, MonitorStrategy,
    Observation,
};
use meridian_proto::{DaemonId, DaemonStatus};
use meridian_supervisor::{RpcProbe, StatusProbe};

use crate::notify::Notifier;

/// What the status API publishes about one monitored daemon.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub daemon: DaemonId,
    pub mode: Mode,
    pub status: DaemonStatus,
    pub errors: Vec<ErrorKind>,
    pub exhausted: bool,
}

/// Shared view of every monitor, keyed by daemon.
pub type MonitorStates = Arc<DashMap<DaemonId, MonitorSnapshot>>;

/// Pending mode changes, picked up by each watch task at the top of its
/// next cycle. Keeps the monitors single-owner.
pub type ModeCommands = Arc<DashMap<DaemonId, Mode>>;

/// Sent when a monitor has run out of recovery rungs.
#[derive(Debug, Clone, Copy)]
pub struct EmergencyRequest {
    pub daemon: DaemonId,
    pub kind: ErrorKind,
}

/// Produces the outside view of a daemon for one check cycle.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn observe(&self, spec: &DaemonSpec) -> Observation;
}

/// The real observer: status probe, then a snapshot over RPC.
pub struct RpcObserver {
    probe: RpcProbe,
    registry: Arc<DaemonRegistry>,
    rpc: RpcConfig,
}

impl RpcObserver {
    #[must_use]
    pub fn new(registry: Arc<DaemonRegistry>, rpc: RpcConfig) -> Self {
        Self {
            probe: RpcProbe::new(rpc.clone()),
            registry,
            rpc,
        }
    }
}

#[async_trait]
impl Observer for RpcObserver {
    async fn observe(&self, spec: &DaemonSpec) -> Observation {
        let status = self.probe.probe(spec).await;
        // No point asking a dead or deaf daemon for its snapshot.
        let snapshot = match status {
            DaemonStatus::NotRunning | DaemonStatus::Unresponsive => None,
            _ => match DaemonClient::from_registry(&self.registry, spec.id, &self.rpc) {
                Ok(client) => client.get_info(false).await.ok(),
                Err(_) => None,
            },
        };
        Observation { status, snapshot }
    }
}

pub struct WatchTask<S: MonitorStrategy> {
    monitor: Monitor<S>,
    spec: DaemonSpec,
    observer: Arc<dyn Observer>,
    executor: Arc<dyn ActionExecutor>,
    notifier: Arc<dyn Notifier>,
    states: MonitorStates,
    modes: ModeCommands,
    config: MonitorConfig,
    emergency: mpsc::Sender<EmergencyRequest>,
    /// Last cycle on which anything was wrong; drives the cadence.
    last_bad: Option<Instant>,
}

impl<S: MonitorStrategy> WatchTask<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        monitor: Monitor<S>,
        spec: DaemonSpec,
        observer: Arc<dyn Observer>,
        executor: Arc<dyn ActionExecutor>,
        notifier: Arc<dyn Notifier>,
        states: MonitorStates,
        modes: ModeCommands,
        config: MonitorConfig,
        emergency: mpsc::Sender<EmergencyRequest>,
    ) -> Self {
        Self {
            monitor,
            spec,
            observer,
            executor,
            notifier,
            states,
            modes,
            config,
            emergency,
            last_bad: None,
        }
    }

    pub async fn run(mut self) {
        let daemon = self.spec.id;
        info!(%daemon, "watch task started");
        loop {
            let interval = self.step(Instant::now()).await;
            tokio::time::sleep(interval).await;
        }
    }

    /// One watch cycle. Returns how long to wait before the next one.
    async fn step(&mut self, now: Instant) -> Duration {
        let daemon = self.spec.id;

        if let Some((_, mode)) = self.modes.remove(&daemon) {
            if let Err(err) = self.monitor.set_mode(mode) {
                warn!(%daemon, %err, "mode change refused");
            }
        }

        let observation = self.observer.observe(&self.spec).await;
        let report = self.monitor.check(&observation, now);

        for kind in &report.appeared {
            self.notifier.error_appeared(daemon, *kind).await;
        }
        for kind in &report.fixed {
            self.notifier.error_fixed(daemon, *kind).await;
        }

        if !report.is_clear() {
            match self.monitor.recover(now) {
                Ok(Some(action)) => {
                    info!(%daemon, %action, "recovery action");
                    if let Err(err) = self.executor.execute(&action).await {
                        warn!(%daemon, %err, "recovery action failed");
                    }
                }
                Ok(None) => {}
                Err(MonitorError::RecoveryExhausted { kind, .. }) => {
                    self.notifier.recovery_exhausted(daemon, kind).await;
                    if self.emergency.send(EmergencyRequest { daemon, kind }).await.is_err() {
                        warn!(%daemon, "emergency channel closed");
                    }
                }
                Err(err) => warn!(%daemon, %err, "recovery refused"),
            }
        }

        self.publish(&observation, &report);

        // Tight cadence while anything is wrong, relaxing only after a
        // clean stretch.
        if !report.is_clear() {
            self.last_bad = Some(now);
        }
        match self.last_bad {
            Some(at) if now.duration_since(at) < self.config.revert_after => {
                self.config.bad_interval
            }
            _ => self.config.good_interval,
        }
    }

    fn publish(&self, observation: &Observation, report: &CheckReport) {
        let daemon = self.spec.id;
        self.states.insert(
            daemon,
            MonitorSnapshot {
                daemon,
                mode: self.monitor.mode(),
                status: observation.status.clone(),
                errors: report.active.clone(),
                exhausted: self.monitor.is_exhausted(),
            },
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use meridian_core::config::ObservatoryConfig;
    use meridian_monitor::{Detected, ExecutorError, LifecycleOp, RecoveryAction, RecoveryLadder};
    use meridian_proto::{CoversInfo, StatusSnapshot, SubsystemInfo};

    use super::*;

    /// Always reports the given status; healthy observations carry a
    /// fresh covers snapshot with advancing time.
    struct FixedObserver {
        status: DaemonStatus,
        time_ns: AtomicU64,
    }

    impl FixedObserver {
        fn new(status: DaemonStatus) -> Self {
            Self { status, time_ns: AtomicU64::new(1) }
        }
    }

    #[async_trait]
    impl Observer for FixedObserver {
        async fn observe(&self, spec: &DaemonSpec) -> Observation {
            let snapshot = match self.status {
                DaemonStatus::NotRunning | DaemonStatus::Unresponsive => None,
                _ => Some(StatusSnapshot {
                    daemon_id: spec.id,
                    time_ns: self.time_ns.fetch_add(1, Ordering::Relaxed),
                    uptime_secs: 60,
                    payload: SubsystemInfo::Covers(CoversInfo { units: Vec::new() }),
                }),
            };
            Observation { status: self.status.clone(), snapshot }
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        actions: Mutex<Vec<RecoveryAction>>,
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &RecoveryAction) -> Result<(), ExecutorError> {
            self.actions.lock().unwrap().push(action.clone());
            Ok(())
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn error_appeared(&self, _daemon: DaemonId, _kind: ErrorKind) {}
        async fn error_fixed(&self, _daemon: DaemonId, _kind: ErrorKind) {}
        async fn recovery_exhausted(&self, _daemon: DaemonId, _kind: ErrorKind) {}
        async fn emergency(&self, _reason: &str) {}
    }

    struct IdleStrategy;

    impl MonitorStrategy for IdleStrategy {
        fn daemon_id(&self) -> DaemonId {
            DaemonId::Covers
        }

        fn available_modes(&self) -> &'static [Mode] {
            &[Mode::Active]
        }

        fn default_mode(&self) -> Mode {
            Mode::Active
        }

        fn inspect(&self, _snapshot: &StatusSnapshot, _mode: Mode) -> Vec<Detected> {
            Vec::new()
        }

        fn ladder(&self, _kind: ErrorKind) -> RecoveryLadder {
            Vec::new()
        }
    }

    fn rig(
        status: DaemonStatus,
    ) -> (
        WatchTask<IdleStrategy>,
        Arc<RecordingExecutor>,
        MonitorStates,
        ModeCommands,
        mpsc::Receiver<EmergencyRequest>,
    ) {
        let config = ObservatoryConfig::default();
        let registry = DaemonRegistry::from_config(&config);
        let spec = registry.get(DaemonId::Covers).unwrap();
        let executor = Arc::new(RecordingExecutor::default());
        let states: MonitorStates = Arc::new(DashMap::new());
        let modes: ModeCommands = Arc::new(DashMap::new());
        let (tx, rx) = mpsc::channel(8);
        let task = WatchTask::new(
            Monitor::new(IdleStrategy),
            spec,
            Arc::new(FixedObserver::new(status)),
            Arc::clone(&executor) as Arc<dyn ActionExecutor>,
            Arc::new(SilentNotifier),
            states.clone(),
            modes.clone(),
            config.monitor.clone(),
            tx,
        );
        (task, executor, states, modes, rx)
    }

    #[tokio::test]
    async fn a_dead_daemon_gets_a_start_and_the_tight_cadence() {
        let (mut task, executor, states, _modes, _rx) = rig(DaemonStatus::NotRunning);

        let interval = task.step(Instant::now()).await;
        assert_eq!(interval, task.config.bad_interval);

        let actions = executor.actions.lock().unwrap().clone();
        assert_eq!(
            actions,
            vec![RecoveryAction::Lifecycle {
                daemon: DaemonId::Covers,
                op: LifecycleOp::Start,
            }]
        );

        let published = states.get(&DaemonId::Covers).unwrap();
        assert_eq!(published.errors, vec![ErrorKind::NotRunning]);
        assert!(!published.exhausted);
    }

    #[tokio::test]
    async fn exhausted_recovery_requests_an_emergency_exactly_once() {
        let (mut task, executor, _states, _modes, mut rx) = rig(DaemonStatus::NotRunning);

        // Walk the whole process ladder, stepping past every settle time.
        let mut now = Instant::now();
        for _ in 0..6 {
            task.step(now).await;
            now += Duration::from_secs(120);
        }

        let ops: Vec<_> = executor
            .actions
            .lock()
            .unwrap()
            .iter()
            .map(|action| match action {
                RecoveryAction::Lifecycle { op, .. } => *op,
                RecoveryAction::Rpc { .. } => panic!("unexpected rpc action"),
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                LifecycleOp::Start,
                LifecycleOp::Restart,
                LifecycleOp::Kill,
                LifecycleOp::Start,
            ]
        );

        let request = rx.try_recv().unwrap();
        assert_eq!(request.daemon, DaemonId::Covers);
        assert_eq!(request.kind, ErrorKind::NotRunning);
        // Later cycles stay quiet.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cadence_relaxes_after_a_clean_stretch() {
        let (mut task, _executor, states, _modes, _rx) = rig(DaemonStatus::Running);

        let mut now = Instant::now();
        let interval = task.step(now).await;
        assert_eq!(interval, task.config.good_interval);

        // A bad cycle tightens, and it stays tight until revert_after of
        // clean checks has passed.
        task.last_bad = Some(now);
        now += Duration::from_secs(10);
        assert_eq!(task.step(now).await, task.config.bad_interval);
        now += task.config.revert_after;
        assert_eq!(task.step(now).await, task.config.good_interval);

        assert!(states.get(&DaemonId::Covers).unwrap().errors.is_empty());
    }

    #[tokio::test]
    async fn pending_mode_commands_are_applied() {
        let (mut task, _executor, states, modes, _rx) = rig(DaemonStatus::Running);

        modes.insert(DaemonId::Covers, Mode::Active);
        task.step(Instant::now()).await;
        assert!(modes.get(&DaemonId::Covers).is_none());
        assert_eq!(states.get(&DaemonId::Covers).unwrap().mode, Mode::Active);
    }
}
