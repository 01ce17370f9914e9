//! The monitor engine: check and recover, one daemon at a time.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use meridian_proto::{DaemonStatus, StatusSnapshot};

use crate::action::{dependency_ladder, process_ladder, RecoveryAction};
use crate::error::MonitorError;
use crate::error_set::ErrorSet;
use crate::kinds::ErrorKind;
use crate::mode::Mode;
use crate::strategy::MonitorStrategy;

/// One check cycle's raw input, gathered outside the engine.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Outside view: pidfile, signal probe, RPC.
    pub status: DaemonStatus,
    /// Latest snapshot, if one could be fetched.
    pub snapshot: Option<StatusSnapshot>,
}

/// What one check cycle changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Active errors after this check, priority order.
    pub active: Vec<ErrorKind>,
    /// Errors that became active this cycle.
    pub appeared: Vec<ErrorKind>,
    /// Errors that stopped being active this cycle.
    pub fixed: Vec<ErrorKind>,
}

impl CheckReport {
    /// Whether the daemon is fully healthy.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.active.is_empty()
    }
}

/// Watches one daemon and escalates recovery for whatever is wrong.
///
/// Deterministic: both entry points take the clock as an argument and do no
/// I/O. The caller fetches observations and performs returned actions.
pub struct Monitor<S: MonitorStrategy> {
    strategy: S,
    mode: Mode,
    errors: ErrorSet,
    /// Snapshot time seen on the previous check, for freeze detection.
    last_info_time: Option<u64>,
    /// Ladder position for the error currently being recovered.
    rung: usize,
    recovering_from: Option<ErrorKind>,
    last_action_at: Option<Instant>,
    /// Settle time of the most recently issued step.
    settle: Duration,
    exhausted_for: Option<ErrorKind>,
    /// Dependencies named by the last dependency error, recovery targets.
    failed_deps: Vec<meridian_proto::DaemonId>,
    /// Outlets feeding this subsystem's hardware, for the final rung of
    /// dependency recovery.
    power_outlets: Vec<String>,
}

impl<S: MonitorStrategy> Monitor<S> {
    #[must_use]
    pub fn new(strategy: S) -> Self {
        let mode = strategy.default_mode();
        Self {
            strategy,
            mode,
            errors: ErrorSet::new(),
            last_info_time: None,
            rung: 0,
            recovering_from: None,
            last_action_at: None,
            settle: Duration::ZERO,
            exhausted_for: None,
            failed_deps: Vec::new(),
            power_outlets: Vec::new(),
        }
    }

    /// Names the outlets to power back on when dependency recovery runs
    /// out of process-level rungs.
    #[must_use]
    pub fn with_power_outlets(mut self, outlets: Vec<String>) -> Self {
        self.power_outlets = outlets;
        self
    }

    #[must_use]
    pub fn daemon_id(&self) -> meridian_proto::DaemonId {
        self.strategy.daemon_id()
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Changes the target mode, if the subsystem supports it.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), MonitorError> {
        if !self.strategy.available_modes().contains(&mode) {
            return Err(MonitorError::InvalidMode {
                daemon: self.strategy.daemon_id(),
                mode,
            });
        }
        if mode != self.mode {
            info!(daemon = %self.strategy.daemon_id(), %mode, "mode changed");
            self.mode = mode;
        }
        Ok(())
    }

    /// Currently active errors, priority order.
    #[must_use]
    pub fn active_errors(&self) -> Vec<ErrorKind> {
        self.errors.active()
    }

    /// Whether recovery has given up on the current error.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted_for.is_some()
    }

    /// Folds one observation into the error set.
    ///
    /// The meta checks run in strict order and the first failure wins,
    /// replacing the whole set: a daemon that is not running has exactly
    /// one problem worth stating. Only a fully responsive daemon gets its
    /// snapshot inspected for subsystem conditions.
    pub fn check(&mut self, observation: &Observation, now: Instant) -> CheckReport {
        let before = self.errors.active();

        let critical = self.meta_check(observation);
        match critical {
            Some(kind) => self.errors.report_critical(kind),
            None => {
                // Unwrap-free: meta_check only returns None with a snapshot present.
                if let Some(snapshot) = &observation.snapshot {
                    let detections = self.strategy.inspect(snapshot, self.mode);
                    let kinds: Vec<ErrorKind> = detections.iter().map(|d| d.kind).collect();
                    self.errors.retain(&kinds);
                    for detected in detections {
                        self.errors.report(detected.kind, detected.delay, now);
                    }
                }
            }
        }

        if self.errors.is_clear() {
            self.rung = 0;
            self.recovering_from = None;
            self.last_action_at = None;
            self.exhausted_for = None;
        }

        let after = self.errors.active();
        let appeared: Vec<_> = after.iter().copied().filter(|k| !before.contains(k)).collect();
        let fixed: Vec<_> = before.iter().copied().filter(|k| !after.contains(k)).collect();
        CheckReport {
            active: after,
            appeared,
            fixed,
        }
    }

    fn meta_check(&mut self, observation: &Observation) -> Option<ErrorKind> {
        match &observation.status {
            DaemonStatus::NotRunning => return Some(ErrorKind::NotRunning),
            DaemonStatus::Unresponsive => return Some(ErrorKind::PingFailed),
            DaemonStatus::DependencyError { daemons } => {
                self.failed_deps = daemons.clone();
                return Some(ErrorKind::DependencyFailed);
            }
            DaemonStatus::HardwareError { .. } => return Some(ErrorKind::HardwareFailed),
            DaemonStatus::Stale { .. } => return Some(ErrorKind::InfoFailed),
            DaemonStatus::Running => {}
        }

        let Some(snapshot) = &observation.snapshot else {
            return Some(ErrorKind::InfoFailed);
        };

        // Frozen or regressed snapshot time means the loop died between the
        // status check and now, or the daemon silently restarted.
        let frozen = self
            .last_info_time
            .is_some_and(|seen| snapshot.time_ns <= seen);
        self.last_info_time = Some(snapshot.time_ns);
        if frozen {
            return Some(ErrorKind::InfoFailed);
        }

        if snapshot.daemon_id != self.strategy.daemon_id() {
            return Some(ErrorKind::StatusFailed);
        }

        None
    }

    /// Issues the next recovery action, if one is due.
    ///
    /// Idempotent between escalations: while the last step's settle time is
    /// running, this returns `Ok(None)` no matter how often it is called.
    /// A change of the highest-priority error restarts the ladder for the
    /// new error. Exhaustion is raised exactly once per episode; after
    /// that the monitor stays quiet until the error clears.
    pub fn recover(&mut self, now: Instant) -> Result<Option<RecoveryAction>, MonitorError> {
        let Some(top) = self.errors.top() else {
            return Ok(None);
        };

        if self.exhausted_for == Some(top) {
            return Ok(None);
        }

        if self.recovering_from != Some(top) {
            self.recovering_from = Some(top);
            self.rung = 0;
            self.last_action_at = None;
        }

        if let Some(at) = self.last_action_at {
            if now.duration_since(at) < self.settle {
                return Ok(None);
            }
        }

        let daemon = self.strategy.daemon_id();
        // Restarting the reporter cannot clear a dead dependency; that
        // ladder targets the dependency itself.
        let ladder = if top == ErrorKind::DependencyFailed {
            match self.failed_deps.first() {
                Some(&dependency) => dependency_ladder(dependency, &self.power_outlets),
                None => process_ladder(daemon, false),
            }
        } else if top.is_critical() {
            process_ladder(daemon, top == ErrorKind::NotRunning)
        } else {
            self.strategy.ladder(top)
        };

        if self.rung >= ladder.len() {
            warn!(%daemon, error = %top, "recovery ladder exhausted");
            self.exhausted_for = Some(top);
            return Err(MonitorError::RecoveryExhausted { daemon, kind: top });
        }

        let step = ladder[self.rung].clone();
        info!(%daemon, error = %top, rung = self.rung, action = %step.action, "recovery step");
        self.rung += 1;
        self.last_action_at = Some(now);
        self.settle = step.settle;
        Ok(Some(step.action))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::action::{LifecycleOp, RecoveryLadder, RecoveryStep};
    use crate::strategy::Detected;
    use meridian_proto::{
        CoverPosition, CoversInfo, CoversUnitInfo, DaemonId, Request, SubsystemInfo,
    };

    /// Strategy with scripted detections and a fixed two-rung ladder.
    struct TestStrategy {
        detections: Vec<Detected>,
    }

    impl MonitorStrategy for TestStrategy {
        fn daemon_id(&self) -> DaemonId {
            DaemonId::Covers
        }

        fn available_modes(&self) -> &'static [Mode] {
            &[Mode::Closed, Mode::Open]
        }

        fn default_mode(&self) -> Mode {
            Mode::Closed
        }

        fn inspect(&self, _snapshot: &StatusSnapshot, _mode: Mode) -> Vec<Detected> {
            self.detections.clone()
        }

        fn ladder(&self, _kind: ErrorKind) -> RecoveryLadder {
            vec![
                RecoveryStep::new(
                    RecoveryAction::Rpc {
                        daemon: DaemonId::Covers,
                        request: Request::CloseCovers { units: vec![1] },
                    },
                    Duration::from_secs(30),
                ),
                RecoveryStep::new(
                    RecoveryAction::Rpc {
                        daemon: DaemonId::Covers,
                        request: Request::OpenCovers { units: vec![1] },
                    },
                    Duration::from_secs(30),
                ),
            ]
        }
    }

    fn snapshot(time_ns: u64) -> StatusSnapshot {
        StatusSnapshot {
            daemon_id: DaemonId::Covers,
            time_ns,
            uptime_secs: 100,
            payload: SubsystemInfo::Covers(CoversInfo {
                units: vec![CoversUnitInfo {
                    unit: 1,
                    position: CoverPosition::Closed,
                    moving: false,
                }],
            }),
        }
    }

    fn healthy(time_ns: u64) -> Observation {
        Observation {
            status: DaemonStatus::Running,
            snapshot: Some(snapshot(time_ns)),
        }
    }

    fn detected(kind: ErrorKind) -> Detected {
        Detected::new(kind, Duration::ZERO)
    }

    #[test]
    fn meta_checks_take_strict_precedence() {
        // Even with subsystem conditions scripted, a dead daemon reduces
        // the set to exactly NotRunning.
        let mut monitor = Monitor::new(TestStrategy {
            detections: vec![detected(ErrorKind::CoversNotClosed)],
        });
        let report = monitor.check(
            &Observation {
                status: DaemonStatus::NotRunning,
                snapshot: None,
            },
            Instant::now(),
        );
        assert_eq!(report.active, vec![ErrorKind::NotRunning]);
    }

    #[test]
    fn missing_snapshot_is_info_failed() {
        let mut monitor = Monitor::new(TestStrategy { detections: vec![] });
        let report = monitor.check(
            &Observation {
                status: DaemonStatus::Running,
                snapshot: None,
            },
            Instant::now(),
        );
        assert_eq!(report.active, vec![ErrorKind::InfoFailed]);
    }

    #[test]
    fn frozen_snapshot_time_is_info_failed() {
        let mut monitor = Monitor::new(TestStrategy { detections: vec![] });
        let now = Instant::now();

        assert!(monitor.check(&healthy(1_000), now).is_clear());
        // Same snapshot time on the next check: the loop stopped ticking.
        let report = monitor.check(&healthy(1_000), now + Duration::from_secs(30));
        assert_eq!(report.active, vec![ErrorKind::InfoFailed]);
    }

    #[test]
    fn not_running_ladder_starts_with_start() {
        let mut monitor = Monitor::new(TestStrategy { detections: vec![] });
        let now = Instant::now();
        monitor.check(
            &Observation {
                status: DaemonStatus::NotRunning,
                snapshot: None,
            },
            now,
        );

        match monitor.recover(now).unwrap() {
            Some(RecoveryAction::Lifecycle { daemon, op }) => {
                assert_eq!(daemon, DaemonId::Covers);
                assert_eq!(op, LifecycleOp::Start);
            }
            other => panic!("expected lifecycle start, got {other:?}"),
        }
    }

    #[test]
    fn ladder_is_monotonic_gated_by_settle_and_exhausts_once() {
        let mut monitor = Monitor::new(TestStrategy {
            detections: vec![detected(ErrorKind::CoversNotClosed)],
        });
        let t0 = Instant::now();
        monitor.check(&healthy(1), t0);

        // Rung 0 fires.
        let first = monitor.recover(t0).unwrap().unwrap();
        assert!(matches!(first, RecoveryAction::Rpc { .. }));

        // Within the settle window nothing more happens, however often asked.
        assert_eq!(monitor.recover(t0 + Duration::from_secs(1)).unwrap(), None);
        assert_eq!(monitor.recover(t0 + Duration::from_secs(29)).unwrap(), None);

        // After the settle, rung 1.
        let second = monitor
            .recover(t0 + Duration::from_secs(31))
            .unwrap()
            .unwrap();
        assert_ne!(first, second);

        // Both rungs spent: exhaustion raised exactly once.
        let exhausted = monitor.recover(t0 + Duration::from_secs(62));
        assert_eq!(
            exhausted,
            Err(MonitorError::RecoveryExhausted {
                daemon: DaemonId::Covers,
                kind: ErrorKind::CoversNotClosed,
            })
        );
        assert_eq!(monitor.recover(t0 + Duration::from_secs(63)).unwrap(), None);
        assert!(monitor.is_exhausted());
    }

    #[test]
    fn clean_check_resets_the_ladder_and_exhaustion() {
        let mut monitor = Monitor::new(TestStrategy {
            detections: vec![detected(ErrorKind::CoversNotClosed)],
        });
        let t0 = Instant::now();
        monitor.check(&healthy(1), t0);
        monitor.recover(t0).unwrap().unwrap();

        // The error clears: a fresh strategy with no detections.
        let mut monitor2 = Monitor::new(TestStrategy { detections: vec![] });
        std::mem::swap(&mut monitor.strategy, &mut monitor2.strategy);
        let report = monitor.check(&healthy(2), t0 + Duration::from_secs(5));
        assert!(report.is_clear());
        assert_eq!(report.fixed, vec![ErrorKind::CoversNotClosed]);
        assert!(!monitor.is_exhausted());

        // Error returns later: the ladder starts from rung 0 again.
        std::mem::swap(&mut monitor.strategy, &mut monitor2.strategy);
        monitor.check(&healthy(3), t0 + Duration::from_secs(10));
        let again = monitor
            .recover(t0 + Duration::from_secs(10))
            .unwrap()
            .unwrap();
        assert!(matches!(
            again,
            RecoveryAction::Rpc {
                request: Request::CloseCovers { .. },
                ..
            }
        ));
    }

    #[test]
    fn higher_priority_error_restarts_the_ladder() {
        let mut monitor = Monitor::new(TestStrategy {
            detections: vec![detected(ErrorKind::CamReadTimeout)],
        });
        let t0 = Instant::now();
        monitor.check(&healthy(1), t0);
        monitor.recover(t0).unwrap().unwrap();
        let t1 = t0 + Duration::from_secs(31);
        monitor.recover(t1).unwrap().unwrap(); // rung 1 for the low-priority kind

        // A higher-priority kind joins the set.
        monitor.strategy.detections =
            vec![detected(ErrorKind::CamReadTimeout), detected(ErrorKind::CoversNotClosed)];
        let t2 = t1 + Duration::from_secs(31);
        monitor.check(&healthy(2), t2);

        // The ladder restarts at rung 0 for the new top error, ignoring the
        // settle left over from the old one.
        let action = monitor.recover(t2).unwrap().unwrap();
        assert!(matches!(
            action,
            RecoveryAction::Rpc {
                request: Request::CloseCovers { .. },
                ..
            }
        ));
    }

    #[test]
    fn dependency_recovery_targets_the_dependency_then_power() {
        let mut monitor = Monitor::new(TestStrategy { detections: vec![] })
            .with_power_outlets(vec!["covers".into()]);
        let t0 = Instant::now();
        monitor.check(
            &Observation {
                status: DaemonStatus::DependencyError {
                    daemons: vec![DaemonId::Power],
                },
                snapshot: None,
            },
            t0,
        );

        let mut actions = Vec::new();
        let mut now = t0;
        for _ in 0..5 {
            actions.push(monitor.recover(now).unwrap().unwrap());
            now += Duration::from_secs(60);
        }

        // Every process rung operates on the dependency, never on the
        // daemon that reported the error.
        let ops: Vec<_> = actions[..4]
            .iter()
            .map(|action| match action {
                RecoveryAction::Lifecycle { daemon, op } => {
                    assert_eq!(*daemon, DaemonId::Power);
                    *op
                }
                other => panic!("expected lifecycle on the dependency, got {other:?}"),
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
        assert_eq!(
            actions[4],
            RecoveryAction::Rpc {
                daemon: DaemonId::Power,
                request: Request::PowerOn {
                    outlets: vec!["covers".into()],
                },
            }
        );

        assert!(monitor.recover(now).is_err());
    }

    #[test]
    fn mode_validation() {
        let mut monitor = Monitor::new(TestStrategy { detections: vec![] });
        monitor.set_mode(Mode::Open).unwrap();
        assert_eq!(monitor.mode(), Mode::Open);
        assert!(matches!(
            monitor.set_mode(Mode::Cool),
            Err(MonitorError::InvalidMode { .. })
        ));
    }

    #[test]
    fn appeared_and_fixed_are_reported_for_notification() {
        let mut monitor = Monitor::new(TestStrategy {
            detections: vec![detected(ErrorKind::CoversNotClosed)],
        });
        let t0 = Instant::now();

        let report = monitor.check(&healthy(1), t0);
        assert_eq!(report.appeared, vec![ErrorKind::CoversNotClosed]);
        assert!(report.fixed.is_empty());

        // Same error still active: no new notifications.
        let report = monitor.check(&healthy(2), t0 + Duration::from_secs(1));
        assert!(report.appeared.is_empty());
        assert!(report.fixed.is_empty());
    }
}
