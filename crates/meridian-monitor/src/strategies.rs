//! The five subsystem strategies.

use std::time::Duration;

use meridian_proto::{
    CoverPosition, DaemonId, ExposureState, Request, StatusSnapshot, SubsystemInfo, UnitId,
};

use crate::action::{LifecycleOp, RecoveryAction, RecoveryLadder, RecoveryStep};
use crate::kinds::ErrorKind;
use crate::mode::Mode;
use crate::strategy::{Detected, MonitorStrategy};

/// Subsystem conditions must persist this long before activating.
const CONDITION_DELAY: Duration = Duration::from_secs(60);

/// A sensor drifting off its cool target gets flagged sooner: warm
/// sensors ruin frames, and cooldown is slow enough as it is.
const CAM_WARM_DELAY: Duration = Duration::from_secs(30);

/// A readout running longer than this has wedged.
const READOUT_TIMEOUT: Duration = Duration::from_secs(180);

/// Time allowed for a sensor to pull down to its cool target.
const COOLDOWN_SETTLE: Duration = Duration::from_secs(600);

fn rpc(daemon: DaemonId, request: Request, settle: Duration) -> RecoveryStep {
    RecoveryStep::new(RecoveryAction::Rpc { daemon, request }, settle)
}

fn restart(daemon: DaemonId, settle: Duration) -> RecoveryStep {
    RecoveryStep::new(
        RecoveryAction::Lifecycle {
            daemon,
            op: LifecycleOp::Restart,
        },
        settle,
    )
}

/// Mirror covers: the only strategy whose notion of "healthy" depends on
/// the target mode.
pub struct CoversStrategy {
    units: Vec<UnitId>,
}

impl CoversStrategy {
    #[must_use]
    pub fn new(units: Vec<UnitId>) -> Self {
        Self { units }
    }
}

impl MonitorStrategy for CoversStrategy {
    fn daemon_id(&self) -> DaemonId {
        DaemonId::Covers
    }

    fn available_modes(&self) -> &'static [Mode] {
        &[Mode::Closed, Mode::Open]
    }

    fn default_mode(&self) -> Mode {
        Mode::Closed
    }

    fn inspect(&self, snapshot: &StatusSnapshot, mode: Mode) -> Vec<Detected> {
        let SubsystemInfo::Covers(info) = &snapshot.payload else {
            return Vec::new();
        };
        // A cover mid-move is not yet wrong; the persistence delay catches
        // moves that never finish.
        let wanted = match mode {
            Mode::Open => CoverPosition::Open,
            _ => CoverPosition::Closed,
        };
        let settled_wrong = info
            .units
            .iter()
            .any(|u| self.units.contains(&u.unit) && u.position != wanted);
        if settled_wrong {
            let kind = match mode {
                Mode::Open => ErrorKind::CoversNotOpen,
                _ => ErrorKind::CoversNotClosed,
            };
            vec![Detected::new(kind, CONDITION_DELAY)]
        } else {
            Vec::new()
        }
    }

    fn ladder(&self, kind: ErrorKind) -> RecoveryLadder {
        let close = Request::CloseCovers {
            units: self.units.clone(),
        };
        let open = Request::OpenCovers {
            units: self.units.clone(),
        };
        let id = self.daemon_id();
        match kind {
            // Retry the wanted direction, then a full cycle: driving the
            // mechanism the other way can free a stuck cover.
            ErrorKind::CoversNotOpen => vec![
                rpc(id, open.clone(), Duration::from_secs(60)),
                rpc(id, close, Duration::from_secs(120)),
                rpc(id, open, Duration::from_secs(120)),
            ],
            _ => vec![
                rpc(id, close.clone(), Duration::from_secs(60)),
                rpc(id, open, Duration::from_secs(120)),
                rpc(id, close, Duration::from_secs(120)),
            ],
        }
    }
}

/// Cameras: temperature regulation and wedged readouts.
pub struct CameraStrategy {
    units: Vec<UnitId>,
    cool_temperature: f64,
    temperature_margin: f64,
}

impl CameraStrategy {
    #[must_use]
    pub fn new(units: Vec<UnitId>, cool_temperature: f64, temperature_margin: f64) -> Self {
        Self {
            units,
            cool_temperature,
            temperature_margin,
        }
    }
}

impl MonitorStrategy for CameraStrategy {
    fn daemon_id(&self) -> DaemonId {
        DaemonId::Cam
    }

    fn available_modes(&self) -> &'static [Mode] {
        &[Mode::Cool, Mode::Warm]
    }

    // Observing is the normal state of affairs; the controller drops to
    // Warm explicitly for daytime and emergencies.
    fn default_mode(&self) -> Mode {
        Mode::Cool
    }

    fn inspect(&self, snapshot: &StatusSnapshot, mode: Mode) -> Vec<Detected> {
        let SubsystemInfo::Camera(info) = &snapshot.payload else {
            return Vec::new();
        };
        let mut detections = Vec::new();

        if mode == Mode::Cool {
            let off_target = info.units.iter().any(|u| {
                self.units.contains(&u.unit)
                    && (u.temperature - self.cool_temperature).abs() > self.temperature_margin
            });
            if off_target {
                detections.push(Detected::new(ErrorKind::CamNotCool, CAM_WARM_DELAY));
            }
        }

        if info.exposure_state == ExposureState::ReadingOut {
            let overdue = info.exposing_since_ns.is_some_and(|since| {
                snapshot.time_ns.saturating_sub(since) > READOUT_TIMEOUT.as_nanos() as u64
            });
            if overdue {
                detections.push(Detected::new(ErrorKind::CamReadTimeout, Duration::ZERO));
            }
        }

        detections
    }

    fn ladder(&self, kind: ErrorKind) -> RecoveryLadder {
        let id = self.daemon_id();
        match kind {
            ErrorKind::CamNotCool => vec![rpc(
                id,
                Request::SetTemperature {
                    units: self.units.clone(),
                    target: self.cool_temperature,
                },
                COOLDOWN_SETTLE,
            )],
            ErrorKind::CamReadTimeout => vec![
                rpc(
                    id,
                    Request::AbortExposure {
                        units: self.units.clone(),
                    },
                    Duration::from_secs(30),
                ),
                restart(id, Duration::from_secs(60)),
            ],
            _ => Vec::new(),
        }
    }
}

/// Focusers: the only condition worth acting on is a move that never ends.
pub struct FocuserStrategy {
    units: Vec<UnitId>,
}

impl FocuserStrategy {
    #[must_use]
    pub fn new(units: Vec<UnitId>) -> Self {
        Self { units }
    }
}

impl MonitorStrategy for FocuserStrategy {
    fn daemon_id(&self) -> DaemonId {
        DaemonId::Foc
    }

    fn available_modes(&self) -> &'static [Mode] {
        &[Mode::Active]
    }

    fn default_mode(&self) -> Mode {
        Mode::Active
    }

    fn inspect(&self, snapshot: &StatusSnapshot, _mode: Mode) -> Vec<Detected> {
        let SubsystemInfo::Focuser(info) = &snapshot.payload else {
            return Vec::new();
        };
        let stuck = info
            .units
            .iter()
            .any(|u| self.units.contains(&u.unit) && u.moving);
        if stuck {
            vec![Detected::new(ErrorKind::FocMoveTimeout, CONDITION_DELAY)]
        } else {
            Vec::new()
        }
    }

    fn ladder(&self, kind: ErrorKind) -> RecoveryLadder {
        let id = self.daemon_id();
        match kind {
            ErrorKind::FocMoveTimeout => vec![
                rpc(
                    id,
                    Request::StopFocusers {
                        units: self.units.clone(),
                    },
                    Duration::from_secs(30),
                ),
                restart(id, Duration::from_secs(60)),
            ],
            _ => Vec::new(),
        }
    }
}

/// Filter wheels: home reference and endless moves.
pub struct FilterWheelStrategy {
    units: Vec<UnitId>,
}

impl FilterWheelStrategy {
    #[must_use]
    pub fn new(units: Vec<UnitId>) -> Self {
        Self { units }
    }
}

impl MonitorStrategy for FilterWheelStrategy {
    fn daemon_id(&self) -> DaemonId {
        DaemonId::Filt
    }

    fn available_modes(&self) -> &'static [Mode] {
        &[Mode::Active]
    }

    fn default_mode(&self) -> Mode {
        Mode::Active
    }

    fn inspect(&self, snapshot: &StatusSnapshot, _mode: Mode) -> Vec<Detected> {
        let SubsystemInfo::FilterWheel(info) = &snapshot.payload else {
            return Vec::new();
        };
        let mut detections = Vec::new();
        let watched = || info.units.iter().filter(|u| self.units.contains(&u.unit));
        if watched().any(|u| !u.homed && !u.moving) {
            detections.push(Detected::new(ErrorKind::FiltNotHomed, CONDITION_DELAY));
        }
        if watched().any(|u| u.moving) {
            detections.push(Detected::new(ErrorKind::FiltMoveTimeout, CONDITION_DELAY));
        }
        detections
    }

    fn ladder(&self, kind: ErrorKind) -> RecoveryLadder {
        let id = self.daemon_id();
        let home = Request::HomeFilters {
            units: self.units.clone(),
        };
        match kind {
            // A wheel that lost its reference just needs homing again; a
            // restart would only lose the reference a second time.
            ErrorKind::FiltNotHomed => vec![
                rpc(id, home.clone(), Duration::from_secs(60)),
                rpc(id, home, Duration::from_secs(120)),
            ],
            ErrorKind::FiltMoveTimeout => vec![
                rpc(id, home, Duration::from_secs(60)),
                restart(id, Duration::from_secs(60)),
            ],
            _ => Vec::new(),
        }
    }
}

/// Power: process-level supervision only. Cycling outlets autonomously
/// could cut power to hardware another recovery is mid-way through using.
pub struct PowerStrategy;

impl MonitorStrategy for PowerStrategy {
    fn daemon_id(&self) -> DaemonId {
        DaemonId::Power
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
