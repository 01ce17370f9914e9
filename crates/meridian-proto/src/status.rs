//! Daemon status and per-subsystem information payloads.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::{DaemonId, UnitId};

/// Composite health of a daemon, derived fresh on every poll.
///
/// Precedence when several conditions hold at once:
/// `NotRunning > Unresponsive > DependencyError > HardwareError > Stale > Running`.
/// The daemon itself only ever reports the lower four; `NotRunning` and
/// `Unresponsive` are determined by the caller (pidfile missing, RPC failure).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DaemonStatus {
    /// Healthy and ticking.
    Running,
    /// No live process behind the pidfile.
    NotRunning,
    /// Process exists but RPC timed out or failed.
    Unresponsive,
    /// One or more dependency daemons are not healthy.
    DependencyError { daemons: Vec<DaemonId> },
    /// One or more hardware units are unreachable or faulted.
    HardwareError { units: Vec<UnitId> },
    /// The control loop has not ticked within the liveness window.
    Stale { age_secs: u32 },
}

impl DaemonStatus {
    /// Whether this status counts as healthy for dependency purposes.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::NotRunning => write!(f, "not running"),
            Self::Unresponsive => write!(f, "unresponsive"),
            Self::DependencyError { daemons } => {
                write!(f, "dependency error:")?;
                for d in daemons {
                    write!(f, " {d}")?;
                }
                Ok(())
            }
            Self::HardwareError { units } => {
                write!(f, "hardware error:")?;
                for u in units {
                    write!(f, " {u}")?;
                }
                Ok(())
            }
            Self::Stale { age_secs } => write!(f, "stale ({age_secs}s)"),
        }
    }
}

/// One control-loop tick's worth of daemon state.
///
/// Published atomically at the end of each tick. `time_ns` is monotonically
/// non-decreasing per daemon; a regression means the daemon restarted or its
/// loop died.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct StatusSnapshot {
    /// Which daemon produced this snapshot.
    pub daemon_id: DaemonId,
    /// Wall-clock time of the tick, nanoseconds since Unix epoch.
    pub time_ns: u64,
    /// Seconds since the daemon process started.
    pub uptime_secs: u64,
    /// Subsystem-specific state.
    pub payload: SubsystemInfo,
}

/// Per-subsystem state carried in a snapshot.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "subsystem", rename_all = "snake_case")]
pub enum SubsystemInfo {
    Camera(CameraInfo),
    Focuser(FocuserInfo),
    FilterWheel(FilterWheelInfo),
    Covers(CoversInfo),
    Power(PowerInfo),
}

/// Phase of the camera exposure pipeline.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(derive(Debug, PartialEq, Eq))]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureState {
    /// No exposure in flight; new requests accepted.
    Idle,
    /// Shutters open (or dark integration running).
    Exposing,
    /// All units finished integrating; frames being read out.
    ReadingOut,
    /// All frames read; waiting to hand off to the save task.
    ImagesReady,
}

impl fmt::Display for ExposureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Exposing => write!(f, "exposing"),
            Self::ReadingOut => write!(f, "reading out"),
            Self::ImagesReady => write!(f, "images ready"),
        }
    }
}

/// Camera daemon state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CameraInfo {
    pub exposure_state: ExposureState,
    /// Abort requested for the in-flight exposure.
    pub aborting: bool,
    /// Run number of the exposure in flight, if any (glances have none).
    pub current_run_number: Option<u32>,
    /// When the in-flight exposure started, nanoseconds since Unix epoch.
    pub exposing_since_ns: Option<u64>,
    /// Save task still flushing the previous exposure to disk.
    pub saving: bool,
    pub units: Vec<CameraUnitInfo>,
}

/// Per-unit camera state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CameraUnitInfo {
    pub unit: UnitId,
    /// Sensor temperature in Celsius.
    pub temperature: f64,
    pub target_temperature: f64,
    pub cooler_enabled: bool,
    /// This unit has finished integrating the current exposure.
    pub exposure_finished: bool,
    /// This unit's frame has been read out and fetched.
    pub image_ready: bool,
    pub window: Option<crate::request::Window>,
}

/// Focuser daemon state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FocuserInfo {
    pub units: Vec<FocuserUnitInfo>,
}

/// Per-unit focuser state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FocuserUnitInfo {
    pub unit: UnitId,
    /// Current position in motor steps.
    pub position: u32,
    /// Commanded position, present while a move is in flight.
    pub target: Option<u32>,
    pub moving: bool,
    pub homed: bool,
    /// Whether the hardware accepts absolute set commands.
    pub can_set: bool,
    /// Whether the hardware supports mid-move stop.
    pub can_stop: bool,
    /// Ambient temperature recorded at the last completed move.
    pub temp_at_last_move: Option<f64>,
}

/// Filter wheel daemon state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FilterWheelInfo {
    pub units: Vec<FilterWheelUnitInfo>,
}

/// Per-unit filter wheel state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FilterWheelUnitInfo {
    pub unit: UnitId,
    /// Currently selected filter, unknown until the wheel has homed.
    pub current_filter: Option<String>,
    pub homed: bool,
    pub moving: bool,
}

/// Mirror cover position.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(derive(Debug, PartialEq, Eq))]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverPosition {
    Closed,
    Open,
    PartOpen,
    Unknown,
}

/// Mirror cover daemon state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CoversInfo {
    pub units: Vec<CoversUnitInfo>,
}

/// Per-unit cover state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CoversUnitInfo {
    pub unit: UnitId,
    pub position: CoverPosition,
    pub moving: bool,
}

/// Power daemon state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PowerInfo {
    pub outlets: Vec<OutletInfo>,
}

/// A single switched outlet.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct OutletInfo {
    pub name: String,
    pub on: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(DaemonStatus::Running.to_string(), "running");
        assert_eq!(
            DaemonStatus::DependencyError {
                daemons: vec![DaemonId::Power]
            }
            .to_string(),
            "dependency error: power"
        );
        assert_eq!(
            DaemonStatus::HardwareError { units: vec![2, 4] }.to_string(),
            "hardware error: 2 4"
        );
    }

    #[test]
    fn only_running_is_healthy() {
        assert!(DaemonStatus::Running.is_running());
        assert!(!DaemonStatus::Stale { age_secs: 10 }.is_running());
        assert!(!DaemonStatus::NotRunning.is_running());
    }
}
