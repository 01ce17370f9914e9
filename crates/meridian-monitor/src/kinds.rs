//! Error kinds a monitor can hold, in priority order.

use std::fmt;

use serde::Serialize;

/// Everything that can be wrong with a monitored daemon.
///
/// Declaration order is priority order: when several errors are active at
/// once, recovery works on the smallest. Process-level problems come before
/// hardware ones because no subsystem command can land on a daemon that is
/// not answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Process-level (critical: each replaces the whole set when detected)
    /// No live process.
    NotRunning,
    /// Process alive but RPC failing.
    PingFailed,
    /// Daemon reports a bad dependency.
    DependencyFailed,
    /// Daemon reports unreachable hardware.
    HardwareFailed,
    /// Snapshots missing, frozen or regressed.
    InfoFailed,
    /// Snapshot payload cannot be classified.
    StatusFailed,

    // Subsystem-level (delayed, accumulate)
    /// Covers should be closed and are not.
    CoversNotClosed,
    /// Covers should be open and are not.
    CoversNotOpen,
    /// Filter wheel lost its home reference.
    FiltNotHomed,
    /// Filter wheel stuck mid-move.
    FiltMoveTimeout,
    /// Focuser stuck mid-move.
    FocMoveTimeout,
    /// Sensor away from its cool target.
    CamNotCool,
    /// Readout running far past any plausible duration.
    CamReadTimeout,
}

impl ErrorKind {
    /// Whether this kind replaces the whole error set when detected.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(
            self,
            Self::NotRunning
                | Self::PingFailed
                | Self::DependencyFailed
                | Self::HardwareFailed
                | Self::InfoFailed
                | Self::StatusFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotRunning => "not_running",
            Self::PingFailed => "ping_failed",
            Self::DependencyFailed => "dependency_failed",
            Self::HardwareFailed => "hardware_failed",
            Self::InfoFailed => "info_failed",
            Self::StatusFailed => "status_failed",
            Self::CoversNotClosed => "covers_not_closed",
            Self::CoversNotOpen => "covers_not_open",
            Self::FiltNotHomed => "filt_not_homed",
            Self::FiltMoveTimeout => "filt_move_timeout",
            Self::FocMoveTimeout => "foc_move_timeout",
            Self::CamNotCool => "cam_not_cool",
            Self::CamReadTimeout => "cam_read_timeout",
        };
        f.write_str(name)
    }
}
