//! The per-subsystem half of a monitor.

use std::time::Duration;

use meridian_proto::{DaemonId, StatusSnapshot};

use crate::action::RecoveryLadder;
use crate::kinds::ErrorKind;
use crate::mode::Mode;

/// A condition a strategy saw in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detected {
    pub kind: ErrorKind,
    /// How long it must persist before activating.
    pub delay: Duration,
}

impl Detected {
    #[must_use]
    pub const fn new(kind: ErrorKind, delay: Duration) -> Self {
        Self { kind, delay }
    }
}

/// Subsystem-specific knowledge plugged into a [`crate::Monitor`].
///
/// Strategies are pure: they look at a snapshot in the light of the target
/// mode and report conditions, and they own the escalation ladders for
/// their subsystem's error kinds. The engine handles everything else.
pub trait MonitorStrategy: Send {
    fn daemon_id(&self) -> DaemonId;

    /// Modes this subsystem can be asked to hold.
    fn available_modes(&self) -> &'static [Mode];

    /// Mode on controller startup.
    fn default_mode(&self) -> Mode;

    /// Conditions visible in `snapshot` given the target `mode`.
    fn inspect(&self, snapshot: &StatusSnapshot, mode: Mode) -> Vec<Detected>;

    /// Escalation ladder for one of this strategy's error kinds.
    ///
    /// Process-level kinds never reach here; the engine owns those ladders.
    fn ladder(&self, kind: ErrorKind) -> RecoveryLadder;
}
