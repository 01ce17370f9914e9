//! Typed recovery actions and ladders.

use std::fmt;
use std::time::Duration;

use meridian_proto::{DaemonId, Request};

/// A process-lifecycle operation on a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Start,
    Shutdown,
    Kill,
    Restart,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Shutdown => "shutdown",
            Self::Kill => "kill",
            Self::Restart => "restart",
        };
        f.write_str(name)
    }
}

/// One thing recovery can do.
///
/// A closed sum type rather than command strings: every action names its
/// target daemon and carries a typed payload, so the executor cannot be
/// handed anything it does not know how to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Send a subsystem command over RPC.
    Rpc { daemon: DaemonId, request: Request },
    /// Operate on the daemon process itself.
    Lifecycle { daemon: DaemonId, op: LifecycleOp },
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc { daemon, request } => write!(f, "rpc {daemon}: {request:?}"),
            Self::Lifecycle { daemon, op } => write!(f, "{op} {daemon}"),
        }
    }
}

/// One rung of a ladder: an action and how long to let it work.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryStep {
    pub action: RecoveryAction,
    /// No further rung is attempted until this much time has passed.
    pub settle: Duration,
}

impl RecoveryStep {
    #[must_use]
    pub fn new(action: RecoveryAction, settle: Duration) -> Self {
        Self { action, settle }
    }
}

/// An ordered escalation sequence for one error kind.
pub type RecoveryLadder = Vec<RecoveryStep>;

/// Default ladder for process-level errors.
///
/// Not running gets a plain start first; everything else assumes the
/// process exists but is sick, so it begins with a restart. The kill rung
/// is the last resort before giving up.
#[must_use]
pub fn process_ladder(daemon: DaemonId, starts_with_start: bool) -> RecoveryLadder {
    let mut ladder = Vec::new();
    if starts_with_start {
        ladder.push(RecoveryStep::new(
            RecoveryAction::Lifecycle {
                daemon,
                op: LifecycleOp::Start,
            },
            Duration::from_secs(30),
        ));
    }
    ladder.push(RecoveryStep::new(
        RecoveryAction::Lifecycle {
            daemon,
            op: LifecycleOp::Restart,
        },
        Duration::from_secs(30),
    ));
    ladder.push(RecoveryStep::new(
        RecoveryAction::Lifecycle {
            daemon,
            op: LifecycleOp::Kill,
        },
        Duration::from_secs(10),
    ));
    ladder.push(RecoveryStep::new(
        RecoveryAction::Lifecycle {
            daemon,
            op: LifecycleOp::Start,
        },
        Duration::from_secs(30),
    ));
    ladder
}

/// Ladder for a dead dependency: revive the dependency daemon, not the
/// daemon that reported it. The final rung powers the subsystem outlets
/// back on, since hardware left dark is the one thing a process restart
/// cannot fix.
#[must_use]
pub fn dependency_ladder(dependency: DaemonId, outlets: &[String]) -> RecoveryLadder {
    let mut ladder = process_ladder(dependency, true);
    if !outlets.is_empty() {
        ladder.push(RecoveryStep::new(
            RecoveryAction::Rpc {
                daemon: DaemonId::Power,
                request: Request::PowerOn {
                    outlets: outlets.to_vec(),
                },
            },
            Duration::from_secs(30),
        ));
    }
    ladder
}
