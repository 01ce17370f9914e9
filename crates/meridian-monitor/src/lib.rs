//! Health monitoring and automated recovery for hardware daemons.
//!
//! One [`Monitor`] watches one daemon. Each check cycle it is handed an
//! [`Observation`] (outside-view status plus the latest snapshot) and a
//! clock reading, and it updates a hysteresis [`ErrorSet`]. Active errors
//! drive a recovery ladder: typed actions issued strictly in order, gated by
//! settle times, reset the moment the daemon comes back clean. A ladder that
//! runs out raises [`MonitorError::RecoveryExhausted`] exactly once; nothing
//! above a monitor retries a lost cause.
//!
//! Monitors are deterministic state machines; all I/O lives in the probe,
//! the client and the [`ActionExecutor`]. Tests drive them with fabricated
//! observations and instants.

mod action;
mod error;
mod error_set;
mod executor;
mod kinds;
mod mode;
mod monitor;
mod strategies;
mod strategy;

pub use action::{LifecycleOp, RecoveryAction, RecoveryLadder, RecoveryStep};
pub use error::MonitorError;
pub use error_set::ErrorSet;
pub use executor::{ActionExecutor, ExecutorError, SiteExecutor};
pub use kinds::ErrorKind;
pub use mode::{Mode, UnknownMode};
pub use monitor::{CheckReport, Monitor, Observation};
pub use strategies::{
    CameraStrategy, CoversStrategy, FilterWheelStrategy, FocuserStrategy, PowerStrategy,
};
pub use strategy::{Detected, MonitorStrategy};
