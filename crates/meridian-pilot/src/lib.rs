//! The site controller.
//!
//! The pilot owns everything above the hardware daemons: one watch task
//! per daemon running a [`meridian_monitor::Monitor`], the observing
//! script slot, the emergency shutdown path, the covers watchdog and a
//! read-only HTTP status API.

pub mod api;
pub mod error;
pub mod notify;
pub mod safety;
pub mod script;
pub mod watch;

pub use api::{serve, ApiState};
pub use error::{PilotError, Result};
pub use notify::{LogNotifier, Notifier};
pub use safety::{emergency_listener, SafetyController};
pub use script::ScriptRunner;
pub use watch::{
    EmergencyRequest, ModeCommands, MonitorSnapshot, MonitorStates, Observer, RpcObserver,
    WatchTask,
};
