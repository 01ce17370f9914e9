//! Daemon runtime shared by every hardware daemon.
//!
//! A daemon is one OS process owning exclusive access to one subsystem. All
//! hardware interaction happens on a single control-loop task; RPC handlers
//! only read the latest published snapshot and queue commands into a
//! single-slot cell. The subsystem-specific pieces plug in through two
//! seams:
//!
//! - [`ControlProgram`]: owned by the loop, polls hardware and executes
//!   queued commands.
//! - [`CommandValidator`]: shared with RPC handlers, checks requests against
//!   the latest snapshot without touching hardware.
//!
//! Keeping validation separate from execution means a slow hardware poll can
//! never block command acceptance, and a burst of RPC traffic can never
//! interleave with a hardware transaction.

mod client;
mod command;
mod deps;
mod error;
mod pidfile;
mod program;
mod runtime;
mod status;
mod wire;

pub use client::DaemonClient;
pub use command::CommandSlot;
pub use deps::DependencyTracker;
pub use error::{DaemonError, Result};
pub use pidfile::Pidfile;
pub use program::{CommandValidator, ControlProgram, ProgramTick, Validated};
pub use runtime::DaemonRuntime;
pub use status::compute_status;
pub use wire::{read_request, read_response, write_request, write_response};
