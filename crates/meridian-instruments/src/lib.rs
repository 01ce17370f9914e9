//! Subsystem daemons: control programs, validators and hardware seams.
//!
//! Each subsystem contributes a [`meridian_daemon::ControlProgram`] that
//! owns its hardware through one of the capability traits in [`hardware`],
//! and a [`meridian_daemon::CommandValidator`] that checks requests against
//! the latest snapshot. The daemon binaries in `src/bin` wire a program and
//! validator to the shared runtime over the simulated hardware in [`sim`];
//! physical drivers implement the same traits out of tree.

pub mod boot;
pub mod camera;
pub mod covers;
pub mod filterwheel;
pub mod focuser;
pub mod hardware;
pub mod power;
pub mod sim;
