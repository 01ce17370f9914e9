//! Daemon process lifecycle.
//!
//! The supervisor is a client, not a parent: daemons are independent
//! processes that outlive whoever started them. Liveness is judged from the
//! pidfile plus a signal-0 probe, health from RPC. Nothing here escalates on
//! its own; a stuck daemon makes `shutdown` fail loudly and the operator or
//! recovery engine decides whether to `kill`.

mod error;
mod probe;
mod supervisor;

pub use error::{Result, SupervisorError};
pub use probe::{pid_alive, RpcProbe, StatusProbe};
pub use supervisor::Supervisor;
