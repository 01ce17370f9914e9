use thiserror::Error;

use meridian_proto::DaemonId;

use crate::kinds::ErrorKind;
use crate::mode::Mode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Every rung of the ladder for `kind` has been tried and the error is
    /// still active. Raised once per episode; human intervention time.
    #[error("recovery exhausted for {daemon}: {kind}")]
    RecoveryExhausted { daemon: DaemonId, kind: ErrorKind },

    /// The requested mode is not one this subsystem can hold.
    #[error("mode {mode} is not available for {daemon}")]
    InvalidMode { daemon: DaemonId, mode: Mode },
}
