//! Response payloads and the wire-level error taxonomy.

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

use crate::status::{DaemonStatus, StatusSnapshot};
use crate::types::{DaemonId, UnitId};

/// A daemon's reply to a [`crate::Request`].
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Status(DaemonStatus),
    Info(StatusSnapshot),
    /// Command accepted. The string is a human-readable acknowledgement;
    /// completion is observed through subsequent snapshots.
    Ack(String),
    Headers(Vec<UnitHeaders>),
    Image(FrameData),
    Error(RpcError),
}

/// Header cards for one unit's most recent frame.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UnitHeaders {
    pub unit: UnitId,
    pub cards: Vec<(String, String)>,
}

/// Raw pixel data for one unit's most recent frame.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FrameData {
    pub unit: UnitId,
    /// Binned dimensions.
    pub width: u32,
    pub height: u32,
    pub binning: u8,
    /// Row-major 16-bit pixels, `width * height` long.
    pub data: Vec<u16>,
}

/// Why a daemon refused a command.
///
/// Carried verbatim back to the caller so operators can tell which daemon,
/// unit or dependency is at fault.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Error)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcError {
    /// The command's parameters failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The subsystem is in a state that forbids the command, e.g. an
    /// exposure is already in flight.
    #[error("wrong state: {0}")]
    WrongState(String),

    /// A daemon this one depends on is not healthy.
    #[error("dependency not running: {0:?}")]
    DependencyNotRunning(Vec<DaemonId>),

    /// The targeted hardware units are unreachable.
    #[error("hardware not connected: {0:?}")]
    HardwareNotConnected(Vec<UnitId>),

    /// The command does not apply to this daemon's subsystem.
    #[error("unsupported command for daemon {daemon}")]
    UnsupportedCommand { daemon: DaemonId },

    /// Unexpected failure inside the daemon.
    #[error("internal error: {0}")]
    Internal(String),
}
