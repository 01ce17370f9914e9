//! Request payloads: common verbs plus typed per-subsystem commands.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::UnitId;

/// A command or query addressed to a daemon.
///
/// Every daemon answers the common verbs; subsystem commands sent to the
/// wrong daemon get an `UnsupportedCommand` error back. Commands are
/// validated synchronously against the last snapshot and then queued; the
/// ack only confirms acceptance, not completion.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Request {
    // Common verbs
    /// Composite health, derived fresh.
    GetStatus,
    /// Latest snapshot. With `force_update` the daemon re-polls hardware
    /// and the reply waits for a snapshot newer than the request.
    GetInfo { force_update: bool },
    /// Graceful shutdown of the daemon process.
    Shutdown,
    /// Wake the control loop for an immediate tick.
    Prod,

    // Camera
    TakeExposure(ExposureRequest),
    AbortExposure { units: Vec<UnitId> },
    SetWindow { units: Vec<UnitId>, window: Option<Window> },
    SetTemperature { units: Vec<UnitId>, target: f64 },
    GetLatestHeaders,
    GetLatestImage { unit: UnitId },

    // Focuser
    MoveFocusers { offsets: Vec<(UnitId, i32)> },
    SetFocusers { targets: Vec<FocuserTarget> },
    HomeFocusers { units: Vec<UnitId> },
    StopFocusers { units: Vec<UnitId> },
    SyncFocusers { targets: Vec<FocuserTarget> },

    // Filter wheel
    SetFilters { assignments: Vec<FilterAssignment> },
    HomeFilters { units: Vec<UnitId> },

    // Mirror covers
    OpenCovers { units: Vec<UnitId> },
    CloseCovers { units: Vec<UnitId> },
    StopCovers { units: Vec<UnitId> },

    // Power
    PowerOn { outlets: Vec<String> },
    PowerOff { outlets: Vec<String> },
    Reboot { outlets: Vec<String> },
}

/// Readout window in unbinned pixels.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Window {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Shutter behaviour for an exposure.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(derive(Debug, PartialEq, Eq))]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// Shutter open.
    Normal,
    /// Shutter held closed.
    Dark,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

/// What the frame is for. Recorded in headers and the exposure ledger.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[rkyv(derive(Debug, PartialEq, Eq))]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageType {
    Bias,
    Dark,
    Flat,
    Focus,
    Science,
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bias => write!(f, "BIAS"),
            Self::Dark => write!(f, "DARK"),
            Self::Flat => write!(f, "FLAT"),
            Self::Focus => write!(f, "FOCUS"),
            Self::Science => write!(f, "SCIENCE"),
        }
    }
}

/// Parameters for a single exposure across one or more units.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExposureRequest {
    /// Units to expose. Must be a subset of the daemon's active units.
    pub units: Vec<UnitId>,
    /// Integration time in milliseconds.
    pub exptime_ms: u64,
    /// Pixel binning factor, identical in both axes. Must be at least 1.
    pub binning: u8,
    pub frame_type: FrameType,
    pub image_type: ImageType,
    /// Target name, if pointing at one.
    pub target: Option<String>,
    /// Glances are quick-look frames: no run number, overwritten in place.
    pub glance: bool,
    /// Position of this exposure within its set (1-based), and the set size.
    pub set_num: u32,
    pub set_pos: u32,
    pub set_tot: u32,
    /// Scheduler pointing this exposure belongs to, if any.
    pub pointing_id: Option<i64>,
}

/// Absolute focuser position for set/sync commands.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocuserTarget {
    pub unit: UnitId,
    pub position: u32,
}

/// A filter selection for one unit.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FilterAssignment {
    pub unit: UnitId,
    pub filter: String,
}
