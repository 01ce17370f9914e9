use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meridian_proto::{ImageType, UnitId};

/// One frame's entry in the exposure ledger.
///
/// Written when the exposure starts and completed (or left incomplete, for
/// aborts and crashes) when the frame is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRecord {
    /// Site-wide run number. `None` for glance frames.
    pub run_number: Option<u32>,
    pub unit: UnitId,
    /// Saved filename, relative to the image directory.
    pub filename: String,
    pub exptime_ms: u64,
    pub binning: u8,
    pub image_type: ImageType,
    pub target: Option<String>,
    pub glance: bool,
    pub set_num: u32,
    pub set_pos: u32,
    pub set_tot: u32,
    /// Scheduler pointing this frame belongs to, if any.
    pub pointing_id: Option<i64>,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    /// False until the frame is saved; stays false for aborted frames.
    pub completed: bool,
}
