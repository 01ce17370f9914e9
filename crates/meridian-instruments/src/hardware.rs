//! Hardware capability traits.
//!
//! Each trait is the narrow waist between a control program and one kind of
//! device. Vendor drivers implement these out of tree; the simulated
//! implementations in [`crate::sim`] stand in everywhere else. Methods take
//! `&mut self` because a program owns its hardware exclusively and drivers
//! are rarely reentrant.

use async_trait::async_trait;
use thiserror::Error;

use meridian_proto::{CoverPosition, FrameData, OutletInfo, UnitId, Window};

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("unit {unit} is not connected")]
    NotConnected { unit: UnitId },
    #[error("unit {unit} fault: {message}")]
    Fault { unit: UnitId, message: String },
    #[error("unit {unit} does not support {operation}")]
    Unsupported {
        unit: UnitId,
        operation: &'static str,
    },
    #[error("no outlet named {name:?}")]
    UnknownOutlet { name: String },
}

pub type Result<T> = std::result::Result<T, HardwareError>;

/// One camera poll.
#[derive(Debug, Clone)]
pub struct CameraReading {
    /// Sensor temperature in Celsius.
    pub temperature: f64,
    pub target_temperature: f64,
    pub cooler_enabled: bool,
    /// Integration for the current exposure has finished on this unit.
    pub exposure_finished: bool,
    pub window: Option<Window>,
}

#[async_trait]
pub trait CameraInterface: Send + 'static {
    async fn reading(&mut self, unit: UnitId) -> Result<CameraReading>;

    /// Begins integrating. `dark` keeps the shutter closed.
    async fn start_exposure(
        &mut self,
        unit: UnitId,
        exptime_ms: u64,
        binning: u8,
        dark: bool,
    ) -> Result<()>;

    async fn abort_exposure(&mut self, unit: UnitId) -> Result<()>;

    /// Reads out and returns the finished frame. Valid once per exposure,
    /// after `exposure_finished` goes true.
    async fn fetch_frame(&mut self, unit: UnitId) -> Result<FrameData>;

    /// Sets or clears the readout window. Applies from the next exposure.
    async fn set_window(&mut self, unit: UnitId, window: Option<Window>) -> Result<()>;

    async fn set_temperature(&mut self, unit: UnitId, target: f64) -> Result<()>;
}

/// One focuser poll.
#[derive(Debug, Clone)]
pub struct FocuserReading {
    /// Position in motor steps.
    pub position: u32,
    pub moving: bool,
    pub homed: bool,
    /// Ambient temperature at the focuser, if the hardware has a probe.
    pub temperature: Option<f64>,
}

/// What a focuser model can do beyond relative moves.
#[derive(Debug, Clone, Copy)]
pub struct FocuserCapabilities {
    /// Accepts absolute position commands.
    pub can_set: bool,
    /// Can halt a move in flight.
    pub can_stop: bool,
}

#[async_trait]
pub trait FocuserInterface: Send + 'static {
    fn capabilities(&self, unit: UnitId) -> FocuserCapabilities;

    async fn reading(&mut self, unit: UnitId) -> Result<FocuserReading>;

    async fn move_relative(&mut self, unit: UnitId, offset: i32) -> Result<()>;

    /// Fails with `Unsupported` when the model cannot set absolutely.
    async fn move_absolute(&mut self, unit: UnitId, position: u32) -> Result<()>;

    async fn home(&mut self, unit: UnitId) -> Result<()>;

    /// Fails with `Unsupported` when the model cannot stop mid-move.
    async fn halt(&mut self, unit: UnitId) -> Result<()>;

    /// Redefines the current position without moving.
    async fn sync(&mut self, unit: UnitId, position: u32) -> Result<()>;
}

/// One filter wheel poll.
#[derive(Debug, Clone)]
pub struct FilterWheelReading {
    /// Unknown until the wheel has homed.
    pub current_filter: Option<String>,
    pub homed: bool,
    pub moving: bool,
}

#[async_trait]
pub trait FilterWheelInterface: Send + 'static {
    async fn reading(&mut self, unit: UnitId) -> Result<FilterWheelReading>;

    async fn select(&mut self, unit: UnitId, filter: &str) -> Result<()>;

    async fn home(&mut self, unit: UnitId) -> Result<()>;
}

/// One mirror cover poll.
#[derive(Debug, Clone)]
pub struct CoverReading {
    pub position: CoverPosition,
    pub moving: bool,
}

#[async_trait]
pub trait CoverInterface: Send + 'static {
    async fn reading(&mut self, unit: UnitId) -> Result<CoverReading>;

    async fn open(&mut self, unit: UnitId) -> Result<()>;

    async fn close(&mut self, unit: UnitId) -> Result<()>;

    async fn halt(&mut self, unit: UnitId) -> Result<()>;
}

#[async_trait]
pub trait PowerInterface: Send + 'static {
    /// All outlets and their switch states.
    async fn outlets(&mut self) -> Result<Vec<OutletInfo>>;

    async fn set_outlet(&mut self, name: &str, on: bool) -> Result<()>;

    /// Off, dwell, on. The dwell time is the hardware's business.
    async fn cycle_outlet(&mut self, name: &str) -> Result<()>;
}
