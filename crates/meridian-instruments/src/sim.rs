//! Simulated hardware.
//!
//! Good enough to run a whole observatory on a laptop: state advances when
//! polled, so behaviour tracks the daemon loop rather than wall-clock
//! threads. Exposures are the exception and run on real elapsed time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use meridian_proto::{CoverPosition, FrameData, OutletInfo, UnitId, Window};

use crate::hardware::{
    CameraInterface, CameraReading, CoverInterface, CoverReading, FilterWheelInterface,
    FilterWheelReading, FocuserCapabilities, FocuserInterface, FocuserReading, HardwareError,
    PowerInterface, Result,
};

const SENSOR_WIDTH: u32 = 1024;
const SENSOR_HEIGHT: u32 = 1024;

/// Temperature change per poll while the cooler pulls toward its target.
const COOL_STEP: f64 = 1.5;

/// Focuser steps travelled per poll.
const FOCUS_SPEED: u32 = 2_000;

/// Polls a filter change or cover move takes.
const MOVE_POLLS: u8 = 3;

struct SimCamUnit {
    temperature: f64,
    target_temperature: f64,
    cooler_enabled: bool,
    window: Option<Window>,
    exposure: Option<Exposure>,
}

struct Exposure {
    started: Instant,
    duration: Duration,
    binning: u8,
}

pub struct SimCamera {
    units: HashMap<UnitId, SimCamUnit>,
}

impl SimCamera {
    #[must_use]
    pub fn new(units: &[UnitId], ambient: f64) -> Self {
        let units = units
            .iter()
            .map(|&unit| {
                (
                    unit,
                    SimCamUnit {
                        temperature: ambient,
                        target_temperature: ambient,
                        cooler_enabled: false,
                        window: None,
                        exposure: None,
                    },
                )
            })
            .collect();
        Self { units }
    }

    fn unit(&mut self, unit: UnitId) -> Result<&mut SimCamUnit> {
        self.units
            .get_mut(&unit)
            .ok_or(HardwareError::NotConnected { unit })
    }
}

#[async_trait]
impl CameraInterface for SimCamera {
    async fn reading(&mut self, unit: UnitId) -> Result<CameraReading> {
        let u = self.unit(unit)?;
        if u.cooler_enabled {
            let gap = u.target_temperature - u.temperature;
            u.temperature += gap.clamp(-COOL_STEP, COOL_STEP);
        }
        Ok(CameraReading {
            temperature: u.temperature,
            target_temperature: u.target_temperature,
            cooler_enabled: u.cooler_enabled,
            exposure_finished: u
                .exposure
                .as_ref()
                .is_some_and(|e| e.started.elapsed() >= e.duration),
            window: u.window,
        })
    }

    async fn start_exposure(
        &mut self,
        unit: UnitId,
        exptime_ms: u64,
        binning: u8,
        _dark: bool,
    ) -> Result<()> {
        let u = self.unit(unit)?;
        u.exposure = Some(Exposure {
            started: Instant::now(),
            duration: Duration::from_millis(exptime_ms),
            binning,
        });
        Ok(())
    }

    async fn abort_exposure(&mut self, unit: UnitId) -> Result<()> {
        self.unit(unit)?.exposure = None;
        Ok(())
    }

    async fn fetch_frame(&mut self, unit: UnitId) -> Result<FrameData> {
        let u = self.unit(unit)?;
        let Some(exposure) = u.exposure.take() else {
            return Err(HardwareError::Fault {
                unit,
                message: "no exposure to read out".to_owned(),
            });
        };
        let bin = u32::from(exposure.binning.max(1));
        let (full_w, full_h) = match u.window {
            Some(w) => (w.width, w.height),
            None => (SENSOR_WIDTH, SENSOR_HEIGHT),
        };
        let width = (full_w / bin).max(1);
        let height = (full_h / bin).max(1);
        // Deterministic gradient so saved frames are recognisable.
        let data = (0..width * height)
            .map(|i| (i + u32::from(unit) * 1000) as u16)
            .collect();
        Ok(FrameData {
            unit,
            width,
            height,
            binning: exposure.binning,
            data,
        })
    }

    async fn set_window(&mut self, unit: UnitId, window: Option<Window>) -> Result<()> {
        self.unit(unit)?.window = window;
        Ok(())
    }

    async fn set_temperature(&mut self, unit: UnitId, target: f64) -> Result<()> {
        let u = self.unit(unit)?;
        u.target_temperature = target;
        u.cooler_enabled = true;
        Ok(())
    }
}

struct SimFocUnit {
    position: u32,
    target: Option<u32>,
    homed: bool,
    homing: bool,
}

pub struct SimFocuser {
    units: HashMap<UnitId, SimFocUnit>,
    max_position: u32,
}

impl SimFocuser {
    #[must_use]
    pub fn new(units: &[UnitId], max_position: u32) -> Self {
        let units = units
            .iter()
            .map(|&unit| {
                (
                    unit,
                    SimFocUnit {
                        position: max_position / 2,
                        target: None,
                        homed: false,
                        homing: false,
                    },
                )
            })
            .collect();
        Self {
            units,
            max_position,
        }
    }

    fn unit(&mut self, unit: UnitId) -> Result<&mut SimFocUnit> {
        self.units
            .get_mut(&unit)
            .ok_or(HardwareError::NotConnected { unit })
    }
}

#[async_trait]
impl FocuserInterface for SimFocuser {
    fn capabilities(&self, _unit: UnitId) -> FocuserCapabilities {
        FocuserCapabilities {
            can_set: true,
            can_stop: true,
        }
    }

    async fn reading(&mut self, unit: UnitId) -> Result<FocuserReading> {
        let u = self.unit(unit)?;
        if let Some(target) = u.target {
            if u.position.abs_diff(target) <= FOCUS_SPEED {
                u.position = target;
                u.target = None;
                if u.homing {
                    u.homed = true;
                    u.homing = false;
                }
            } else if target > u.position {
                u.position += FOCUS_SPEED;
            } else {
                u.position -= FOCUS_SPEED;
            }
        }
        Ok(FocuserReading {
            position: u.position,
            moving: u.target.is_some(),
            homed: u.homed,
            temperature: Some(8.5),
        })
    }

    async fn move_relative(&mut self, unit: UnitId, offset: i32) -> Result<()> {
        let max = self.max_position;
        let u = self.unit(unit)?;
        let target = i64::from(u.position) + i64::from(offset);
        u.target = Some(target.clamp(0, i64::from(max)) as u32);
        u.homing = false;
        Ok(())
    }

    async fn move_absolute(&mut self, unit: UnitId, position: u32) -> Result<()> {
        let max = self.max_position;
        let u = self.unit(unit)?;
        u.target = Some(position.min(max));
        u.homing = false;
        Ok(())
    }

    async fn home(&mut self, unit: UnitId) -> Result<()> {
        let u = self.unit(unit)?;
        u.target = Some(0);
        u.homing = true;
        Ok(())
    }

    async fn halt(&mut self, unit: UnitId) -> Result<()> {
        let u = self.unit(unit)?;
        u.target = None;
        u.homing = false;
        Ok(())
    }

    async fn sync(&mut self, unit: UnitId, position: u32) -> Result<()> {
        let max = self.max_position;
        let u = self.unit(unit)?;
        u.position = position.min(max);
        u.target = None;
        Ok(())
    }
}

struct SimWheelUnit {
    index: usize,
    target: Option<usize>,
    polls_left: u8,
    homed: bool,
}

pub struct SimFilterWheel {
    units: HashMap<UnitId, SimWheelUnit>,
    filters: Vec<String>,
}

impl SimFilterWheel {
    #[must_use]
    pub fn new(units: &[UnitId], filters: Vec<String>) -> Self {
        let units = units
            .iter()
            .map(|&unit| {
                (
                    unit,
                    SimWheelUnit {
                        index: 0,
                        target: None,
                        polls_left: 0,
                        homed: false,
                    },
                )
            })
            .collect();
        Self { units, filters }
    }

    fn unit(&mut self, unit: UnitId) -> Result<&mut SimWheelUnit> {
        self.units
            .get_mut(&unit)
            .ok_or(HardwareError::NotConnected { unit })
    }
}

#[async_trait]
impl FilterWheelInterface for SimFilterWheel {
    async fn reading(&mut self, unit: UnitId) -> Result<FilterWheelReading> {
        let filters = self.filters.clone();
        let u = self.unit(unit)?;
        if u.polls_left > 0 {
            u.polls_left -= 1;
            if u.polls_left == 0 {
                if let Some(target) = u.target.take() {
                    u.index = target;
                    u.homed = true;
                }
            }
        }
        Ok(FilterWheelReading {
            current_filter: u.homed.then(|| filters[u.index % filters.len()].clone()),
            homed: u.homed,
            moving: u.polls_left > 0,
        })
    }

    async fn select(&mut self, unit: UnitId, filter: &str) -> Result<()> {
        let Some(index) = self.filters.iter().position(|f| f == filter) else {
            return Err(HardwareError::Fault {
                unit,
                message: format!("no filter named {filter:?}"),
            });
        };
        let u = self.unit(unit)?;
        u.target = Some(index);
        u.polls_left = MOVE_POLLS;
        Ok(())
    }

    async fn home(&mut self, unit: UnitId) -> Result<()> {
        let u = self.unit(unit)?;
        u.target = Some(0);
        u.polls_left = MOVE_POLLS;
        Ok(())
    }
}

struct SimCoverUnit {
    position: CoverPosition,
    target: Option<CoverPosition>,
    polls_left: u8,
}

pub struct SimCovers {
    units: HashMap<UnitId, SimCoverUnit>,
}

impl SimCovers {
    #[must_use]
    pub fn new(units: &[UnitId]) -> Self {
        let units = units
            .iter()
            .map(|&unit| {
                (
                    unit,
                    SimCoverUnit {
                        position: CoverPosition::Closed,
                        target: None,
                        polls_left: 0,
                    },
                )
            })
            .collect();
        Self { units }
    }

    fn unit(&mut self, unit: UnitId) -> Result<&mut SimCoverUnit> {
        self.units
            .get_mut(&unit)
            .ok_or(HardwareError::NotConnected { unit })
    }

    fn command(&mut self, unit: UnitId, target: CoverPosition) -> Result<()> {
        let u = self.unit(unit)?;
        if u.position != target {
            u.target = Some(target);
            u.position = CoverPosition::PartOpen;
            u.polls_left = MOVE_POLLS;
        }
        Ok(())
    }
}

#[async_trait]
impl CoverInterface for SimCovers {
    async fn reading(&mut self, unit: UnitId) -> Result<CoverReading> {
        let u = self.unit(unit)?;
        if u.polls_left > 0 {
            u.polls_left -= 1;
            if u.polls_left == 0 {
                if let Some(target) = u.target.take() {
                    u.position = target;
                }
            }
        }
        Ok(CoverReading {
            position: u.position,
            moving: u.polls_left > 0,
        })
    }

    async fn open(&mut self, unit: UnitId) -> Result<()> {
        self.command(unit, CoverPosition::Open)
    }

    async fn close(&mut self, unit: UnitId) -> Result<()> {
        self.command(unit, CoverPosition::Closed)
    }

    async fn halt(&mut self, unit: UnitId) -> Result<()> {
        let u = self.unit(unit)?;
        u.target = None;
        u.polls_left = 0;
        u.position = CoverPosition::PartOpen;
        Ok(())
    }
}

pub struct SimPower {
    outlets: Vec<OutletInfo>,
}

impl SimPower {
    #[must_use]
    pub fn new(names: &[String]) -> Self {
        let outlets = names
            .iter()
            .map(|name| OutletInfo {
                name: name.clone(),
                on: true,
            })
            .collect();
        Self { outlets }
    }

    fn outlet(&mut self, name: &str) -> Result<&mut OutletInfo> {
        self.outlets
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| HardwareError::UnknownOutlet {
                name: name.to_owned(),
            })
    }
}

#[async_trait]
impl PowerInterface for SimPower {
    async fn outlets(&mut self) -> Result<Vec<OutletInfo>> {
        Ok(self.outlets.clone())
    }

    async fn set_outlet(&mut self, name: &str, on: bool) -> Result<()> {
        self.outlet(name)?.on = on;
        Ok(())
    }

    async fn cycle_outlet(&mut self, name: &str) -> Result<()> {
        self.outlet(name)?.on = true;
        Ok(())
    }
}
