//! Focuser daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{info, warn};

use meridian_core::config::ObservatoryConfig;
use meridian_daemon::{CommandValidator, ControlProgram, ProgramTick, Validated};
use meridian_proto::{
    DaemonId, FocuserInfo, FocuserTarget, FocuserUnitInfo, Request, RpcError, StatusSnapshot,
    SubsystemInfo, UnitId,
};

use crate::hardware::FocuserInterface;

#[derive(Debug)]
pub enum FocuserCommand {
    Move(Vec<(UnitId, i32)>),
    Set(Vec<FocuserTarget>),
    Home(Vec<UnitId>),
    Stop(Vec<UnitId>),
    Sync(Vec<FocuserTarget>),
}

pub struct FocuserProgram<F: FocuserInterface> {
    hw: F,
    units: Vec<UnitId>,
    /// Commanded absolute targets, cleared when the move completes.
    targets: HashMap<UnitId, u32>,
    /// Ambient temperature captured as each move finishes, for the
    /// temperature-compensation offsets computed upstream.
    temp_at_last_move: HashMap<UnitId, f64>,
    moving: HashMap<UnitId, bool>,
}

impl<F: FocuserInterface> FocuserProgram<F> {
    pub fn new(hw: F, config: &ObservatoryConfig) -> Self {
        Self {
            hw,
            units: config.units.clone(),
            targets: HashMap::new(),
            temp_at_last_move: HashMap::new(),
            moving: HashMap::new(),
        }
    }
}

#[async_trait]
impl<F: FocuserInterface> ControlProgram for FocuserProgram<F> {
    type Command = FocuserCommand;

    fn daemon_id(&self) -> DaemonId {
        DaemonId::Foc
    }

    async fn refresh(&mut self) -> ProgramTick {
        let mut bad = Vec::new();
        let mut units = Vec::new();
        for unit in self.units.clone() {
            let reading = match self.hw.reading(unit).await {
                Ok(reading) => reading,
                Err(err) => {
                    warn!(unit, %err, "focuser poll failed");
                    bad.push(unit);
                    continue;
                }
            };

            let was_moving = self.moving.insert(unit, reading.moving).unwrap_or(false);
            if was_moving && !reading.moving {
                self.targets.remove(&unit);
                if let Some(temperature) = reading.temperature {
                    self.temp_at_last_move.insert(unit, temperature);
                }
                info!(unit, position = reading.position, "focuser move finished");
            }

            let caps = self.hw.capabilities(unit);
            units.push(FocuserUnitInfo {
                unit,
                position: reading.position,
                target: self.targets.get(&unit).copied(),
                moving: reading.moving,
                homed: reading.homed,
                can_set: caps.can_set,
                can_stop: caps.can_stop,
                temp_at_last_move: self.temp_at_last_move.get(&unit).copied(),
            });
        }

        ProgramTick {
            info: SubsystemInfo::Focuser(FocuserInfo { units }),
            bad_units: bad,
        }
    }

    async fn execute(&mut self, command: FocuserCommand) {
        match command {
            FocuserCommand::Move(offsets) => {
                for (unit, offset) in offsets {
                    if let Err(err) = self.hw.move_relative(unit, offset).await {
                        warn!(unit, offset, %err, "relative move failed");
                    }
                }
            }
            FocuserCommand::Set(targets) => {
                for t in targets {
                    match self.hw.move_absolute(t.unit, t.position).await {
                        Ok(()) => {
                            self.targets.insert(t.unit, t.position);
                        }
                        Err(err) => warn!(unit = t.unit, %err, "absolute move failed"),
                    }
                }
            }
            FocuserCommand::Home(units) => {
                for unit in units {
                    match self.hw.home(unit).await {
                        Ok(()) => {
                            self.targets.insert(unit, 0);
                        }
                        Err(err) => warn!(unit, %err, "home failed"),
                    }
                }
            }
            FocuserCommand::Stop(units) => {
                for unit in units {
                    if let Err(err) = self.hw.halt(unit).await {
                        warn!(unit, %err, "stop failed");
                    }
                    self.targets.remove(&unit);
                }
            }
            FocuserCommand::Sync(targets) => {
                for t in targets {
                    if let Err(err) = self.hw.sync(t.unit, t.position).await {
                        warn!(unit = t.unit, %err, "sync failed");
                    }
                }
            }
        }
    }
}

pub struct FocuserValidator {
    units: Vec<UnitId>,
    max_position: u32,
}

impl FocuserValidator {
    #[must_use]
    pub fn new(config: &ObservatoryConfig) -> Self {
        Self {
            units: config.units.clone(),
            max_position: config.focuser.max_position,
        }
    }

    fn check_units(&self, units: &[UnitId]) -> Result<(), RpcError> {
        if units.is_empty() {
            return Err(RpcError::InvalidArgument("no units given".to_owned()));
        }
        let unknown: Vec<UnitId> = units
            .iter()
            .copied()
            .filter(|u| !self.units.contains(u))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RpcError::HardwareNotConnected(unknown))
        }
    }

    fn check_positions(&self, targets: &[FocuserTarget]) -> Result<(), RpcError> {
        for t in targets {
            if t.position > self.max_position {
                return Err(RpcError::InvalidArgument(format!(
                    "position {} exceeds maximum {}",
                    t.position, self.max_position
                )));
            }
        }
        Ok(())
    }
}

fn unit_info<'a>(latest: Option<&'a StatusSnapshot>, unit: UnitId) -> Option<&'a FocuserUnitInfo> {
    match latest {
        Some(StatusSnapshot {
            payload: SubsystemInfo::Focuser(info),
            ..
        }) => info.units.iter().find(|u| u.unit == unit),
        _ => None,
    }
}

impl CommandValidator for FocuserValidator {
    type Command = FocuserCommand;

    fn validate(
        &self,
        request: &Request,
        latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<FocuserCommand>, RpcError> {
        match request {
            Request::MoveFocusers { offsets } => {
                let units: Vec<UnitId> = offsets.iter().map(|(u, _)| *u).collect();
                self.check_units(&units)?;
                Ok(Validated::Queue {
                    command: FocuserCommand::Move(offsets.clone()),
                    ack: format!("moving focusers {units:?}"),
                })
            }
            Request::SetFocusers { targets } => {
                let units: Vec<UnitId> = targets.iter().map(|t| t.unit).collect();
                self.check_units(&units)?;
                self.check_positions(targets)?;
                // Capability checked against the last snapshot; hardware
                // that cannot set absolutely never advertises can_set.
                for &unit in &units {
                    if unit_info(latest, unit).is_some_and(|u| !u.can_set) {
                        return Err(RpcError::InvalidArgument(format!(
                            "unit {unit} does not support absolute moves"
                        )));
                    }
                }
                Ok(Validated::Queue {
                    command: FocuserCommand::Set(targets.clone()),
                    ack: format!("setting focusers {units:?}"),
                })
            }
            Request::HomeFocusers { units } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: FocuserCommand::Home(units.clone()),
                    ack: format!("homing focusers {units:?}"),
                })
            }
            Request::StopFocusers { units } => {
                self.check_units(units)?;
                for &unit in units {
                    if unit_info(latest, unit).is_some_and(|u| !u.can_stop) {
                        return Err(RpcError::InvalidArgument(format!(
                            "unit {unit} does not support stopping mid-move"
                        )));
                    }
                }
                Ok(Validated::Queue {
                    command: FocuserCommand::Stop(units.clone()),
                    ack: format!("stopping focusers {units:?}"),
                })
            }
            Request::SyncFocusers { targets } => {
                let units: Vec<UnitId> = targets.iter().map(|t| t.unit).collect();
                self.check_units(&units)?;
                self.check_positions(targets)?;
                Ok(Validated::Queue {
                    command: FocuserCommand::Sync(targets.clone()),
                    ack: format!("syncing focusers {units:?}"),
                })
            }
            _ => Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Foc,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sim::SimFocuser;

    fn config(units: Vec<UnitId>) -> ObservatoryConfig {
        let mut config = ObservatoryConfig::default();
        config.units = units;
        config
    }

    fn focuser_info(tick: &ProgramTick) -> &FocuserInfo {
        match &tick.info {
            SubsystemInfo::Focuser(info) => info,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn move_completion_records_temperature() {
        let config = config(vec![1]);
        let mut program = FocuserProgram::new(SimFocuser::new(&[1], 100_000), &config);

        let tick = program.refresh().await;
        assert_eq!(focuser_info(&tick).units[0].temp_at_last_move, None);

        program
            .execute(FocuserCommand::Set(vec![FocuserTarget {
                unit: 1,
                position: 56_000,
            }]))
            .await;

        let tick = program.refresh().await;
        let unit = &focuser_info(&tick).units[0];
        assert!(unit.moving);
        assert_eq!(unit.target, Some(56_000));

        let mut last_tick = tick;
        for _ in 0..10 {
            last_tick = program.refresh().await;
            if !focuser_info(&last_tick).units[0].moving {
                break;
            }
        }
        let unit = &focuser_info(&last_tick).units[0];
        assert!(!unit.moving);
        assert_eq!(unit.position, 56_000);
        assert_eq!(unit.target, None);
        assert!(unit.temp_at_last_move.is_some());
    }

    #[test]
    fn validator_bounds_and_membership() {
        let validator = FocuserValidator::new(&config(vec![1, 2]));

        assert!(matches!(
            validator.validate(
                &Request::SetFocusers {
                    targets: vec![FocuserTarget {
                        unit: 1,
                        position: 999_999,
                    }],
                },
                None
            ),
            Err(RpcError::InvalidArgument(_))
        ));

        assert!(matches!(
            validator.validate(&Request::HomeFocusers { units: vec![5] }, None),
            Err(RpcError::HardwareNotConnected(units)) if units == vec![5]
        ));

        assert!(matches!(
            validator.validate(&Request::MoveFocusers { offsets: vec![] }, None),
            Err(RpcError::InvalidArgument(_))
        ));

        assert!(matches!(
            validator.validate(
                &Request::MoveFocusers {
                    offsets: vec![(1, -500)],
                },
                None
            ),
            Ok(Validated::Queue { .. })
        ));
    }

    #[test]
    fn validator_respects_capability_flags() {
        let validator = FocuserValidator::new(&config(vec![1]));
        let snapshot = StatusSnapshot {
            daemon_id: DaemonId::Foc,
            time_ns: 1,
            uptime_secs: 1,
            payload: SubsystemInfo::Focuser(FocuserInfo {
                units: vec![FocuserUnitInfo {
                    unit: 1,
                    position: 100,
                    target: None,
                    moving: false,
                    homed: true,
                    can_set: false,
                    can_stop: false,
                    temp_at_last_move: None,
                }],
            }),
        };

        assert!(matches!(
            validator.validate(
                &Request::SetFocusers {
                    targets: vec![FocuserTarget {
                        unit: 1,
                        position: 100,
                    }],
                },
                Some(&snapshot)
            ),
            Err(RpcError::InvalidArgument(_))
        ));

        assert!(matches!(
            validator.validate(&Request::StopFocusers { units: vec![1] }, Some(&snapshot)),
            Err(RpcError::InvalidArgument(_))
        ));

        // Relative moves need no capability.
        assert!(matches!(
            validator.validate(
                &Request::MoveFocusers {
                    offsets: vec![(1, 200)],
                },
                Some(&snapshot)
            ),
            Ok(Validated::Queue { .. })
        ));
    }
}
