//! Filter wheel daemon.

use async_trait::async_trait;
use tracing::warn;

use meridian_core::config::ObservatoryConfig;
use meridian_daemon::{CommandValidator, ControlProgram, ProgramTick, Validated};
use meridian_proto::{
    DaemonId, FilterAssignment, FilterWheelInfo, FilterWheelUnitInfo, Request, RpcError,
    StatusSnapshot, SubsystemInfo, UnitId,
};

use crate::hardware::FilterWheelInterface;

#[derive(Debug)]
pub enum FilterCommand {
    Set(Vec<FilterAssignment>),
    Home(Vec<UnitId>),
}

pub struct FilterWheelProgram<W: FilterWheelInterface> {
    hw: W,
    units: Vec<UnitId>,
}

impl<W: FilterWheelInterface> FilterWheelProgram<W> {
    pub fn new(hw: W, config: &ObservatoryConfig) -> Self {
        Self {
            hw,
            units: config.units.clone(),
        }
    }
}

#[async_trait]
impl<W: FilterWheelInterface> ControlProgram for FilterWheelProgram<W> {
    type Command = FilterCommand;

    fn daemon_id(&self) -> DaemonId {
        DaemonId::Filt
    }

    async fn refresh(&mut self) -> ProgramTick {
        let mut bad = Vec::new();
        let mut units = Vec::new();
        for unit in self.units.clone() {
            match self.hw.reading(unit).await {
                Ok(reading) => units.push(FilterWheelUnitInfo {
                    unit,
                    current_filter: reading.current_filter,
                    homed: reading.homed,
                    moving: reading.moving,
                }),
                Err(err) => {
                    warn!(unit, %err, "filter wheel poll failed");
                    bad.push(unit);
                }
            }
        }
        ProgramTick {
            info: SubsystemInfo::FilterWheel(FilterWheelInfo { units }),
            bad_units: bad,
        }
    }

    async fn execute(&mut self, command: FilterCommand) {
        match command {
            FilterCommand::Set(assignments) => {
                for a in assignments {
                    if let Err(err) = self.hw.select(a.unit, &a.filter).await {
                        warn!(unit = a.unit, filter = a.filter, %err, "filter change failed");
                    }
                }
            }
            FilterCommand::Home(units) => {
                for unit in units {
                    if let Err(err) = self.hw.home(unit).await {
                        warn!(unit, %err, "wheel home failed");
                    }
                }
            }
        }
    }
}

pub struct FilterWheelValidator {
    units: Vec<UnitId>,
    filters: Vec<String>,
}

impl FilterWheelValidator {
    #[must_use]
    pub fn new(config: &ObservatoryConfig) -> Self {
        Self {
            units: config.units.clone(),
            filters: config.filters.clone(),
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
}

impl CommandValidator for FilterWheelValidator {
    type Command = FilterCommand;

    fn validate(
        &self,
        request: &Request,
        _latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<FilterCommand>, RpcError> {
        match request {
            Request::SetFilters { assignments } => {
                let units: Vec<UnitId> = assignments.iter().map(|a| a.unit).collect();
                self.check_units(&units)?;
                for a in assignments {
                    if !self.filters.contains(&a.filter) {
                        return Err(RpcError::InvalidArgument(format!(
                            "no filter named {:?}, have {:?}",
                            a.filter, self.filters
                        )));
                    }
                }
                Ok(Validated::Queue {
                    command: FilterCommand::Set(assignments.clone()),
                    ack: format!("changing filters on {units:?}"),
                })
            }
            Request::HomeFilters { units } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: FilterCommand::Home(units.clone()),
                    ack: format!("homing wheels {units:?}"),
                })
            }
            _ => Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Filt,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sim::SimFilterWheel;

    fn config() -> ObservatoryConfig {
        let mut config = ObservatoryConfig::default();
        config.units = vec![1];
        config
    }

    #[tokio::test]
    async fn home_then_select_lands_on_the_filter() {
        let config = config();
        let sim = SimFilterWheel::new(&[1], config.filters.clone());
        let mut program = FilterWheelProgram::new(sim, &config);

        program.execute(FilterCommand::Home(vec![1])).await;
        for _ in 0..10 {
            let tick = program.refresh().await;
            let SubsystemInfo::FilterWheel(info) = &tick.info else {
                panic!("wrong payload");
            };
            if info.units[0].homed && !info.units[0].moving {
                break;
            }
        }

        program
            .execute(FilterCommand::Set(vec![FilterAssignment {
                unit: 1,
                filter: "R".to_owned(),
            }]))
            .await;
        let mut current = None;
        for _ in 0..10 {
            let tick = program.refresh().await;
            let SubsystemInfo::FilterWheel(info) = &tick.info else {
                panic!("wrong payload");
            };
            if !info.units[0].moving {
                current = info.units[0].current_filter.clone();
                break;
            }
        }
        assert_eq!(current.as_deref(), Some("R"));
    }

    #[test]
    fn validator_rejects_unknown_filters_and_units() {
        let validator = FilterWheelValidator::new(&config());

        assert!(matches!(
            validator.validate(
                &Request::SetFilters {
                    assignments: vec![FilterAssignment {
                        unit: 1,
                        filter: "Halpha".to_owned(),
                    }],
                },
                None
            ),
            Err(RpcError::InvalidArgument(_))
        ));

        assert!(matches!(
            validator.validate(&Request::HomeFilters { units: vec![9] }, None),
            Err(RpcError::HardwareNotConnected(units)) if units == vec![9]
        ));

        assert!(matches!(
            validator.validate(&Request::OpenCovers { units: vec![1] }, None),
            Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Filt
            })
        ));
    }
}
