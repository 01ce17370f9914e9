//! Mirror cover daemon.

use async_trait::async_trait;
use tracing::warn;

use meridian_core::config::ObservatoryConfig;
use meridian_daemon::{CommandValidator, ControlProgram, ProgramTick, Validated};
use meridian_proto::{
    CoversInfo, CoversUnitInfo, DaemonId, Request, RpcError, StatusSnapshot, SubsystemInfo, UnitId,
};

use crate::hardware::CoverInterface;

#[derive(Debug)]
pub enum CoversCommand {
    Open(Vec<UnitId>),
    Close(Vec<UnitId>),
    Stop(Vec<UnitId>),
}

pub struct CoversProgram<C: CoverInterface> {
    hw: C,
    units: Vec<UnitId>,
}

impl<C: CoverInterface> CoversProgram<C> {
    pub fn new(hw: C, config: &ObservatoryConfig) -> Self {
        Self {
            hw,
            units: config.units.clone(),
        }
    }
}

#[async_trait]
impl<C: CoverInterface> ControlProgram for CoversProgram<C> {
    type Command = CoversCommand;

    fn daemon_id(&self) -> DaemonId {
        DaemonId::Covers
    }

    async fn refresh(&mut self) -> ProgramTick {
        let mut bad = Vec::new();
        let mut units = Vec::new();
        for unit in self.units.clone() {
            match self.hw.reading(unit).await {
                Ok(reading) => units.push(CoversUnitInfo {
                    unit,
                    position: reading.position,
                    moving: reading.moving,
                }),
                Err(err) => {
                    warn!(unit, %err, "cover poll failed");
                    bad.push(unit);
                }
            }
        }
        ProgramTick {
            info: SubsystemInfo::Covers(CoversInfo { units }),
            bad_units: bad,
        }
    }

    async fn execute(&mut self, command: CoversCommand) {
        match command {
            CoversCommand::Open(units) => {
                for unit in units {
                    if let Err(err) = self.hw.open(unit).await {
                        warn!(unit, %err, "cover open failed");
                    }
                }
            }
            CoversCommand::Close(units) => {
                for unit in units {
                    if let Err(err) = self.hw.close(unit).await {
                        warn!(unit, %err, "cover close failed");
                    }
                }
            }
            CoversCommand::Stop(units) => {
                for unit in units {
                    if let Err(err) = self.hw.halt(unit).await {
                        warn!(unit, %err, "cover halt failed");
                    }
                }
            }
        }
    }
}

pub struct CoversValidator {
    units: Vec<UnitId>,
}

impl CoversValidator {
    #[must_use]
    pub fn new(config: &ObservatoryConfig) -> Self {
        Self {
            units: config.units.clone(),
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

impl CommandValidator for CoversValidator {
    type Command = CoversCommand;

    fn validate(
        &self,
        request: &Request,
        _latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<CoversCommand>, RpcError> {
        match request {
            Request::OpenCovers { units } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: CoversCommand::Open(units.clone()),
                    ack: format!("opening covers {units:?}"),
                })
            }
            Request::CloseCovers { units } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: CoversCommand::Close(units.clone()),
                    ack: format!("closing covers {units:?}"),
                })
            }
            Request::StopCovers { units } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: CoversCommand::Stop(units.clone()),
                    ack: format!("stopping covers {units:?}"),
                })
            }
            _ => Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Covers,
            }),
        }
    }
}
