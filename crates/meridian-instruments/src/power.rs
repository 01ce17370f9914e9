//! Power daemon.
//!
//! Outlets are addressed by name rather than unit number; the distribution
//! unit itself reports as unit 1 when it cannot be reached.

use async_trait::async_trait;
use tracing::warn;

use meridian_core::config::ObservatoryConfig;
use meridian_daemon::{CommandValidator, ControlProgram, ProgramTick, Validated};
use meridian_proto::{
    DaemonId, PowerInfo, Request, RpcError, StatusSnapshot, SubsystemInfo, UnitId,
};

use crate::hardware::PowerInterface;

/// Unit number the PDU reports under when unreachable.
const PDU_UNIT: UnitId = 1;

#[derive(Debug)]
pub enum PowerCommand {
    On(Vec<String>),
    Off(Vec<String>),
    Reboot(Vec<String>),
}

pub struct PowerProgram<P: PowerInterface> {
    hw: P,
}

impl<P: PowerInterface> PowerProgram<P> {
    pub fn new(hw: P) -> Self {
        Self { hw }
    }
}

#[async_trait]
impl<P: PowerInterface> ControlProgram for PowerProgram<P> {
    type Command = PowerCommand;

    fn daemon_id(&self) -> DaemonId {
        DaemonId::Power
    }

    async fn refresh(&mut self) -> ProgramTick {
        match self.hw.outlets().await {
            Ok(outlets) => ProgramTick {
                info: SubsystemInfo::Power(PowerInfo { outlets }),
                bad_units: Vec::new(),
            },
            Err(err) => {
                warn!(%err, "power distribution unit unreachable");
                ProgramTick {
                    info: SubsystemInfo::Power(PowerInfo { outlets: vec![] }),
                    bad_units: vec![PDU_UNIT],
                }
            }
        }
    }

    async fn execute(&mut self, command: PowerCommand) {
        let (names, on, cycle) = match &command {
            PowerCommand::On(names) => (names, true, false),
            PowerCommand::Off(names) => (names, false, false),
            PowerCommand::Reboot(names) => (names, true, true),
        };
        for name in names {
            let result = if cycle {
                self.hw.cycle_outlet(name).await
            } else {
                self.hw.set_outlet(name, on).await
            };
            if let Err(err) = result {
                warn!(outlet = name, %err, "outlet command failed");
            }
        }
    }
}

pub struct PowerValidator {
    outlets: Vec<String>,
}

impl PowerValidator {
    #[must_use]
    pub fn new(config: &ObservatoryConfig) -> Self {
        Self {
            outlets: config.outlets.clone(),
        }
    }

    fn check_outlets(&self, names: &[String]) -> Result<(), RpcError> {
        if names.is_empty() {
            return Err(RpcError::InvalidArgument("no outlets given".to_owned()));
        }
        for name in names {
            if !self.outlets.contains(name) {
                return Err(RpcError::InvalidArgument(format!(
                    "no outlet named {:?}, have {:?}",
                    name, self.outlets
                )));
            }
        }
        Ok(())
    }
}

impl CommandValidator for PowerValidator {
    type Command = PowerCommand;

    fn validate(
        &self,
        request: &Request,
        _latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<PowerCommand>, RpcError> {
        match request {
            Request::PowerOn { outlets } => {
                self.check_outlets(outlets)?;
                Ok(Validated::Queue {
                    command: PowerCommand::On(outlets.clone()),
                    ack: format!("switching on {outlets:?}"),
                })
            }
            Request::PowerOff { outlets } => {
                self.check_outlets(outlets)?;
                Ok(Validated::Queue {
                    command: PowerCommand::Off(outlets.clone()),
                    ack: format!("switching off {outlets:?}"),
                })
            }
            Request::Reboot { outlets } => {
                self.check_outlets(outlets)?;
                Ok(Validated::Queue {
                    command: PowerCommand::Reboot(outlets.clone()),
                    ack: format!("rebooting {outlets:?}"),
                })
            }
            _ => Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Power,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sim::SimPower;

    #[tokio::test]
    async fn outlet_switching_shows_in_the_next_tick() {
        let names = vec!["mount".to_owned(), "cams".to_owned()];
        let mut program = PowerProgram::new(SimPower::new(&names));

        program.execute(PowerCommand::Off(vec!["cams".to_owned()])).await;
        let tick = program.refresh().await;
        let SubsystemInfo::Power(info) = &tick.info else {
            panic!("wrong payload");
        };
        let cams = info.outlets.iter().find(|o| o.name == "cams").unwrap();
        assert!(!cams.on);
        let mount = info.outlets.iter().find(|o| o.name == "mount").unwrap();
        assert!(mount.on);
    }

    #[test]
    fn validator_rejects_unknown_outlets() {
        let config = ObservatoryConfig::default();
        let validator = PowerValidator::new(&config);

        assert!(matches!(
            validator.validate(
                &Request::PowerOn {
                    outlets: vec!["dome".to_owned()],
                },
                None
            ),
            Err(RpcError::InvalidArgument(_))
        ));
        assert!(matches!(
            validator.validate(&Request::PowerOff { outlets: vec![] }, None),
            Err(RpcError::InvalidArgument(_))
        ));
        assert!(matches!(
            validator.validate(
                &Request::Reboot {
                    outlets: vec!["mount".to_owned()],
                },
                None
            ),
            Ok(Validated::Queue { .. })
        ));
    }
}
