//! Command implementations.

pub mod cam;
pub mod covers;
pub mod filt;
pub mod foc;
pub mod lifecycle;
pub mod power;

use std::sync::Arc;

use meridian_core::{DaemonRegistry, ObservatoryConfig};
use meridian_daemon::DaemonClient;
use meridian_proto::{DaemonId, UnitId};

/// Everything a command needs to reach the site.
pub struct Context {
    pub config: ObservatoryConfig,
    pub registry: Arc<DaemonRegistry>,
}

impl Context {
    pub fn new(config: ObservatoryConfig) -> Self {
        let registry = Arc::new(DaemonRegistry::from_config(&config));
        Self { config, registry }
    }

    pub fn client(&self, daemon: DaemonId) -> anyhow::Result<DaemonClient> {
        Ok(DaemonClient::from_registry(
            &self.registry,
            daemon,
            &self.config.rpc,
        )?)
    }

    /// An empty unit list on the command line means all configured units.
    pub fn units_or_all(&self, units: Vec<UnitId>) -> Vec<UnitId> {
        if units.is_empty() {
            self.config.units.clone()
        } else {
            units
        }
    }
}

/// Sends a command and prints the acknowledgement.
pub async fn send(
    ctx: &Context,
    daemon: DaemonId,
    request: meridian_proto::Request,
) -> anyhow::Result<()> {
    let ack = ctx.client(daemon)?.command(request).await?;
    println!("{ack}");
    Ok(())
}
