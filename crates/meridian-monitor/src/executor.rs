//! Carrying out recovery actions against live daemons.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use meridian_core::config::RpcConfig;
use meridian_core::DaemonRegistry;
use meridian_daemon::{DaemonClient, DaemonError};
use meridian_supervisor::{RpcProbe, Supervisor, SupervisorError};

use crate::action::{LifecycleOp, RecoveryAction};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Performs recovery actions. The engine never touches the outside world
/// itself, so tests can swap in a recording fake.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &RecoveryAction) -> Result<(), ExecutorError>;
}

/// The real executor: lifecycle operations through the supervisor, RPC
/// commands through a fresh per-call client.
pub struct SiteExecutor {
    supervisor: Supervisor<RpcProbe>,
    registry: Arc<DaemonRegistry>,
    rpc: RpcConfig,
}

impl SiteExecutor {
    #[must_use]
    pub fn new(
        supervisor: Supervisor<RpcProbe>,
        registry: Arc<DaemonRegistry>,
        rpc: RpcConfig,
    ) -> Self {
        Self {
            supervisor,
            registry,
            rpc,
        }
    }
}

#[async_trait]
impl ActionExecutor for SiteExecutor {
    async fn execute(&self, action: &RecoveryAction) -> Result<(), ExecutorError> {
        match action {
            RecoveryAction::Lifecycle { daemon, op } => {
                match op {
                    LifecycleOp::Start => {
                        self.supervisor.start(*daemon).await?;
                    }
                    LifecycleOp::Shutdown => self.supervisor.shutdown(*daemon).await?,
                    LifecycleOp::Kill => self.supervisor.kill(*daemon).await?,
                    LifecycleOp::Restart => {
                        self.supervisor.restart(*daemon).await?;
                    }
                }
                Ok(())
            }
            RecoveryAction::Rpc { daemon, request } => {
                let client = DaemonClient::from_registry(&self.registry, *daemon, &self.rpc)?;
                let ack = client.command(request.clone()).await?;
                info!(%daemon, %ack, "recovery command acknowledged");
                Ok(())
            }
        }
    }
}
