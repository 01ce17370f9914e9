//! Operator notification.

use async_trait::async_trait;

use meridian_monitor::ErrorKind;
use meridian_proto::DaemonId;
use tracing::{error, info, warn};

/// Sink for events an operator should hear about.
///
/// The pilot ships with [`LogNotifier`]; sites wire their own paging or
/// chat integrations behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn error_appeared(&self, daemon: DaemonId, kind: ErrorKind);

    async fn error_fixed(&self, daemon: DaemonId, kind: ErrorKind);

    async fn recovery_exhausted(&self, daemon: DaemonId, kind: ErrorKind);

    /// The site is being driven to a safe state.
    async fn emergency(&self, reason: &str);
}

/// Notifier that writes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn error_appeared(&self, daemon: DaemonId, kind: ErrorKind) {
        warn!(%daemon, %kind, "error appeared");
    }

    async fn error_fixed(&self, daemon: DaemonId, kind: ErrorKind) {
        info!(%daemon, %kind, "error fixed");
    }

    async fn recovery_exhausted(&self, daemon: DaemonId, kind: ErrorKind) {
        error!(%daemon, %kind, "recovery exhausted, operator attention needed");
    }

    async fn emergency(&self, reason: &str) {
        error!(reason, "emergency shutdown");
    }
}
