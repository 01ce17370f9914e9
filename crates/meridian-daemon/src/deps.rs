//! Dependency health tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use meridian_proto::DaemonId;

use crate::client::DaemonClient;

/// Polls the daemons this one depends on, once per control-loop tick.
///
/// A dependency is marked bad on its first failed check; there is no
/// tolerance window before the status reflects it. The grace period only
/// controls log severity, so a dependency bouncing during a deliberate
/// restart warns rather than screams.
#[derive(Debug)]
pub struct DependencyTracker {
    deps: Vec<DaemonClient>,
    first_bad: HashMap<DaemonId, Instant>,
    grace: Duration,
}

impl DependencyTracker {
    #[must_use]
    pub fn new(deps: Vec<DaemonClient>, grace: Duration) -> Self {
        Self {
            deps,
            first_bad: HashMap::new(),
            grace,
        }
    }

    /// Checks every dependency, returning the bad ones.
    pub async fn check(&mut self) -> Vec<DaemonId> {
        let mut bad = Vec::new();
        for client in &self.deps {
            let daemon = client.daemon();
            let reason = match client.get_status().await {
                Ok(status) if status.is_running() => {
                    // Recovery clears the record immediately.
                    self.first_bad.remove(&daemon);
                    continue;
                }
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };

            bad.push(daemon);
            let since = *self.first_bad.entry(daemon).or_insert_with(Instant::now);
            if since.elapsed() < self.grace {
                warn!(dependency = %daemon, %reason, "dependency check failed");
            } else {
                error!(dependency = %daemon, %reason, "dependency still failing");
            }
        }
        bad
    }

    /// Whether this tracker has any dependencies at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}
