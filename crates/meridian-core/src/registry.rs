//! Daemon registry: identity to endpoint and process descriptor.
//!
//! Built once from [`ObservatoryConfig`] and shared read-only. Everything a
//! caller needs to reach or manage a daemon lives here, so the pilot, the
//! CLI and the supervisor never derive paths or ports independently.

use std::net::SocketAddr;
use std::path::PathBuf;

use dashmap::DashMap;

use meridian_proto::DaemonId;

use crate::config::{EndpointMode, ObservatoryConfig};
use crate::transport::Transport;

/// Everything known about one daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSpec {
    pub id: DaemonId,
    /// RPC endpoint the daemon listens on.
    pub transport: Transport,
    /// Executable that runs this daemon.
    pub program: String,
    /// Arguments passed when spawning.
    pub args: Vec<String>,
    /// Pidfile written by the daemon on startup.
    pub pidfile: PathBuf,
    /// Daemons that must be healthy for this one to operate.
    pub dependencies: Vec<DaemonId>,
}

/// Registry of all daemons at the site.
#[derive(Debug)]
pub struct DaemonRegistry {
    entries: DashMap<DaemonId, DaemonSpec>,
}

impl DaemonRegistry {
    /// Derives the full registry from site configuration.
    ///
    /// TCP ports are assigned consecutively from `base_port` in startup
    /// order, so the mapping is stable across processes.
    #[must_use]
    pub fn from_config(config: &ObservatoryConfig) -> Self {
        let entries = DashMap::new();
        for (index, id) in DaemonId::ALL.into_iter().enumerate() {
            let transport = match config.endpoint.mode {
                EndpointMode::Unix => {
                    Transport::unix(config.run_dir.join(format!("{id}.sock")))
                }
                EndpointMode::Tcp => Transport::tcp(SocketAddr::new(
                    config.endpoint.host,
                    config.endpoint.base_port + index as u16,
                )),
            };
            // Everything except power itself needs power to be up.
            let dependencies = match id {
                DaemonId::Power => Vec::new(),
                _ => vec![DaemonId::Power],
            };
            entries.insert(
                id,
                DaemonSpec {
                    id,
                    transport,
                    program: format!("meridian-{id}d"),
                    args: Vec::new(),
                    pidfile: config.run_dir.join(format!("{id}.pid")),
                    dependencies,
                },
            );
        }
        Self { entries }
    }

    /// Looks up one daemon.
    #[must_use]
    pub fn get(&self, id: DaemonId) -> Option<DaemonSpec> {
        self.entries.get(&id).map(|e| e.clone())
    }

    /// Endpoint for one daemon.
    #[must_use]
    pub fn transport(&self, id: DaemonId) -> Option<Transport> {
        self.entries.get(&id).map(|e| e.transport.clone())
    }

    /// All registered daemons in startup order.
    #[must_use]
    pub fn specs(&self) -> Vec<DaemonSpec> {
        DaemonId::ALL
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;

    #[test]
    fn unix_endpoints_live_under_run_dir() {
        let config = ObservatoryConfig::default();
        let registry = DaemonRegistry::from_config(&config);

        let spec = registry.get(DaemonId::Cam).unwrap();
        assert_eq!(spec.program, "meridian-camd");
        assert_eq!(
            spec.transport,
            Transport::unix(config.run_dir.join("cam.sock"))
        );
        assert_eq!(spec.pidfile, config.run_dir.join("cam.pid"));
    }

    #[test]
    fn tcp_ports_are_consecutive_in_startup_order() {
        let config = ObservatoryConfig {
            endpoint: EndpointConfig {
                mode: EndpointMode::Tcp,
                base_port: 7000,
                ..EndpointConfig::default()
            },
            ..ObservatoryConfig::default()
        };
        let registry = DaemonRegistry::from_config(&config);

        // Power is first in startup order.
        match registry.transport(DaemonId::Power).unwrap() {
            Transport::Tcp { addr } => assert_eq!(addr.port(), 7000),
            other => panic!("expected tcp, got {other}"),
        }
        match registry.transport(DaemonId::Covers).unwrap() {
            Transport::Tcp { addr } => assert_eq!(addr.port(), 7004),
            other => panic!("expected tcp, got {other}"),
        }
    }

    #[test]
    fn power_has_no_dependencies() {
        let registry = DaemonRegistry::from_config(&ObservatoryConfig::default());
        assert!(registry.get(DaemonId::Power).unwrap().dependencies.is_empty());
        assert_eq!(
            registry.get(DaemonId::Cam).unwrap().dependencies,
            vec![DaemonId::Power]
        );
    }
}
