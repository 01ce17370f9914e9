//! Observatory-wide configuration.
//!
//! One configuration file covers the whole site: every daemon and the pilot
//! load the same `ObservatoryConfig`, so endpoint derivation, unit lists and
//! timing parameters can never disagree between processes. Values come from
//! a TOML file merged with `MERIDIAN_`-prefixed environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use thiserror::Error;

use meridian_proto::UnitId;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file or environment could not be parsed.
    #[error("configuration error: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Top-level site configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservatoryConfig {
    /// Site name, used in logs and image headers.
    pub site_name: String,
    /// Directory for pidfiles and Unix sockets.
    pub run_dir: PathBuf,
    /// Directory for images, the exposure ledger and the run counter.
    pub data_dir: PathBuf,
    /// Directory holding observing scripts run by the pilot.
    pub script_dir: PathBuf,
    /// Telescope unit numbers installed on the mount.
    pub units: Vec<UnitId>,
    /// Filter names available in each wheel, in carousel order.
    pub filters: Vec<String>,
    /// Named switched outlets on the power distribution unit.
    pub outlets: Vec<String>,
    /// How daemon endpoints are derived.
    pub endpoint: EndpointConfig,
    pub daemon: DaemonConfig,
    pub rpc: RpcConfig,
    pub camera: CameraConfig,
    pub focuser: FocuserConfig,
    pub supervisor: SupervisorConfig,
    pub monitor: MonitorConfig,
    pub pilot: PilotConfig,
}

impl Default for ObservatoryConfig {
    fn default() -> Self {
        Self {
            site_name: "meridian".to_owned(),
            run_dir: PathBuf::from("/run/meridian"),
            data_dir: PathBuf::from("/var/lib/meridian"),
            script_dir: PathBuf::from("/usr/share/meridian/scripts"),
            units: vec![1, 2, 3, 4],
            filters: vec!["L".into(), "R".into(), "G".into(), "B".into()],
            outlets: vec![
                "mount".into(),
                "cams".into(),
                "focusers".into(),
                "covers".into(),
            ],
            endpoint: EndpointConfig::default(),
            daemon: DaemonConfig::default(),
            rpc: RpcConfig::default(),
            camera: CameraConfig::default(),
            focuser: FocuserConfig::default(),
            supervisor: SupervisorConfig::default(),
            monitor: MonitorConfig::default(),
            pilot: PilotConfig::default(),
        }
    }
}

impl ObservatoryConfig {
    /// Loads configuration from an optional TOML file merged with
    /// `MERIDIAN_`-prefixed environment variables.
    ///
    /// Environment variables win, with `__` separating nesting levels
    /// (`MERIDIAN_DAEMON__LOOP_INTERVAL=2`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }
}

/// How daemon endpoints are derived from the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub mode: EndpointMode,
    /// Host daemons listen on in TCP mode.
    pub host: IpAddr,
    /// First TCP port; daemons take consecutive ports in startup order.
    pub base_port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mode: EndpointMode::Unix,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 6260,
        }
    }
}

/// Endpoint derivation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointMode {
    /// Unix sockets under `run_dir`.
    Unix,
    /// Consecutive TCP ports from `base_port`.
    Tcp,
}

/// Control-loop timing shared by all daemons.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Interval between control-loop ticks.
    #[serde(with = "serde_duration_secs")]
    pub loop_interval: Duration,
    /// A snapshot older than this marks the daemon stale.
    #[serde(with = "serde_duration_secs")]
    pub liveness_window: Duration,
    /// How long a dependency may stay bad before warnings escalate to errors.
    #[serde(with = "serde_duration_secs")]
    pub dependency_grace: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_secs(1),
            liveness_window: Duration::from_secs(10),
            dependency_grace: Duration::from_secs(5),
        }
    }
}

/// Client-side RPC timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    #[serde(with = "serde_duration_secs")]
    pub connect_timeout: Duration,
    #[serde(with = "serde_duration_secs")]
    pub request_timeout: Duration,
    /// Longest a forced info refresh may wait for a fresh snapshot.
    #[serde(with = "serde_duration_secs")]
    pub force_update_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            force_update_timeout: Duration::from_secs(20),
        }
    }
}

/// Camera pipeline parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Operating sensor temperature in Celsius.
    pub cool_temperature: f64,
    /// Standby sensor temperature in Celsius.
    pub warm_temperature: f64,
    /// A unit within this margin of target counts as at temperature.
    pub temperature_margin: f64,
    /// Largest accepted binning factor.
    pub max_binning: u8,
    /// Minimum wall-clock time between exposure start and image save.
    #[serde(with = "serde_duration_secs")]
    pub min_save_delay: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            cool_temperature: -20.0,
            warm_temperature: 10.0,
            temperature_margin: 0.5,
            max_binning: 8,
            min_save_delay: Duration::from_secs(1),
        }
    }
}

/// Focuser limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FocuserConfig {
    /// Upper travel limit in motor steps.
    pub max_position: u32,
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            max_position: 100_000,
        }
    }
}

/// Daemon lifecycle timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long a started daemon has to become responsive.
    #[serde(with = "serde_duration_secs")]
    pub start_timeout: Duration,
    /// How long a daemon has to exit after a graceful shutdown request.
    #[serde(with = "serde_duration_secs")]
    pub shutdown_timeout: Duration,
    /// Pause between shutdown and start during a restart.
    #[serde(with = "serde_duration_secs")]
    pub restart_settle: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(20),
            restart_settle: Duration::from_secs(2),
        }
    }
}

/// Monitor check cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Check interval while everything is healthy.
    #[serde(with = "serde_duration_secs")]
    pub good_interval: Duration,
    /// Check interval while any error is active.
    #[serde(with = "serde_duration_secs")]
    pub bad_interval: Duration,
    /// Continuous good time before reverting to the slow cadence.
    #[serde(with = "serde_duration_secs")]
    pub revert_after: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            good_interval: Duration::from_secs(30),
            bad_interval: Duration::from_secs(10),
            revert_after: Duration::from_secs(60),
        }
    }
}

/// Pilot process settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    /// HTTP status API listen address.
    pub api_listen_addr: SocketAddr,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            api_listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 6250),
        }
    }
}

/// Serde helper for Duration as seconds.
pub(crate) mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
