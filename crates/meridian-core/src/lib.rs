//! Core infrastructure for meridian.
//!
//! Shared components used by every daemon and the pilot:
//!
//! - **Transport**: Abstraction over Unix sockets and TCP for daemon RPC
//! - **Registry**: Maps daemon identities to endpoints and process descriptors
//! - **Config**: Observatory-wide configuration, loaded from TOML plus
//!   `MERIDIAN_`-prefixed environment variables

pub mod config;
pub mod registry;
pub mod transport;

pub use config::{ConfigError, EndpointMode, ObservatoryConfig};
pub use registry::{DaemonRegistry, DaemonSpec};
pub use transport::{Connection, Listener, Transport, TransportError};
