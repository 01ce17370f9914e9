//! Identifiers shared across the protocol.

use std::fmt;
use std::str::FromStr;

use rkyv::{Archive, Deserialize, Serialize};

/// Hardware unit number within a daemon (telescope position on the mount).
pub type UnitId = u8;

/// Logical identity of a hardware daemon.
///
/// Each daemon owns one subsystem across all telescope units. The identity
/// maps to an endpoint and a process descriptor in the daemon registry.
#[derive(
    Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[rkyv(compare(PartialEq), derive(Debug, Clone, Copy, PartialEq, Eq, Hash))]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonId {
    /// Camera daemon (exposure pipeline).
    Cam,
    /// Focuser daemon.
    Foc,
    /// Filter wheel daemon.
    Filt,
    /// Mirror cover daemon.
    Covers,
    /// Power distribution daemon.
    Power,
}

impl DaemonId {
    /// All daemon identities, in startup order.
    ///
    /// Power comes first because every other subsystem draws from it.
    pub const ALL: [Self; 5] = [Self::Power, Self::Cam, Self::Foc, Self::Filt, Self::Covers];

    /// Returns the short name used in endpoints, pidfiles and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cam => "cam",
            Self::Foc => "foc",
            Self::Filt => "filt",
            Self::Covers => "covers",
            Self::Power => "power",
        }
    }
}

impl fmt::Display for DaemonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonId {
    type Err = UnknownDaemon;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cam" => Ok(Self::Cam),
            "foc" => Ok(Self::Foc),
            "filt" => Ok(Self::Filt),
            "covers" => Ok(Self::Covers),
            "power" => Ok(Self::Power),
            other => Err(UnknownDaemon(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognised daemon name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown daemon: {0}")]
pub struct UnknownDaemon(pub String);

/// Correlation ID for request/response matching.
///
/// Uses ULID format (128-bit, lexicographically sortable, monotonic).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[rkyv(compare(PartialEq))]
pub struct CorrelationId(pub [u8; 16]);

impl CorrelationId {
    /// Creates a new correlation ID from the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_bytes())
    }

    /// Creates a correlation ID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ulid::Ulid::from_bytes(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_id_roundtrip() {
        for id in DaemonId::ALL {
            let parsed: DaemonId = id.as_str().parse().unwrap();
            assert_eq!(parsed, id);
        }
        assert!("dome".parse::<DaemonId>().is_err());
    }

    #[test]
    fn correlation_id_display() {
        let id = CorrelationId::new();
        // ULID is 26 characters
        assert_eq!(id.to_string().len(), 26);
    }
}
