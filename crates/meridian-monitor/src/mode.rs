//! Target states the controller can ask a subsystem to hold.

use std::fmt;

use serde::Serialize;

/// What a monitor should steer its subsystem towards.
///
/// Only the controller sets modes; monitors validate against their
/// strategy's advertised set and judge hardware state relative to the
/// current target. The same cover position is healthy in one mode and an
/// error in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Subsystem just needs to be up.
    Active,
    /// Covers held closed (daytime, bad weather).
    Closed,
    /// Covers held open (observing).
    Open,
    /// Sensors at operating temperature.
    Cool,
    /// Sensors at standby temperature.
    Warm,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Cool => "cool",
            Self::Warm => "warm",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            "cool" => Ok(Self::Cool),
            "warm" => Ok(Self::Warm),
            other => Err(UnknownMode(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognised mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(pub String);
