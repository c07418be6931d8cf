use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AltRouteError;

/// Process-wide alternative routing toggle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingStatus {
    /// Always use canonical hosts
    Off,
    /// Route through proxy domains when a DoH-solvable failure happens
    #[default]
    On,
    /// Treat any failure on a canonical host as worth rerouting
    #[serde(rename = "force")]
    ForceAlternativeRouting,
}

impl RoutingStatus {
    /// Stable numeric representation, used for atomic storage
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::ForceAlternativeRouting => 2,
        }
    }

    /// Inverse of [`Self::as_u8`]; unknown values read as `On`
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Off,
            2 => Self::ForceAlternativeRouting,
            _ => Self::On,
        }
    }
}

impl fmt::Display for RoutingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::On => "on",
            Self::ForceAlternativeRouting => "force",
        };
        f.write_str(name)
    }
}

impl FromStr for RoutingStatus {
    type Err = AltRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "force" | "forcealternativerouting" => Ok(Self::ForceAlternativeRouting),
            other => Err(AltRouteError::Config(format!(
                "unknown routing status: {other}"
            ))),
        }
    }
}
