//! Meteorological variable identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Variables a dataset can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    /// Hourly precipitation ending at the valid time
    Precip,
    /// Precipitation accumulated since the start of the forecast
    PrecipAcc,
    /// Cloud cover fraction
    Cloud,
    /// 2m temperature
    T,
    /// 10m U-wind
    U,
    /// 10m V-wind
    V,
    /// 10m wind speed
    W,
    /// Wind direction
    Wd,
    /// Relative humidity
    Rh,
    /// Precipitation phase
    Phase,
    /// Surface pressure
    P,
    /// Mean sea-level pressure
    Mslp,
    /// Pressure reduced to sea level with the standard atmosphere
    Qnh,
    /// Placeholder used by tests
    Fake,
}

impl Variable {
    pub const ALL: [Variable; 14] = [
        Self::Precip,
        Self::PrecipAcc,
        Self::Cloud,
        Self::T,
        Self::U,
        Self::V,
        Self::W,
        Self::Wd,
        Self::Rh,
        Self::Phase,
        Self::P,
        Self::Mslp,
        Self::Qnh,
        Self::Fake,
    ];

    /// Identifier used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precip => "precip",
            Self::PrecipAcc => "precip_acc",
            Self::Cloud => "cloud",
            Self::T => "t",
            Self::U => "u",
            Self::V => "v",
            Self::W => "w",
            Self::Wd => "wd",
            Self::Rh => "rh",
            Self::Phase => "phase",
            Self::P => "p",
            Self::Mslp => "mslp",
            Self::Qnh => "qnh",
            Self::Fake => "fake",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variable {
    type Err = FieldError;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| FieldError::UnknownVariable(s.to_string()))
    }
}
