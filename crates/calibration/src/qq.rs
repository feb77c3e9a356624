//! Quantile-quantile mapping.
//!
//! Parameters hold a table of matching quantiles, interleaved as
//! `[obs0, fcst0, obs1, fcst1, ...]` with both sequences sorted ascending.
//! Raw values strictly inside the forecast range are mapped by linear
//! interpolation; values outside are extrapolated from the nearest table
//! point with a slope chosen by [`ExtrapolationPolicy`].
//!
//! When calibrating, each table is prepared once into
//! `[fcst0, fcst1, ..., obs0, obs1, ...]` with incomplete pairs dropped.

use std::fmt;
use std::str::FromStr;

use ensemble_field::{interpolate, is_valid, Variable, MISSING};
use serde::{Deserialize, Serialize};

use crate::calibrator::{CalibrationStrategy, MemberPolicy};
use crate::error::{CalibrationError, Result};
use crate::parameters::Parameters;

/// Slope used outside the range of the quantile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrapolationPolicy {
    /// Slope 1: shift by the offset at the nearest table point.
    #[default]
    OneToOne,
    /// Slope between the first and last table points.
    MeanSlope,
    /// Slope of the two table points nearest the value.
    NearestSlope,
    /// Slope 0: clamp to the nearest table point.
    Zero,
}

impl ExtrapolationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::MeanSlope => "mean_slope",
            Self::NearestSlope => "nearest_slope",
            Self::Zero => "zero",
        }
    }
}

impl fmt::Display for ExtrapolationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtrapolationPolicy {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "one_to_one" | "1to1" => Ok(Self::OneToOne),
            "mean_slope" | "meanslope" => Ok(Self::MeanSlope),
            "nearest_slope" | "nearestslope" => Ok(Self::NearestSlope),
            "zero" => Ok(Self::Zero),
            other => Err(CalibrationError::invalid_option(
                "extrapolation",
                format!("unknown policy '{}'", other),
            )),
        }
    }
}

/// Quantile-quantile calibrator.
#[derive(Debug, Clone)]
pub struct Qq {
    variable: Variable,
    policy: ExtrapolationPolicy,
}

impl Qq {
    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            policy: ExtrapolationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExtrapolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ExtrapolationPolicy {
        self.policy
    }

    /// Map one raw value through the interleaved table in `parameters`.
    pub fn map_value(&self, raw: f32, parameters: &Parameters) -> f32 {
        let table = split_table(parameters);
        QuantileTable::new(&table).map(raw, self.policy)
    }
}

/// Complete (obs, fcst) pairs laid out as all forecasts, then all observations.
fn split_table(parameters: &Parameters) -> Parameters {
    let (mut fcst, obs): (Vec<f32>, Vec<f32>) = parameters
        .values()
        .chunks_exact(2)
        .filter(|pair| is_valid(pair[0]) && is_valid(pair[1]))
        .map(|pair| (pair[1], pair[0]))
        .unzip();
    fcst.extend(obs);
    Parameters::new(fcst)
}

/// View of a prepared table.
struct QuantileTable<'a> {
    obs: &'a [f32],
    fcst: &'a [f32],
}

impl<'a> QuantileTable<'a> {
    fn new(prepared: &'a Parameters) -> Self {
        let (fcst, obs) = prepared.values().split_at(prepared.len() / 2);
        Self { obs, fcst }
    }

    fn map(&self, raw: f32, policy: ExtrapolationPolicy) -> f32 {
        let n = self.fcst.len();
        if !is_valid(raw) || n == 0 {
            return MISSING;
        }

        let last = n - 1;
        if raw > self.fcst[0] && raw < self.fcst[last] {
            return interpolate(raw, self.fcst, self.obs);
        }

        let upper = raw >= self.fcst[last];
        let (nearest_obs, nearest_fcst) = if upper {
            (self.obs[last], self.fcst[last])
        } else {
            (self.obs[0], self.fcst[0])
        };

        let slope = if n <= 1 {
            1.0
        } else {
            match policy {
                ExtrapolationPolicy::OneToOne => 1.0,
                ExtrapolationPolicy::Zero => 0.0,
                ExtrapolationPolicy::MeanSlope => {
                    (self.obs[last] - self.obs[0]) / (self.fcst[last] - self.fcst[0])
                }
                ExtrapolationPolicy::NearestSlope => {
                    if upper {
                        (self.obs[last] - self.obs[last - 1]) / (self.fcst[last] - self.fcst[last - 1])
                    } else {
                        (self.obs[1] - self.obs[0]) / (self.fcst[1] - self.fcst[0])
                    }
                }
            }
        };
        // A flat forecast column gives no usable slope.
        let slope = if is_valid(slope) { slope } else { 1.0 };

        nearest_obs + slope * (raw - nearest_fcst)
    }
}

impl CalibrationStrategy for Qq {
    fn name(&self) -> &'static str {
        "qq"
    }

    fn variable(&self) -> Variable {
        self.variable
    }

    fn member_policy(&self) -> MemberPolicy {
        MemberPolicy::PerMember
    }

    fn validate_parameters(&self, parameters: &Parameters) -> Result<()> {
        if parameters.len() < 2 || parameters.len() % 2 != 0 {
            return Err(CalibrationError::invalid_parameter_count(
                self.name(),
                "an even number (at least 2) of",
                parameters.len(),
            ));
        }
        Ok(())
    }

    fn prepare(&self, parameters: &Parameters) -> Option<Parameters> {
        Some(split_table(parameters))
    }

    fn calibrate_cell(&self, raw: &[f32], parameters: &Parameters, output: &mut [f32]) {
        let table = QuantileTable::new(parameters);
        for (out, &value) in output.iter_mut().zip(raw) {
            *out = table.map(value, self.policy);
        }
    }
}
