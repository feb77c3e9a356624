//! Precipitation phase from wet-bulb temperature.
//!
//! Every member is classified as no precipitation, rain, sleet or snow. The
//! wet-bulb temperature is derived from temperature, pressure and relative
//! humidity, then compared against two thresholds taken from the parameter
//! source: `[snow_sleet, sleet_rain]` in Kelvin. Extra coefficients in a set
//! are ignored.

use std::fmt;
use std::sync::Arc;

use ensemble_field::{all_valid, is_valid, Dataset, Variable, MISSING};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calibrator::{CalibrationReport, CellOutcome, DatasetCalibration};
use crate::error::{CalibrationError, Result};
use crate::parameters::{ParameterSource, Parameters};

/// Phase categories, stored in the output field as their numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipPhase {
    None = 0,
    Rain = 1,
    Sleet = 2,
    Snow = 3,
}

impl PrecipPhase {
    pub fn value(self) -> f32 {
        self as u8 as f32
    }
}

/// Writes [`Variable::Phase`] from precipitation, temperature, relative
/// humidity and pressure.
pub struct PhaseCalibrator {
    parameters: Arc<dyn ParameterSource>,
    min_precip: f32,
}

impl fmt::Debug for PhaseCalibrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseCalibrator")
            .field("min_precip", &self.min_precip)
            .field("location_dependent", &self.parameters.is_location_dependent())
            .finish()
    }
}

impl PhaseCalibrator {
    /// Precipitation at or below this amount (mm) is classified as none.
    pub const DEFAULT_MIN_PRECIP: f32 = 0.2;

    /// Fields read by the pass.
    pub const INPUTS: [Variable; 4] = [Variable::Precip, Variable::T, Variable::Rh, Variable::P];

    pub fn new(parameters: Arc<dyn ParameterSource>) -> Result<Self> {
        let mut count = 0;
        for set in parameters.parameter_sets() {
            if set.len() < 2 {
                return Err(CalibrationError::invalid_parameter_count(
                    "phase",
                    "at least 2",
                    set.len(),
                ));
            }
            count += 1;
        }
        if count == 0 {
            return Err(CalibrationError::EmptyParameterSource);
        }

        debug!(
            parameter_sets = count,
            location_dependent = parameters.is_location_dependent(),
            "Created phase calibrator"
        );
        Ok(Self {
            parameters,
            min_precip: Self::DEFAULT_MIN_PRECIP,
        })
    }

    pub fn with_min_precip(mut self, min_precip: f32) -> Result<Self> {
        Self::validate_min_precip(min_precip)?;
        self.min_precip = min_precip;
        Ok(self)
    }

    pub fn validate_min_precip(min_precip: f32) -> Result<()> {
        if !is_valid(min_precip) || min_precip < 0.0 {
            return Err(CalibrationError::invalid_option(
                "min_precip",
                format!("must be a finite amount >= 0, got {}", min_precip),
            ));
        }
        Ok(())
    }

    pub fn min_precip(&self) -> f32 {
        self.min_precip
    }

    /// Wet-bulb temperature in Kelvin from temperature (K), pressure (Pa)
    /// and relative humidity (fraction).
    ///
    /// Returns [`MISSING`] for missing inputs or a completely dry atmosphere.
    pub fn wetbulb(temperature: f32, pressure: f32, relative_humidity: f32) -> f32 {
        if !all_valid(&[temperature, pressure, relative_humidity]) {
            return MISSING;
        }
        let tc = temperature as f64 - 273.15;
        let rh = relative_humidity as f64;
        if tc <= -243.04 || rh <= 0.0 {
            return MISSING;
        }

        // Vapour pressure in kPa and the dewpoint it implies.
        let e = rh * 0.611 * (17.63 * tc / (tc + 243.04)).exp();
        let ln_e = e.ln();
        let dewpoint = (116.9 + 243.04 * ln_e) / (16.78 - ln_e);

        let gamma = 0.00066 * pressure as f64 / 1000.0;
        let delta = 4098.0 * e / (dewpoint + 243.04).powi(2);
        if gamma + delta == 0.0 {
            return MISSING;
        }

        let wetbulb = ((gamma * tc + delta * dewpoint) / (gamma + delta) + 273.15) as f32;
        if is_valid(wetbulb) {
            wetbulb
        } else {
            MISSING
        }
    }

    /// Phase value of one member, or [`MISSING`] if any input is missing.
    pub fn classify(&self, precip: f32, wetbulb: f32, snow_sleet: f32, sleet_rain: f32) -> f32 {
        if !all_valid(&[precip, wetbulb, snow_sleet, sleet_rain]) {
            return MISSING;
        }
        let phase = if precip <= self.min_precip {
            PrecipPhase::None
        } else if wetbulb <= snow_sleet {
            PrecipPhase::Snow
        } else if wetbulb <= sleet_rain {
            PrecipPhase::Sleet
        } else {
            PrecipPhase::Rain
        };
        phase.value()
    }

    fn classify_cell(
        &self,
        inputs: [&[f32]; 4],
        parameters: Option<&Parameters>,
        output: &mut [f32],
    ) -> CellOutcome {
        let thresholds = parameters
            .map(|p| (p[0], p[1]))
            .filter(|&(snow_sleet, sleet_rain)| is_valid(snow_sleet) && is_valid(sleet_rain));
        let Some((snow_sleet, sleet_rain)) = thresholds else {
            output.fill(MISSING);
            return CellOutcome::Unresolved;
        };

        let [precip, temperature, humidity, pressure] = inputs;
        for (e, out) in output.iter_mut().enumerate() {
            let wetbulb = Self::wetbulb(temperature[e], pressure[e], humidity[e]);
            *out = self.classify(precip[e], wetbulb, snow_sleet, sleet_rain);
        }
        if all_valid(output) {
            CellOutcome::Calibrated
        } else {
            CellOutcome::MissingRaw
        }
    }

    fn log_report(&self, report: &CalibrationReport) {
        if report.missing_raw > 0 {
            warn!(
                cells = report.missing_raw,
                total = report.total_cells,
                "Phase inputs had missing members"
            );
        }
        if report.unresolved > 0 {
            warn!(
                cells = report.unresolved,
                total = report.total_cells,
                "No usable phase thresholds for gridpoint"
            );
        }
        info!(cells = report.total_cells, "Phase pass complete");
    }
}

impl DatasetCalibration for PhaseCalibrator {
    fn name(&self) -> &'static str {
        "phase"
    }

    fn variable(&self) -> Variable {
        Variable::Phase
    }

    /// Overwrite (or create) the phase field. Fails before writing anything
    /// if an input field is absent or some lead time has no thresholds.
    fn calibrate(&self, dataset: &mut Dataset) -> Result<CalibrationReport> {
        let input = |variable| {
            dataset
                .field(variable)
                .ok_or(CalibrationError::MissingVariable(variable))
        };
        let precip = input(Variable::Precip)?;
        let temperature = input(Variable::T)?;
        let humidity = input(Variable::Rh)?;
        let pressure = input(Variable::P)?;

        let mut global = Vec::with_capacity(dataset.n_time());
        for t in 0..dataset.n_time() {
            if !self.parameters.covers_time(t) {
                return Err(CalibrationError::MissingParameters { time: t });
            }
            global.push(if self.parameters.is_location_dependent() {
                None
            } else {
                Some(
                    self.parameters
                        .parameters(t)
                        .ok_or(CalibrationError::MissingParameters { time: t })?,
                )
            });
        }

        let geometry = dataset.geometry();
        let n_ens = dataset.n_ens();
        let mut phase = dataset.empty_field();
        let mut report = CalibrationReport::default();

        if n_ens > 0 {
            for (t, fixed) in global.iter().enumerate() {
                let slices = [
                    precip.time_slice(t),
                    temperature.time_slice(t),
                    humidity.time_slice(t),
                    pressure.time_slice(t),
                ];
                let pass = phase
                    .time_slice_mut(t)
                    .par_chunks_mut(n_ens)
                    .enumerate()
                    .map(|(cell, out)| {
                        let members = cell * n_ens..(cell + 1) * n_ens;
                        let inputs = slices.map(|slice| &slice[members.clone()]);
                        let parameters = match fixed {
                            Some(parameters) => Some(*parameters),
                            None => {
                                let (i, j) = geometry.grid_index(cell);
                                self.parameters.parameters_at(t, &geometry.location(i, j))
                            }
                        };
                        self.classify_cell(inputs, parameters, out)
                    })
                    .fold(CalibrationReport::default, CalibrationReport::record)
                    .reduce(CalibrationReport::default, |a, b| a + b);
                report = report + pass;
            }
        }

        dataset.set_field(Variable::Phase, phase)?;
        self.log_report(&report);
        Ok(report)
    }
}
