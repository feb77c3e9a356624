//! The calibration pass: strategy trait, dispatcher and pass report.
//!
//! A [`CalibrationStrategy`] knows how to turn one ensemble (all members at
//! one gridpoint and lead time) into calibrated values. [`Calibrator`] owns
//! the loop over lead times and gridpoints, resolves parameters, enforces the
//! missing-value policy and aggregates problems into a single report rather
//! than logging once per gridpoint.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Add;
use std::sync::Arc;

use ensemble_field::{all_valid, is_valid, Dataset, GridGeometry, GriddedField, Variable};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CalibrationError, Result};
use crate::parameters::{ParameterSource, Parameters};

/// How a strategy treats members of an ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberPolicy {
    /// The ensemble is calibrated as a whole. Any missing raw member leaves
    /// the gridpoint uncalibrated, and any missing output reverts every
    /// member to its raw value.
    WholeEnsemble,
    /// Members are calibrated independently; a missing raw member yields a
    /// missing output for that member only. A valid member whose output is
    /// missing keeps its raw value.
    PerMember,
}

/// A calibration method applied to one ensemble at a time.
pub trait CalibrationStrategy: Send + Sync + fmt::Debug {
    /// Short method name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Variable this strategy calibrates.
    fn variable(&self) -> Variable;

    fn member_policy(&self) -> MemberPolicy {
        MemberPolicy::WholeEnsemble
    }

    /// Reject parameter sets this method cannot use.
    fn validate_parameters(&self, parameters: &Parameters) -> Result<()>;

    /// Rewrite a validated parameter set into the form `calibrate_cell`
    /// reads. Runs once per set; `None` keeps the set as stored.
    fn prepare(&self, _parameters: &Parameters) -> Option<Parameters> {
        None
    }

    /// Write calibrated values for `raw` into `output` (same length).
    /// `parameters` has been through [`CalibrationStrategy::prepare`].
    fn calibrate_cell(&self, raw: &[f32], parameters: &Parameters, output: &mut [f32]);
}

/// A configured pass that rewrites one variable of a dataset in place.
pub trait DatasetCalibration: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Variable written by the pass.
    fn variable(&self) -> Variable;

    fn calibrate(&self, dataset: &mut Dataset) -> Result<CalibrationReport>;
}

/// Counts gathered during one calibration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Gridpoint × lead time cells visited.
    pub total_cells: usize,
    /// Cells with at least one missing raw member.
    pub missing_raw: usize,
    /// Cells where missing calibrated values were replaced by raw values.
    pub reverted: usize,
    /// Cells left untouched because no parameters applied at their location.
    pub unresolved: usize,
}

impl CalibrationReport {
    pub(crate) fn record(mut self, outcome: CellOutcome) -> Self {
        self.total_cells += 1;
        match outcome {
            CellOutcome::Calibrated => {}
            CellOutcome::MissingRaw => self.missing_raw += 1,
            CellOutcome::Reverted => self.reverted += 1,
            CellOutcome::Unresolved => self.unresolved += 1,
        }
        self
    }

    /// True if every cell was calibrated without incident.
    pub fn is_clean(&self) -> bool {
        self.missing_raw == 0 && self.reverted == 0 && self.unresolved == 0
    }
}

impl Add for CalibrationReport {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            total_cells: self.total_cells + other.total_cells,
            missing_raw: self.missing_raw + other.missing_raw,
            reverted: self.reverted + other.reverted,
            unresolved: self.unresolved + other.unresolved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellOutcome {
    Calibrated,
    MissingRaw,
    Reverted,
    Unresolved,
}

/// Runs a calibration strategy over every gridpoint and lead time.
pub struct Calibrator {
    strategy: Box<dyn CalibrationStrategy>,
    parameters: Arc<dyn ParameterSource>,
    /// Prepared sets keyed by the address of the stored set. The source is
    /// never mutated once shared, so addresses stay put.
    prepared: HashMap<usize, Parameters>,
}

fn address(parameters: &Parameters) -> usize {
    parameters as *const Parameters as usize
}

impl fmt::Debug for Calibrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calibrator")
            .field("strategy", &self.strategy)
            .field("num_parameters", &self.parameters.num_parameters())
            .field("location_dependent", &self.parameters.is_location_dependent())
            .finish()
    }
}

impl Calibrator {
    /// Pair a strategy with its parameters, validating every parameter set.
    pub fn new(
        strategy: Box<dyn CalibrationStrategy>,
        parameters: Arc<dyn ParameterSource>,
    ) -> Result<Self> {
        let mut count = 0;
        let mut prepared = HashMap::new();
        for set in parameters.parameter_sets() {
            strategy.validate_parameters(set)?;
            if let Some(ready) = strategy.prepare(set) {
                prepared.insert(address(set), ready);
            }
            count += 1;
        }
        if count == 0 {
            return Err(CalibrationError::EmptyParameterSource);
        }

        debug!(
            calibrator = strategy.name(),
            variable = %strategy.variable(),
            parameter_sets = count,
            location_dependent = parameters.is_location_dependent(),
            "Created calibrator"
        );
        Ok(Self {
            strategy,
            parameters,
            prepared,
        })
    }

    pub fn strategy(&self) -> &dyn CalibrationStrategy {
        self.strategy.as_ref()
    }

    pub fn variable(&self) -> Variable {
        self.strategy.variable()
    }

    /// Calibrate the strategy's variable in place.
    ///
    /// Fails before touching the dataset if the variable is absent or some
    /// lead time has no parameters.
    pub fn calibrate(&self, dataset: &mut Dataset) -> Result<CalibrationReport> {
        let variable = self.variable();
        let raw = dataset
            .field(variable)
            .ok_or(CalibrationError::MissingVariable(variable))?;
        let (calibrated, report) = self.calibrate_field(raw, dataset.geometry())?;
        dataset.set_field(variable, calibrated)?;
        Ok(report)
    }

    /// Calibrate a field, returning a new field of the same shape.
    pub fn calibrate_field(
        &self,
        raw: &GriddedField,
        geometry: &GridGeometry,
    ) -> Result<(GriddedField, CalibrationReport)> {
        if (raw.n_lat(), raw.n_lon()) != (geometry.n_lat(), geometry.n_lon()) {
            return Err(CalibrationError::GeometryMismatch {
                field: (raw.n_lat(), raw.n_lon()),
                geometry: (geometry.n_lat(), geometry.n_lon()),
            });
        }

        // Resolve all lead times up front so a bad configuration never
        // surfaces halfway through the parallel pass.
        let mut global = Vec::with_capacity(raw.n_time());
        for t in 0..raw.n_time() {
            if !self.parameters.covers_time(t) {
                return Err(CalibrationError::MissingParameters { time: t });
            }
            global.push(if self.parameters.is_location_dependent() {
                None
            } else {
                let parameters = self
                    .parameters
                    .parameters(t)
                    .ok_or(CalibrationError::MissingParameters { time: t })?;
                Some(self.prepared_set(parameters))
            });
        }

        let mut output = raw.clone();
        let n_ens = raw.n_ens();
        let mut report = CalibrationReport::default();
        if n_ens == 0 {
            return Ok((output, report));
        }

        for (t, fixed) in global.iter().enumerate() {
            let fixed = fixed.as_deref();
            let pass = output
                .time_slice_mut(t)
                .par_chunks_mut(n_ens)
                .zip(raw.time_slice(t).par_chunks(n_ens))
                .enumerate()
                .map(|(cell, (out, ens))| match fixed {
                    Some(parameters) => self.process_cell(ens, Some(parameters), out),
                    None => {
                        let (i, j) = geometry.grid_index(cell);
                        let parameters = self
                            .parameters
                            .parameters_at(t, &geometry.location(i, j))
                            .map(|p| self.prepared_set(p));
                        self.process_cell(ens, parameters.as_deref(), out)
                    }
                })
                .fold(CalibrationReport::default, CalibrationReport::record)
                .reduce(CalibrationReport::default, |a, b| a + b);
            report = report + pass;
        }

        self.log_report(&report);
        Ok((output, report))
    }

    /// The prepared form of a set served by the parameter source.
    fn prepared_set<'a>(&'a self, parameters: &'a Parameters) -> Cow<'a, Parameters> {
        if let Some(ready) = self.prepared.get(&address(parameters)) {
            return Cow::Borrowed(ready);
        }
        match self.strategy.prepare(parameters) {
            Some(ready) => Cow::Owned(ready),
            None => Cow::Borrowed(parameters),
        }
    }

    fn process_cell(
        &self,
        raw: &[f32],
        parameters: Option<&Parameters>,
        output: &mut [f32],
    ) -> CellOutcome {
        let Some(parameters) = parameters else {
            output.copy_from_slice(raw);
            return CellOutcome::Unresolved;
        };
        let complete = all_valid(raw);

        match self.strategy.member_policy() {
            MemberPolicy::WholeEnsemble => {
                if !complete {
                    output.copy_from_slice(raw);
                    return CellOutcome::MissingRaw;
                }
                self.strategy.calibrate_cell(raw, parameters, output);
                if all_valid(output) {
                    CellOutcome::Calibrated
                } else {
                    output.copy_from_slice(raw);
                    CellOutcome::Reverted
                }
            }
            MemberPolicy::PerMember => {
                self.strategy.calibrate_cell(raw, parameters, output);
                let mut reverted = false;
                for (out, &value) in output.iter_mut().zip(raw) {
                    if is_valid(value) && !is_valid(*out) {
                        *out = value;
                        reverted = true;
                    }
                }
                if reverted {
                    CellOutcome::Reverted
                } else if complete {
                    CellOutcome::Calibrated
                } else {
                    CellOutcome::MissingRaw
                }
            }
        }
    }

    fn log_report(&self, report: &CalibrationReport) {
        let calibrator = self.strategy.name();
        let variable = self.strategy.variable();

        if report.missing_raw > 0 {
            warn!(
                calibrator,
                variable = %variable,
                cells = report.missing_raw,
                total = report.total_cells,
                "Raw ensemble had missing members"
            );
        }
        if report.reverted > 0 {
            warn!(
                calibrator,
                variable = %variable,
                cells = report.reverted,
                total = report.total_cells,
                "Calibration produced missing values; reverted to raw ensemble"
            );
        }
        if report.unresolved > 0 {
            warn!(
                calibrator,
                variable = %variable,
                cells = report.unresolved,
                total = report.total_cells,
                "No parameters for gridpoint; left uncalibrated"
            );
        }
        info!(
            calibrator,
            variable = %variable,
            cells = report.total_cells,
            "Calibration pass complete"
        );
    }
}

impl DatasetCalibration for Calibrator {
    fn name(&self) -> &'static str {
        self.strategy.name()
    }

    fn variable(&self) -> Variable {
        self.strategy.variable()
    }

    fn calibrate(&self, dataset: &mut Dataset) -> Result<CalibrationReport> {
        Calibrator::calibrate(self, dataset)
    }
}
