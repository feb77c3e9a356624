//! Serializable configuration for calibrators, downscalers and pipelines.
//!
//! These types only describe a run. [`build_calibration`],
//! [`build_strategy`] and [`build_downscaler`] turn them into working
//! objects, validating every option on the way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ensemble_field::Variable;
use serde::{Deserialize, Serialize};

use crate::calibrator::{CalibrationStrategy, Calibrator, DatasetCalibration};
use crate::downscaler::{Downscaler, Gradient, NearestNeighbour};
use crate::error::{CalibrationError, Result};
use crate::parameters::{ParameterFile, ParameterLayout, ParameterSource};
use crate::phase::PhaseCalibrator;
use crate::qq::{ExtrapolationPolicy, Qq};
use crate::regression::Regression;
use crate::zaga::Zaga;

fn default_precip() -> Variable {
    Variable::Precip
}

fn default_temperature() -> Variable {
    Variable::T
}

fn default_fraction_threshold() -> f32 {
    Zaga::DEFAULT_FRACTION_THRESHOLD
}

fn default_max_ens_mean() -> f32 {
    Zaga::DEFAULT_MAX_ENS_MEAN
}

fn default_min_precip() -> f32 {
    PhaseCalibrator::DEFAULT_MIN_PRECIP
}

fn default_search_radius() -> usize {
    Gradient::DEFAULT_SEARCH_RADIUS
}

fn default_min_gradient() -> f32 {
    Gradient::DEFAULT_MIN_GRADIENT
}

fn default_max_gradient() -> f32 {
    Gradient::DEFAULT_MAX_GRADIENT
}

/// Which calibration method to run, with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalibratorConfig {
    Zaga {
        #[serde(default = "default_precip")]
        variable: Variable,
        #[serde(default = "default_fraction_threshold")]
        fraction_threshold: f32,
        #[serde(default = "default_max_ens_mean")]
        max_ens_mean: f32,
    },
    Qq {
        variable: Variable,
        #[serde(default)]
        extrapolation: ExtrapolationPolicy,
    },
    Regression {
        variable: Variable,
    },
    /// Precipitation phase from wet-bulb thresholds. Always writes
    /// [`Variable::Phase`].
    Phase {
        #[serde(default = "default_min_precip")]
        min_precip: f32,
    },
}

impl CalibratorConfig {
    pub fn variable(&self) -> Variable {
        match self {
            Self::Zaga { variable, .. } | Self::Qq { variable, .. } | Self::Regression { variable } => {
                *variable
            }
            Self::Phase { .. } => Variable::Phase,
        }
    }
}

/// Which downscaler to run, with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownscalerConfig {
    NearestNeighbour {
        variable: Variable,
    },
    Gradient {
        #[serde(default = "default_temperature")]
        variable: Variable,
        #[serde(default = "default_search_radius")]
        search_radius: usize,
        #[serde(default = "default_min_gradient")]
        min_gradient: f32,
        #[serde(default = "default_max_gradient")]
        max_gradient: f32,
        #[serde(default)]
        constant_gradient: Option<f32>,
    },
}

impl DownscalerConfig {
    pub fn variable(&self) -> Variable {
        match self {
            Self::NearestNeighbour { variable } | Self::Gradient { variable, .. } => *variable,
        }
    }
}

/// Where to read calibration parameters from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub layout: ParameterLayout,
}

impl ParameterSourceConfig {
    /// Load the parameter file, resolving a relative path against `base_dir`.
    pub fn load(&self, base_dir: Option<&Path>) -> Result<ParameterFile> {
        let path = match base_dir {
            Some(dir) if self.path.is_relative() => dir.join(&self.path),
            _ => self.path.clone(),
        };
        ParameterFile::from_path(path, self.layout)
    }
}

/// One calibration in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStep {
    pub calibrator: CalibratorConfig,
    pub parameters: ParameterSourceConfig,
}

impl CalibrationStep {
    /// Load parameters and pair them with the configured method.
    pub fn build(&self, base_dir: Option<&Path>) -> Result<Box<dyn DatasetCalibration>> {
        let parameters = self.parameters.load(base_dir)?;
        build_calibration(&self.calibrator, Arc::new(parameters))
    }
}

/// A full post-processing run: calibrations in order, then an optional
/// downscaling onto a target grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub steps: Vec<CalibrationStep>,

    #[serde(default)]
    pub downscaler: Option<DownscalerConfig>,

    /// Worker threads for the parallel passes. `None` uses every core.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

impl PipelineConfig {
    /// Apply overrides from environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CALIBRATION_THREADS") {
            if let Ok(threads) = val.parse() {
                self.num_threads = Some(threads);
            }
        }
    }

    /// Validate the configuration without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == Some(0) {
            return Err(CalibrationError::invalid_option(
                "num_threads",
                "must be > 0",
            ));
        }
        for step in &self.steps {
            match step.calibrator {
                CalibratorConfig::Phase { min_precip } => {
                    PhaseCalibrator::validate_min_precip(min_precip)?
                }
                ref calibrator => {
                    build_strategy(calibrator)?;
                }
            }
        }
        if let Some(downscaler) = &self.downscaler {
            build_downscaler(downscaler)?;
        }
        Ok(())
    }
}

/// Create a dataset pass from its configuration and parameters.
pub fn build_calibration(
    config: &CalibratorConfig,
    parameters: Arc<dyn ParameterSource>,
) -> Result<Box<dyn DatasetCalibration>> {
    match config {
        CalibratorConfig::Phase { min_precip } => Ok(Box::new(
            PhaseCalibrator::new(parameters)?.with_min_precip(*min_precip)?,
        )),
        _ => Ok(Box::new(Calibrator::new(build_strategy(config)?, parameters)?)),
    }
}

/// Create a per-ensemble calibration strategy from its configuration.
///
/// Phase reads several variables at once and has no such strategy.
pub fn build_strategy(config: &CalibratorConfig) -> Result<Box<dyn CalibrationStrategy>> {
    let strategy: Box<dyn CalibrationStrategy> = match config {
        CalibratorConfig::Zaga {
            variable,
            fraction_threshold,
            max_ens_mean,
        } => Box::new(
            Zaga::new(*variable)
                .with_fraction_threshold(*fraction_threshold)?
                .with_max_ens_mean(*max_ens_mean)?,
        ),
        CalibratorConfig::Qq {
            variable,
            extrapolation,
        } => Box::new(Qq::new(*variable).with_policy(*extrapolation)),
        CalibratorConfig::Regression { variable } => Box::new(Regression::new(*variable)),
        CalibratorConfig::Phase { .. } => {
            return Err(CalibrationError::invalid_option(
                "type",
                "phase is a whole-dataset pass, not a per-ensemble strategy",
            ))
        }
    };
    Ok(strategy)
}

/// Create a downscaler from its configuration.
pub fn build_downscaler(config: &DownscalerConfig) -> Result<Box<dyn Downscaler>> {
    let downscaler: Box<dyn Downscaler> = match config {
        DownscalerConfig::NearestNeighbour { variable } => Box::new(NearestNeighbour::new(*variable)),
        DownscalerConfig::Gradient {
            variable,
            search_radius,
            min_gradient,
            max_gradient,
            constant_gradient,
        } => {
            let mut gradient = Gradient::new(*variable)
                .with_search_radius(*search_radius)?
                .with_gradient_bounds(*min_gradient, *max_gradient)?;
            if let Some(constant) = constant_gradient {
                gradient = gradient.with_constant_gradient(*constant)?;
            }
            Box::new(gradient)
        }
    };
    Ok(downscaler)
}
