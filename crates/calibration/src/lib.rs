//! Ensemble calibration and downscaling.
//!
//! Calibration adjusts raw ensemble forecasts using statistical relations
//! fitted against observations. Three methods are provided:
//!
//! - [`Zaga`]: zero-adjusted gamma distribution for precipitation
//! - [`Qq`]: quantile-quantile mapping with configurable extrapolation
//! - [`Regression`]: per-member polynomial in the raw value
//!
//! All of them run through a [`Calibrator`], which walks every gridpoint and
//! lead time in parallel, applies the missing-value policy of the method and
//! returns a [`CalibrationReport`].
//!
//! [`PhaseCalibrator`] is a pass of its own: it reads precipitation,
//! temperature, humidity and pressure and writes the precipitation phase of
//! every member from wet-bulb thresholds. Both kinds of pass implement
//! [`DatasetCalibration`], which is what configured pipelines hold.
//!
//! Downscaling moves a field onto another grid. [`NearestNeighbour`] copies
//! the nearest source value; [`Gradient`] additionally corrects it for the
//! elevation difference using a local value/elevation regression.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use calibration::{Calibrator, ParameterFile, Parameters, Regression};
//! use ensemble_field::{Dataset, GridGeometry, GriddedField, Variable};
//!
//! let geometry = GridGeometry::regular(2, 2, 60.0, 10.0, 0.1, 0.1);
//! let mut dataset = Dataset::new(geometry, 1, 1);
//! dataset
//!     .set_field(Variable::T, GriddedField::filled(2, 2, 1, 1, 280.0))
//!     .unwrap();
//!
//! let calibrator = Calibrator::new(
//!     Box::new(Regression::new(Variable::T)),
//!     Arc::new(ParameterFile::constant(Parameters::new(vec![1.0, 1.0]))),
//! )
//! .unwrap();
//! let report = calibrator.calibrate(&mut dataset).unwrap();
//!
//! assert_eq!(report.total_cells, 4);
//! assert_eq!(dataset.field(Variable::T).unwrap().get(0, 0, 0, 0), 281.0);
//! ```

pub mod calibrator;
pub mod config;
pub mod downscaler;
pub mod error;
pub mod parameters;
pub mod phase;
pub mod qq;
pub mod regression;
pub mod shuffle;
pub mod zaga;

pub use calibrator::{
    CalibrationReport, CalibrationStrategy, Calibrator, DatasetCalibration, MemberPolicy,
};
pub use config::{
    build_calibration, build_downscaler, build_strategy, CalibrationStep, CalibratorConfig, DownscalerConfig,
    ParameterSourceConfig, PipelineConfig,
};
pub use downscaler::{Downscaler, Gradient, NearestNeighbour};
pub use error::{CalibrationError, Result};
pub use parameters::{ParameterFile, ParameterLayout, ParameterSource, Parameters};
pub use phase::{PhaseCalibrator, PrecipPhase};
pub use qq::{ExtrapolationPolicy, Qq};
pub use regression::Regression;
pub use shuffle::shuffle;
pub use zaga::Zaga;
