//! Error types for calibration and downscaling.
//!
//! Only configuration problems are errors. Numerical trouble inside a pass
//! shows up as missing values and in the pass report instead.

use ensemble_field::{FieldError, Variable};
use thiserror::Error;

/// Errors that can occur while configuring or starting a pass.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// A parameter set has the wrong number of coefficients for the method.
    #[error("{method} expects {expected} parameters, found {found}")]
    InvalidParameterCount {
        method: &'static str,
        expected: String,
        found: usize,
    },

    /// Parameter sets in one source disagree on their size.
    #[error("inconsistent parameter count: expected {expected}, found {found} (time {time})")]
    InconsistentParameterCount {
        expected: usize,
        found: usize,
        time: usize,
    },

    /// No parameter set applies to a lead time of the field.
    #[error("no parameters available for lead time {time}")]
    MissingParameters { time: usize },

    /// The parameter source holds no parameter sets at all.
    #[error("parameter source is empty")]
    EmptyParameterSource,

    /// A user-supplied option is out of range.
    #[error("invalid value for '{option}': {message}")]
    InvalidOption {
        option: &'static str,
        message: String,
    },

    /// The dataset has no field for the variable being processed.
    #[error("dataset has no field for variable '{0}'")]
    MissingVariable(Variable),

    /// Field and geometry dimensions disagree.
    #[error("field grid {field:?} does not match geometry {geometry:?}")]
    GeometryMismatch {
        field: (usize, usize),
        geometry: (usize, usize),
    },

    /// Input and output datasets differ in members or lead times.
    #[error("output dataset has {output_ens} members and {output_time} times, input has {input_ens} and {input_time}")]
    EnsembleMismatch {
        input_ens: usize,
        input_time: usize,
        output_ens: usize,
        output_time: usize,
    },

    /// The source grid of a downscaling has no usable coordinates.
    #[error("source grid has no points with valid coordinates")]
    EmptySourceGrid,

    /// Malformed line in a parameter file.
    #[error("parameter file line {line}: {message}")]
    ParameterParse { line: usize, message: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalibrationError {
    /// Create an InvalidOption error.
    pub fn invalid_option(option: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            message: message.into(),
        }
    }

    /// Create an InvalidParameterCount error.
    pub fn invalid_parameter_count(
        method: &'static str,
        expected: impl Into<String>,
        found: usize,
    ) -> Self {
        Self::InvalidParameterCount {
            method,
            expected: expected.into(),
            found,
        }
    }

    /// Create a ParameterParse error.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParameterParse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for calibration operations.
pub type Result<T> = std::result::Result<T, CalibrationError>;
