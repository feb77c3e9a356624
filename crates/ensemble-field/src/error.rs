//! Error types for gridded fields and datasets.

use thiserror::Error;

/// Result type alias using FieldError.
pub type FieldResult<T> = Result<T, FieldError>;

/// Errors raised when constructing or combining fields.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("data length {found} does not match dimensions {n_lat}x{n_lon}x{n_ens}x{n_time} ({expected} values)")]
    LengthMismatch {
        n_lat: usize,
        n_lon: usize,
        n_ens: usize,
        n_time: usize,
        expected: usize,
        found: usize,
    },

    #[error("geometry arrays must have {expected} values, '{array}' has {found}")]
    GeometryMismatch {
        array: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("field shape {found:?} does not match dataset shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize, usize),
        found: (usize, usize, usize, usize),
    },

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("invalid dataset JSON: {0}")]
    Json(#[from] serde_json::Error),
}
