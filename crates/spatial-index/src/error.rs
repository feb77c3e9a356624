//! Error types for index construction.

use thiserror::Error;

/// Errors that can occur while building a spatial index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpatialIndexError {
    /// Coordinate arrays differ in length.
    #[error("latitude array has {lats} values but longitude array has {lons}")]
    LengthMismatch { lats: usize, lons: usize },

    /// The arrays cannot be split into rows of the given width.
    #[error("{len} points cannot be arranged in rows of {n_lon}")]
    InvalidShape { len: usize, n_lon: usize },
}

/// Result type for spatial index operations.
pub type Result<T> = std::result::Result<T, SpatialIndexError>;
