//! Common types shared by the calibration and downscaling crates.
//!
//! - [`GriddedField`]: lat × lon × member × time array of `f32`
//! - [`GridGeometry`] / [`Location`]: latitude, longitude and elevation per gridpoint
//! - [`Dataset`]: geometry plus the fields of each [`Variable`]
//!
//! Missing values are `NaN` (see [`util::MISSING`] and [`util::is_valid`]).

pub mod dataset;
pub mod error;
pub mod field;
pub mod geometry;
pub mod serde_nan;
pub mod util;
pub mod variable;

pub use dataset::Dataset;
pub use error::{FieldError, FieldResult};
pub use field::GriddedField;
pub use geometry::{GridGeometry, Location};
pub use util::{all_valid, interpolate, inv_logit, is_valid, same_values, MISSING};
pub use variable::Variable;
