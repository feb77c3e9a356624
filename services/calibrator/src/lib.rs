//! Calibration pipeline runner.
//!
//! Loads a YAML pipeline description, reads a JSON dataset, runs the
//! configured calibrations in order, optionally downscales onto a target
//! grid and writes the result back as JSON.

pub mod config_loader;
pub mod pipeline;

pub use config_loader::load_pipeline_config;
pub use pipeline::{read_dataset, read_geometry, write_dataset, Pipeline, PipelineOutcome};
