//! Shared test utilities for the ensemble calibration workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic grids and ensembles with predictable values
//! - Parameter sets and parameter files for each calibration method
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{create_temperature_dataset, fixtures};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
