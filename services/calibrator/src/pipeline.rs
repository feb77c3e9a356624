//! Runs configured calibration steps and downscaling over a dataset.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use calibration::{
    build_downscaler, CalibrationReport, DatasetCalibration, Downscaler, PipelineConfig,
};
use ensemble_field::{Dataset, GridGeometry, Variable};
use tracing::{info, warn};

/// A ready-to-run pipeline with all parameters loaded.
#[derive(Debug)]
pub struct Pipeline {
    calibrators: Vec<Box<dyn DatasetCalibration>>,
    downscaler: Option<Box<dyn Downscaler>>,
}

/// Result of running a pipeline.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub dataset: Dataset,
    pub reports: Vec<(Variable, CalibrationReport)>,
}

impl Pipeline {
    /// Build every step. Relative parameter paths resolve against `base_dir`.
    pub fn from_config(config: &PipelineConfig, base_dir: Option<&Path>) -> Result<Self> {
        let mut calibrators = Vec::with_capacity(config.steps.len());
        for (index, step) in config.steps.iter().enumerate() {
            let calibrator = step.build(base_dir).with_context(|| {
                format!(
                    "Failed to set up step {} ({:?})",
                    index + 1,
                    step.parameters.path
                )
            })?;
            calibrators.push(calibrator);
        }

        let downscaler = config.downscaler.as_ref().map(build_downscaler).transpose()?;

        info!(
            steps = calibrators.len(),
            downscaler = downscaler.as_ref().map(|d| d.name()).unwrap_or("none"),
            "Pipeline ready"
        );
        Ok(Self {
            calibrators,
            downscaler,
        })
    }

    pub fn num_steps(&self) -> usize {
        self.calibrators.len()
    }

    pub fn has_downscaler(&self) -> bool {
        self.downscaler.is_some()
    }

    /// Check that `target` fits the configured downscaling.
    pub fn check_target(&self, target: Option<&GridGeometry>) -> Result<()> {
        match (&self.downscaler, target) {
            (Some(_), None) => bail!("A downscaler is configured but no target grid was given"),
            (None, Some(_)) => bail!("A target grid was given but no downscaler is configured"),
            _ => Ok(()),
        }
    }

    /// Calibrate `dataset` in place, then downscale onto `target` if a
    /// downscaler is configured. A target mismatch fails before any pass runs.
    pub fn run(&self, mut dataset: Dataset, target: Option<GridGeometry>) -> Result<PipelineOutcome> {
        self.check_target(target.as_ref())?;
        let mut reports = Vec::with_capacity(self.calibrators.len());

        for calibrator in &self.calibrators {
            let started = Instant::now();
            let variable = calibrator.variable();
            let report = calibrator
                .calibrate(&mut dataset)
                .with_context(|| format!("Calibration of '{}' failed", variable))?;
            info!(
                calibrator = calibrator.name(),
                variable = %variable,
                cells = report.total_cells,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Calibration step finished"
            );
            reports.push((variable, report));
        }

        let dataset = match (&self.downscaler, target) {
            (Some(downscaler), Some(target)) => {
                let started = Instant::now();
                let mut output = Dataset::new(target, dataset.n_ens(), dataset.n_time());
                downscaler
                    .downscale(&dataset, &mut output)
                    .with_context(|| format!("Downscaling of '{}' failed", downscaler.variable()))?;

                let dropped: Vec<String> = dataset
                    .variables()
                    .filter(|&v| v != downscaler.variable())
                    .map(|v| v.to_string())
                    .collect();
                if !dropped.is_empty() {
                    warn!(variables = ?dropped, "Variables not downscaled are left out of the output");
                }
                info!(
                    downscaler = downscaler.name(),
                    target_points = output.geometry().len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Downscaling finished"
                );
                output
            }
            _ => dataset,
        };

        Ok(PipelineOutcome { dataset, reports })
    }
}

// ============================================================================
// Dataset I/O
// ============================================================================

/// Read a dataset from a JSON file.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read dataset from {:?}", path.as_ref()))?;
    Dataset::from_json(&content)
        .with_context(|| format!("Failed to parse dataset {:?}", path.as_ref()))
}

/// Read a target grid geometry from a JSON file.
pub fn read_geometry<P: AsRef<Path>>(path: P) -> Result<GridGeometry> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read target grid from {:?}", path.as_ref()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse target grid {:?}", path.as_ref()))
}

/// Write a dataset as JSON. Missing values are written as `null`.
pub fn write_dataset<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    let json = dataset.to_json()?;
    fs::write(path.as_ref(), json)
        .with_context(|| format!("Failed to write dataset to {:?}", path.as_ref()))?;
    Ok(())
}
