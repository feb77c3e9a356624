//! Configuration loader for calibration pipelines.
//!
//! Reads a YAML pipeline description, for example:
//!
//! ```yaml
//! num_threads: 4
//! steps:
//!   - calibrator: { type: zaga, variable: precip }
//!     parameters: { path: ${PARAM_DIR:-params}/zaga.txt }
//!   - calibrator: { type: qq, variable: t, extrapolation: mean_slope }
//!     parameters: { path: params/qq_t.txt, layout: spatial }
//!   - calibrator: { type: phase, min_precip: 0.2 }
//!     parameters: { path: params/phase.txt }
//! downscaler: { type: gradient, variable: t, search_radius: 2 }
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are substituted before parsing.

use anyhow::{Context, Result};
use calibration::PipelineConfig;
use std::fs;
use std::path::Path;

// ============================================================================
// Loading Functions
// ============================================================================

/// Load, expand and validate a pipeline configuration file.
///
/// Environment overrides (`CALIBRATION_THREADS`) are applied after parsing.
pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read pipeline config from {:?}", path.as_ref()))?;

    parse_pipeline_config(&content)
        .with_context(|| format!("Invalid pipeline config {:?}", path.as_ref()))
}

/// Parse and validate pipeline YAML held in memory.
pub fn parse_pipeline_config(content: &str) -> Result<PipelineConfig> {
    let expanded = expand_env_vars(content)?;

    let mut config: PipelineConfig =
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse pipeline config YAML")?;
    config.apply_env_overrides();
    config.validate()?;

    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Replace `${VAR}` and `${VAR:-default}` with values from the environment.
///
/// An empty variable counts as unset when a default is given.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut expanded = String::with_capacity(content.len());
    let mut rest = content;

    while let Some((before, after)) = rest.split_once("${") {
        let (expr, tail) = after
            .split_once('}')
            .context("Unclosed variable substitution in pipeline config")?;
        let value = match expr.split_once(":-") {
            Some((name, default)) => std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string()),
            None => std::env::var(expr)
                .with_context(|| format!("Environment variable {} is not set", expr))?,
        };
        expanded.push_str(before);
        expanded.push_str(&value);
        rest = tail;
    }
    expanded.push_str(rest);

    Ok(expanded)
}
