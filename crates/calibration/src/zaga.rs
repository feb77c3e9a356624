//! Zero-adjusted gamma calibration for precipitation.
//!
//! The calibrated distribution is a mixture of a point mass at zero, with
//! probability `P0`, and a gamma distribution for positive amounts. Both
//! depend on the raw ensemble mean and the fraction of members at or below
//! a dry threshold. Eight coefficients per parameter set:
//!
//! | index | name  | role                                         |
//! |-------|-------|----------------------------------------------|
//! | 0, 1  | mua, mub | `mu = exp(mua + mub * mean^(1/3))`        |
//! | 2, 3  | sa, sb   | `sigma = exp(sa + sb * mean)`             |
//! | 4..8  | a, b, c, d | `P0 = invlogit(a + b*mean + c*frac + d*mean^(1/3))` |
//!
//! Member `e` of `n` receives the quantile at `(e + 0.5) / n`, and the
//! values are then reordered to follow the raw member ranks.

use ensemble_field::{inv_logit, is_valid, Variable, MISSING};
use statrs::distribution::{ContinuousCDF, Gamma};

use crate::calibrator::CalibrationStrategy;
use crate::error::{CalibrationError, Result};
use crate::parameters::Parameters;
use crate::shuffle::shuffle;

/// Zero-adjusted gamma calibrator.
#[derive(Debug, Clone)]
pub struct Zaga {
    variable: Variable,
    fraction_threshold: f32,
    max_ens_mean: f32,
}

impl Zaga {
    pub const NUM_PARAMETERS: usize = 8;
    pub const DEFAULT_FRACTION_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_MAX_ENS_MEAN: f32 = 100.0;

    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            fraction_threshold: Self::DEFAULT_FRACTION_THRESHOLD,
            max_ens_mean: Self::DEFAULT_MAX_ENS_MEAN,
        }
    }

    /// Members at or below this amount count as dry. Must lie in `[0, 1]`.
    pub fn with_fraction_threshold(mut self, threshold: f32) -> Result<Self> {
        if !is_valid(threshold) || !(0.0..=1.0).contains(&threshold) {
            return Err(CalibrationError::invalid_option(
                "fraction_threshold",
                format!("must be within [0, 1], got {}", threshold),
            ));
        }
        self.fraction_threshold = threshold;
        Ok(self)
    }

    /// Ensemble means above this are clipped before use.
    pub fn with_max_ens_mean(mut self, max: f32) -> Result<Self> {
        if !is_valid(max) || max < 0.0 {
            return Err(CalibrationError::invalid_option(
                "max_ens_mean",
                format!("must be a non-negative number, got {}", max),
            ));
        }
        self.max_ens_mean = max;
        Ok(self)
    }

    pub fn fraction_threshold(&self) -> f32 {
        self.fraction_threshold
    }

    pub fn max_ens_mean(&self) -> f32 {
        self.max_ens_mean
    }

    /// Probability of no precipitation.
    pub fn p0(ens_mean: f32, ens_frac: f32, parameters: &Parameters) -> f32 {
        if !is_valid(ens_mean) || !is_valid(ens_frac) || parameters.len() != Self::NUM_PARAMETERS {
            return MISSING;
        }
        let (a, b, c, d) = (parameters[4], parameters[5], parameters[6], parameters[7]);
        let mean = ens_mean as f64;
        let logit = a as f64 + b as f64 * mean + c as f64 * ens_frac as f64 + d as f64 * mean.cbrt();
        inv_logit(logit as f32)
    }

    /// Amount at `quantile` of the calibrated distribution.
    ///
    /// Quantiles below `P0` map to zero. Returns [`MISSING`] for a quantile
    /// outside `[0, 1)`, an invalid or negative mean, a fraction outside
    /// `[0, 1]`, invalid coefficients or a degenerate gamma distribution.
    pub fn inv_cdf(quantile: f32, ens_mean: f32, ens_frac: f32, parameters: &Parameters) -> f32 {
        if quantile == 0.0 {
            return 0.0;
        }
        if !is_valid(quantile) || !(0.0..1.0).contains(&quantile) {
            return MISSING;
        }
        if !is_valid(ens_mean) || !is_valid(ens_frac) || ens_mean < 0.0 {
            return MISSING;
        }
        if !(0.0..=1.0).contains(&ens_frac) {
            return MISSING;
        }
        if parameters.len() != Self::NUM_PARAMETERS || !parameters.is_valid() {
            return MISSING;
        }

        let p0 = Self::p0(ens_mean, ens_frac, parameters);
        if !is_valid(p0) {
            return MISSING;
        }
        if quantile < p0 {
            return 0.0;
        }

        let mean = ens_mean as f64;
        let mu = (parameters[0] as f64 + parameters[1] as f64 * mean.cbrt()).exp();
        let sigma = (parameters[2] as f64 + parameters[3] as f64 * mean).exp();
        if !mu.is_finite() || !sigma.is_finite() || mu <= 0.0 || sigma <= 0.0 {
            return MISSING;
        }

        let shape = 1.0 / (sigma * sigma);
        let scale = sigma * sigma * mu;
        if !shape.is_finite() || !scale.is_finite() || shape <= 0.0 || scale <= 0.0 {
            return MISSING;
        }

        let gamma = match Gamma::new(shape, 1.0 / scale) {
            Ok(gamma) => gamma,
            Err(_) => return MISSING,
        };
        let continuous = (quantile as f64 - p0 as f64) / (1.0 - p0 as f64);
        let value = gamma_quantile(&gamma, continuous.clamp(0.0, 1.0)) as f32;
        if is_valid(value) {
            value
        } else {
            MISSING
        }
    }
}

/// Relative tolerance on the CDF when accepting a quantile from statrs.
const CDF_TOLERANCE: f64 = 1e-9;

/// Inverse CDF of `gamma`.
///
/// statrs returns NaN or an imprecise value in the lower tail when the shape
/// is below 1. Such results are replaced by bisection on the CDF.
fn gamma_quantile(gamma: &Gamma, p: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let candidate = gamma.inverse_cdf(p);
    let accepted = candidate.is_finite()
        && candidate >= 0.0
        && (gamma.cdf(candidate) - p).abs() <= CDF_TOLERANCE * p;
    if accepted {
        return candidate;
    }

    let mut hi = 1.0f64;
    while gamma.cdf(hi) < p {
        hi *= 2.0;
        if !hi.is_finite() {
            return f64::NAN;
        }
    }
    let mut lo = 0.0f64;
    for _ in 0..256 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if gamma.cdf(mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

impl CalibrationStrategy for Zaga {
    fn name(&self) -> &'static str {
        "zaga"
    }

    fn variable(&self) -> Variable {
        self.variable
    }

    fn validate_parameters(&self, parameters: &Parameters) -> Result<()> {
        if parameters.len() != Self::NUM_PARAMETERS {
            return Err(CalibrationError::invalid_parameter_count(
                self.name(),
                Self::NUM_PARAMETERS.to_string(),
                parameters.len(),
            ));
        }
        Ok(())
    }

    fn calibrate_cell(&self, raw: &[f32], parameters: &Parameters, output: &mut [f32]) {
        let n = raw.len();
        let mut total = 0.0f64;
        let mut dry = 0usize;
        for &value in raw {
            total += value as f64;
            if value <= self.fraction_threshold {
                dry += 1;
            }
        }
        let ens_mean = ((total / n as f64) as f32).min(self.max_ens_mean);
        let ens_frac = dry as f32 / n as f32;

        for (e, out) in output.iter_mut().enumerate() {
            let quantile = (e as f32 + 0.5) / n as f32;
            *out = Self::inv_cdf(quantile, ens_mean, ens_frac, parameters);
        }
        shuffle(raw, output);
    }
}
