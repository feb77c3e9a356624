//! Polynomial regression calibration: `out = p0 + p1*raw + p2*raw^2 + ...`.

use ensemble_field::{is_valid, Variable, MISSING};

use crate::calibrator::{CalibrationStrategy, MemberPolicy};
use crate::error::{CalibrationError, Result};
use crate::parameters::Parameters;

/// Per-member polynomial in the raw value.
#[derive(Debug, Clone)]
pub struct Regression {
    variable: Variable,
}

impl Regression {
    pub fn new(variable: Variable) -> Self {
        Self { variable }
    }

    /// Evaluate the polynomial. Missing raw value or coefficient gives [`MISSING`].
    pub fn evaluate(raw: f32, parameters: &Parameters) -> f32 {
        if !is_valid(raw) || !parameters.is_valid() {
            return MISSING;
        }
        // Horner's scheme, highest order first.
        let x = raw as f64;
        let value = parameters
            .values()
            .iter()
            .rev()
            .fold(0.0f64, |acc, &p| acc * x + p as f64) as f32;
        if is_valid(value) {
            value
        } else {
            MISSING
        }
    }
}

impl CalibrationStrategy for Regression {
    fn name(&self) -> &'static str {
        "regression"
    }

    fn variable(&self) -> Variable {
        self.variable
    }

    fn member_policy(&self) -> MemberPolicy {
        MemberPolicy::PerMember
    }

    fn validate_parameters(&self, parameters: &Parameters) -> Result<()> {
        if parameters.is_empty() {
            return Err(CalibrationError::invalid_parameter_count(
                self.name(),
                "at least 1",
                0,
            ));
        }
        Ok(())
    }

    fn calibrate_cell(&self, raw: &[f32], parameters: &Parameters, output: &mut [f32]) {
        for (out, &value) in output.iter_mut().zip(raw) {
            *out = Self::evaluate(value, parameters);
        }
    }
}
