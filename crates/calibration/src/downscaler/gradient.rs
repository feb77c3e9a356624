//! Elevation-gradient downscaling.
//!
//! The nearest source value is corrected for the elevation difference
//! between the target point and that source point:
//!
//! ```text
//! out = nearest + (elev_target - elev_nearest) * gradient
//! ```
//!
//! The gradient is either a fixed constant or an ordinary least-squares
//! slope of value against elevation over a box of source points around the
//! nearest one. Either way it is clamped to `[min_gradient, max_gradient]`.

use ensemble_field::{is_valid, GridGeometry, GriddedField, Variable};
use rayon::prelude::*;

use super::{nearest_source_points, Downscaler};
use crate::error::{CalibrationError, Result};

/// Elevation-gradient downscaler.
#[derive(Debug, Clone)]
pub struct Gradient {
    variable: Variable,
    search_radius: usize,
    min_gradient: f32,
    max_gradient: f32,
    constant_gradient: Option<f32>,
}

impl Gradient {
    pub const DEFAULT_SEARCH_RADIUS: usize = 3;
    pub const DEFAULT_MIN_GRADIENT: f32 = -10.0;
    pub const DEFAULT_MAX_GRADIENT: f32 = 10.0;

    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            search_radius: Self::DEFAULT_SEARCH_RADIUS,
            min_gradient: Self::DEFAULT_MIN_GRADIENT,
            max_gradient: Self::DEFAULT_MAX_GRADIENT,
            constant_gradient: None,
        }
    }

    /// Half-width of the regression box in gridpoints. Must be at least 1.
    pub fn with_search_radius(mut self, radius: usize) -> Result<Self> {
        if radius < 1 {
            return Err(CalibrationError::invalid_option(
                "search_radius",
                "must be at least 1",
            ));
        }
        self.search_radius = radius;
        Ok(self)
    }

    pub fn with_gradient_bounds(mut self, min: f32, max: f32) -> Result<Self> {
        if !is_valid(min) || !is_valid(max) || min > max {
            return Err(CalibrationError::invalid_option(
                "gradient bounds",
                format!("need finite min <= max, got [{}, {}]", min, max),
            ));
        }
        self.min_gradient = min;
        self.max_gradient = max;
        Ok(self)
    }

    /// Use a fixed gradient instead of estimating one.
    pub fn with_constant_gradient(mut self, gradient: f32) -> Result<Self> {
        if !is_valid(gradient) {
            return Err(CalibrationError::invalid_option(
                "constant_gradient",
                format!("must be a finite number, got {}", gradient),
            ));
        }
        self.constant_gradient = Some(gradient);
        Ok(self)
    }

    pub fn search_radius(&self) -> usize {
        self.search_radius
    }

    pub fn gradient_bounds(&self) -> (f32, f32) {
        (self.min_gradient, self.max_gradient)
    }

    pub fn constant_gradient(&self) -> Option<f32> {
        self.constant_gradient
    }

    /// Clamped gradient at source point `(i, j)` for member `e`, time `t`.
    fn gradient_at(
        &self,
        input: &GriddedField,
        from: &GridGeometry,
        i: usize,
        j: usize,
        e: usize,
        t: usize,
    ) -> f32 {
        let raw = match self.constant_gradient {
            Some(gradient) => gradient,
            None => self.estimate_gradient(input, from, i, j, e, t),
        };
        raw.clamp(self.min_gradient, self.max_gradient)
    }

    /// Least-squares slope of value against elevation around `(i, j)`.
    ///
    /// Zero when fewer than two usable points or no elevation spread.
    fn estimate_gradient(
        &self,
        input: &GriddedField,
        from: &GridGeometry,
        i: usize,
        j: usize,
        e: usize,
        t: usize,
    ) -> f32 {
        let mut count = 0usize;
        let (mut sum_x, mut sum_y) = (0.0f64, 0.0f64);
        self.for_each_sample(input, from, (i, j), (e, t), |x, y| {
            count += 1;
            sum_x += x;
            sum_y += y;
        });
        if count < 2 {
            return 0.0;
        }
        let mean_x = sum_x / count as f64;
        let mean_y = sum_y / count as f64;

        let (mut sxx, mut sxy) = (0.0f64, 0.0f64);
        self.for_each_sample(input, from, (i, j), (e, t), |x, y| {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        });
        if sxx <= 0.0 {
            return 0.0;
        }

        let slope = (sxy / sxx) as f32;
        if is_valid(slope) {
            slope
        } else {
            0.0
        }
    }

    /// Visit valid (elevation, value) pairs in the box around `center`.
    fn for_each_sample<F>(
        &self,
        input: &GriddedField,
        from: &GridGeometry,
        center: (usize, usize),
        (e, t): (usize, usize),
        mut f: F,
    ) where
        F: FnMut(f64, f64),
    {
        let r = self.search_radius;
        let (i, j) = center;
        let rows = i.saturating_sub(r)..=(i + r).min(from.n_lat() - 1);
        for ii in rows {
            for jj in j.saturating_sub(r)..=(j + r).min(from.n_lon() - 1) {
                let x = from.elev(ii, jj);
                let y = input.get(ii, jj, e, t);
                if is_valid(x) && is_valid(y) {
                    f(x as f64, y as f64);
                }
            }
        }
    }
}

impl Downscaler for Gradient {
    fn name(&self) -> &'static str {
        "gradient"
    }

    fn variable(&self) -> Variable {
        self.variable
    }

    fn downscale_field(
        &self,
        input: &GriddedField,
        from: &GridGeometry,
        to: &GridGeometry,
    ) -> Result<GriddedField> {
        let nearest = nearest_source_points(input, from, to)?;
        let n_ens = input.n_ens();
        let mut output = GriddedField::missing(to.n_lat(), to.n_lon(), n_ens, input.n_time());
        if n_ens == 0 {
            return Ok(output);
        }

        for t in 0..input.n_time() {
            output
                .time_slice_mut(t)
                .par_chunks_mut(n_ens)
                .zip(nearest.par_iter())
                .enumerate()
                .for_each(|(cell, (out, source))| {
                    let Some((ni, nj)) = *source else {
                        return;
                    };
                    let (i, j) = to.grid_index(cell);
                    let elev = to.elev(i, j);
                    let nearest_elev = from.elev(ni, nj);

                    for (e, value) in out.iter_mut().enumerate() {
                        let nearest_value = input.get(ni, nj, e, t);
                        *value = if is_valid(elev) && is_valid(nearest_elev) {
                            let gradient = self.gradient_at(input, from, ni, nj, e, t);
                            nearest_value + (elev - nearest_elev) * gradient
                        } else {
                            nearest_value
                        };
                    }
                });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ensemble_field::MISSING;

    /// 3x3 source grid with elevation rising eastward: 0, 1, 2 m.
    fn sloped_source(slope: f32) -> (GridGeometry, GriddedField) {
        let elevs = vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let from = GridGeometry::regular(3, 3, 60.0, 10.0, 1.0, 1.0)
            .with_elevations(elevs)
            .unwrap();
        let field = GriddedField::from_fn(3, 3, 1, 1, |_, j, _, _| 100.0 + slope * j as f32);
        (from, field)
    }

    /// One target point on top of source (1, 1) but at a different elevation.
    fn target(elev: f32) -> GridGeometry {
        GridGeometry::new(1, 1, vec![61.0], vec![11.0], vec![elev]).unwrap()
    }

    #[test]
    fn test_gradient_is_clamped() {
        let (from, field) = sloped_source(50.0);
        let out = Gradient::new(Variable::T)
            .downscale_field(&field, &from, &target(2.0))
            .unwrap();
        // Estimated slope 50 is clamped to 10; nearest value is 150.
        assert_relative_eq!(out.get(0, 0, 0, 0), 160.0, epsilon = 1e-4);
    }

    #[test]
    fn test_estimated_gradient_within_bounds() {
        let (from, field) = sloped_source(2.0);
        let out = Gradient::new(Variable::T)
            .downscale_field(&field, &from, &target(3.5))
            .unwrap();
        // 102 + 2.5 * 2
        assert_relative_eq!(out.get(0, 0, 0, 0), 107.0, epsilon = 1e-4);
    }

    #[test]
    fn test_constant_gradient_is_also_clamped() {
        let (from, field) = sloped_source(50.0);
        let downscaler = Gradient::new(Variable::T)
            .with_constant_gradient(-0.5)
            .unwrap();
        let out = downscaler.downscale_field(&field, &from, &target(11.0)).unwrap();
        assert_relative_eq!(out.get(0, 0, 0, 0), 145.0, epsilon = 1e-4);

        let steep = Gradient::new(Variable::T)
            .with_constant_gradient(-100.0)
            .unwrap();
        let out = steep.downscale_field(&field, &from, &target(2.0)).unwrap();
        assert_relative_eq!(out.get(0, 0, 0, 0), 140.0, epsilon = 1e-4);
    }

    #[test]
    fn test_flat_terrain_gives_zero_gradient() {
        let from = GridGeometry::regular(3, 3, 60.0, 10.0, 1.0, 1.0)
            .with_elevations(vec![5.0; 9])
            .unwrap();
        let field = GriddedField::from_fn(3, 3, 1, 1, |i, j, _, _| (i * 3 + j) as f32);
        let out = Gradient::new(Variable::T)
            .downscale_field(&field, &from, &target(500.0))
            .unwrap();
        assert_eq!(out.get(0, 0, 0, 0), 4.0);
    }

    #[test]
    fn test_missing_elevation_uses_nearest_value() {
        let (from, field) = sloped_source(2.0);
        let out = Gradient::new(Variable::T)
            .downscale_field(&field, &from, &target(MISSING))
            .unwrap();
        assert_eq!(out.get(0, 0, 0, 0), 102.0);
    }

    #[test]
    fn test_box_is_truncated_at_grid_edge() {
        let (from, field) = sloped_source(3.0);
        let corner = GridGeometry::new(1, 1, vec![60.0], vec![10.0], vec![1.0]).unwrap();
        let out = Gradient::new(Variable::T)
            .with_search_radius(1)
            .unwrap()
            .downscale_field(&field, &from, &corner)
            .unwrap();
        // Box covers columns 0 and 1 only; slope 3 over one metre.
        assert_relative_eq!(out.get(0, 0, 0, 0), 103.0, epsilon = 1e-4);
    }

    #[test]
    fn test_members_use_their_own_gradient() {
        let elevs = vec![0.0, 1.0, 2.0];
        let from = GridGeometry::regular(1, 3, 60.0, 10.0, 1.0, 1.0)
            .with_elevations(elevs)
            .unwrap();
        let field = GriddedField::from_fn(1, 3, 2, 1, |_, j, e, _| if e == 0 { j as f32 } else { -(j as f32) });
        let to = GridGeometry::new(1, 1, vec![60.0], vec![11.0], vec![2.0]).unwrap();
        let out = Gradient::new(Variable::T).downscale_field(&field, &from, &to).unwrap();
        assert_relative_eq!(out.get(0, 0, 0, 0), 2.0, epsilon = 1e-5);
        assert_relative_eq!(out.get(0, 0, 1, 0), -2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_option_validation() {
        assert!(Gradient::new(Variable::T).with_search_radius(0).is_err());
        assert!(Gradient::new(Variable::T).with_gradient_bounds(1.0, -1.0).is_err());
        assert!(Gradient::new(Variable::T).with_gradient_bounds(MISSING, 1.0).is_err());
        assert!(Gradient::new(Variable::T).with_constant_gradient(MISSING).is_err());
        let g = Gradient::new(Variable::T).with_gradient_bounds(-1.0, 1.0).unwrap();
        assert_eq!(g.gradient_bounds(), (-1.0, 1.0));
    }
}
