use ensemble_field::{GridGeometry, GriddedField, Variable};
use rayon::prelude::*;

use super::{nearest_source_points, Downscaler};
use crate::error::Result;

/// Copies the value of the nearest source gridpoint.
#[derive(Debug, Clone)]
pub struct NearestNeighbour {
    variable: Variable,
}

impl NearestNeighbour {
    pub fn new(variable: Variable) -> Self {
        Self { variable }
    }
}

impl Downscaler for NearestNeighbour {
    fn name(&self) -> &'static str {
        "nearest_neighbour"
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
                .for_each(|(out, source)| {
                    if let Some((i, j)) = *source {
                        out.copy_from_slice(input.cell(i, j, t));
                    }
                });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalibrationError;
    use ensemble_field::{Dataset, MISSING};

    #[test]
    fn test_copies_nearest_cell() {
        let from = GridGeometry::regular(2, 2, 60.0, 10.0, 1.0, 1.0);
        let input = GriddedField::from_fn(2, 2, 2, 1, |i, j, e, _| (i * 100 + j * 10 + e) as f32);

        let to = GridGeometry::new(
            1,
            3,
            vec![60.1, 60.9, MISSING],
            vec![10.2, 10.8, 10.5],
            vec![MISSING; 3],
        )
        .unwrap();
        let out = NearestNeighbour::new(Variable::T)
            .downscale_field(&input, &from, &to)
            .unwrap();

        assert_eq!(out.shape(), (1, 3, 2, 1));
        assert_eq!(out.cell(0, 0, 0), &[0.0, 1.0]);
        assert_eq!(out.cell(0, 1, 0), &[110.0, 111.0]);
        assert!(out.cell(0, 2, 0).iter().all(|v| v.is_nan()), "unmapped point stays missing");
    }

    #[test]
    fn test_downscale_dataset() {
        let from = GridGeometry::regular(2, 2, 60.0, 10.0, 1.0, 1.0);
        let mut input = Dataset::new(from, 1, 2);
        let field = GriddedField::from_fn(2, 2, 1, 2, |i, j, _, t| (t * 1000 + i * 10 + j) as f32);
        input.set_field(Variable::T, field).unwrap();

        let to = GridGeometry::regular(4, 4, 60.0, 10.0, 0.3, 0.3);
        let mut output = Dataset::new(to, 1, 2);
        NearestNeighbour::new(Variable::T).downscale(&input, &mut output).unwrap();

        let out = output.field(Variable::T).unwrap();
        assert_eq!(out.get(0, 0, 0, 0), 0.0);
        assert_eq!(out.get(3, 3, 0, 0), 11.0);
        assert_eq!(out.get(3, 3, 0, 1), 1011.0);
    }

    #[test]
    fn test_rejects_member_mismatch() {
        let from = GridGeometry::regular(1, 1, 60.0, 10.0, 1.0, 1.0);
        let mut input = Dataset::new(from.clone(), 2, 1);
        input.set_field(Variable::T, GriddedField::filled(1, 1, 2, 1, 1.0)).unwrap();
        let mut output = Dataset::new(from, 3, 1);
        let err = NearestNeighbour::new(Variable::T)
            .downscale(&input, &mut output)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::EnsembleMismatch { .. }));
    }

    #[test]
    fn test_empty_source_grid() {
        let from = GridGeometry::new(1, 1, vec![MISSING], vec![MISSING], vec![MISSING]).unwrap();
        let input = GriddedField::filled(1, 1, 1, 1, 1.0);
        let to = GridGeometry::regular(1, 1, 60.0, 10.0, 1.0, 1.0);
        let err = NearestNeighbour::new(Variable::T)
            .downscale_field(&input, &from, &to)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::EmptySourceGrid));
    }
}
