//! Downscaling from a coarse source grid onto a finer target grid.
//!
//! Every downscaler starts from the nearest source gridpoint of each target
//! point, found with a KD-tree over the source coordinates. Implementations
//! differ in how they adjust that value.

mod gradient;
mod nearest;

pub use gradient::Gradient;
pub use nearest::NearestNeighbour;

use std::fmt;

use ensemble_field::{Dataset, GridGeometry, GriddedField, Variable};
use spatial_index::KdTree;
use tracing::debug;

use crate::error::{CalibrationError, Result};

/// Produces a field on one grid from a field on another.
pub trait Downscaler: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Variable this downscaler operates on.
    fn variable(&self) -> Variable;

    /// Downscale `input` (on `from`) onto `to`.
    fn downscale_field(
        &self,
        input: &GriddedField,
        from: &GridGeometry,
        to: &GridGeometry,
    ) -> Result<GriddedField>;

    /// Downscale the variable from `input` and store it in `output`.
    fn downscale(&self, input: &Dataset, output: &mut Dataset) -> Result<()> {
        let variable = self.variable();
        let field = input
            .field(variable)
            .ok_or(CalibrationError::MissingVariable(variable))?;
        if input.n_ens() != output.n_ens() || input.n_time() != output.n_time() {
            return Err(CalibrationError::EnsembleMismatch {
                input_ens: input.n_ens(),
                input_time: input.n_time(),
                output_ens: output.n_ens(),
                output_time: output.n_time(),
            });
        }

        let downscaled = self.downscale_field(field, input.geometry(), output.geometry())?;
        output.set_field(variable, downscaled)?;
        Ok(())
    }
}

/// Nearest source gridpoint for each target point, in target row-major order.
///
/// Target points with a missing coordinate map to `None`.
pub(crate) fn nearest_source_points(
    input: &GriddedField,
    from: &GridGeometry,
    to: &GridGeometry,
) -> Result<Vec<Option<(usize, usize)>>> {
    if (input.n_lat(), input.n_lon()) != (from.n_lat(), from.n_lon()) {
        return Err(CalibrationError::GeometryMismatch {
            field: (input.n_lat(), input.n_lon()),
            geometry: (from.n_lat(), from.n_lon()),
        });
    }

    let tree = KdTree::from_geometry(from);
    if tree.is_empty() {
        return Err(CalibrationError::EmptySourceGrid);
    }
    let nearest = tree.nearest_for_grid(to);

    debug!(
        source_points = tree.len(),
        target_points = to.len(),
        unmapped = nearest.iter().filter(|n| n.is_none()).count(),
        "Mapped target grid onto source grid"
    );
    Ok(nearest)
}
