//! Four-dimensional ensemble field.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, FieldResult};
use crate::serde_nan;
use crate::util::{same_values, MISSING};

/// Values of one variable over lat × lon × ensemble member × lead time.
///
/// Storage is time-major with the ensemble contiguous per gridpoint:
/// `((t * n_lat + i) * n_lon + j) * n_ens + e`. One lead time is therefore a
/// contiguous block of `n_lat * n_lon` cells of `n_ens` members each, which is
/// what the calibration loops split across threads.
///
/// Dimensions are fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FieldRepr")]
pub struct GriddedField {
    n_lat: usize,
    n_lon: usize,
    n_ens: usize,
    n_time: usize,
    #[serde(with = "serde_nan")]
    data: Vec<f32>,
}

/// Unchecked wire form, validated into a [`GriddedField`] on deserialize.
#[derive(Deserialize)]
struct FieldRepr {
    n_lat: usize,
    n_lon: usize,
    n_ens: usize,
    n_time: usize,
    #[serde(with = "serde_nan")]
    data: Vec<f32>,
}

/// Missing values compare equal to each other.
impl PartialEq for GriddedField {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && same_values(&self.data, &other.data)
    }
}

impl TryFrom<FieldRepr> for GriddedField {
    type Error = FieldError;

    fn try_from(repr: FieldRepr) -> FieldResult<Self> {
        Self::from_vec(repr.n_lat, repr.n_lon, repr.n_ens, repr.n_time, repr.data)
    }
}

impl GriddedField {
    /// Create a field with every value set to `fill`.
    pub fn filled(n_lat: usize, n_lon: usize, n_ens: usize, n_time: usize, fill: f32) -> Self {
        Self {
            n_lat,
            n_lon,
            n_ens,
            n_time,
            data: vec![fill; n_lat * n_lon * n_ens * n_time],
        }
    }

    /// Create a field where every value is missing.
    pub fn missing(n_lat: usize, n_lon: usize, n_ens: usize, n_time: usize) -> Self {
        Self::filled(n_lat, n_lon, n_ens, n_time, MISSING)
    }

    /// Wrap existing data laid out as described on [`GriddedField`].
    pub fn from_vec(
        n_lat: usize,
        n_lon: usize,
        n_ens: usize,
        n_time: usize,
        data: Vec<f32>,
    ) -> FieldResult<Self> {
        let expected = n_lat * n_lon * n_ens * n_time;
        if data.len() != expected {
            return Err(FieldError::LengthMismatch {
                n_lat,
                n_lon,
                n_ens,
                n_time,
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            n_lat,
            n_lon,
            n_ens,
            n_time,
            data,
        })
    }

    /// Build a field by evaluating `f(i, j, e, t)` at every index.
    pub fn from_fn<F>(n_lat: usize, n_lon: usize, n_ens: usize, n_time: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(n_lat * n_lon * n_ens * n_time);
        for t in 0..n_time {
            for i in 0..n_lat {
                for j in 0..n_lon {
                    for e in 0..n_ens {
                        data.push(f(i, j, e, t));
                    }
                }
            }
        }
        Self {
            n_lat,
            n_lon,
            n_ens,
            n_time,
            data,
        }
    }

    pub fn n_lat(&self) -> usize {
        self.n_lat
    }

    pub fn n_lon(&self) -> usize {
        self.n_lon
    }

    pub fn n_ens(&self) -> usize {
        self.n_ens
    }

    pub fn n_time(&self) -> usize {
        self.n_time
    }

    /// `(n_lat, n_lon, n_ens, n_time)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.n_lat, self.n_lon, self.n_ens, self.n_time)
    }

    /// Number of gridpoints per lead time.
    pub fn num_cells(&self) -> usize {
        self.n_lat * self.n_lon
    }

    #[inline]
    fn offset(&self, i: usize, j: usize, e: usize, t: usize) -> usize {
        debug_assert!(i < self.n_lat && j < self.n_lon && e < self.n_ens && t < self.n_time);
        ((t * self.n_lat + i) * self.n_lon + j) * self.n_ens + e
    }

    #[inline]
    fn time_range(&self, t: usize) -> std::ops::Range<usize> {
        let len = self.num_cells() * self.n_ens;
        t * len..(t + 1) * len
    }

    pub fn get(&self, i: usize, j: usize, e: usize, t: usize) -> f32 {
        self.data[self.offset(i, j, e, t)]
    }

    pub fn set(&mut self, i: usize, j: usize, e: usize, t: usize, value: f32) {
        let idx = self.offset(i, j, e, t);
        self.data[idx] = value;
    }

    /// Ensemble members at gridpoint `(i, j)` for lead time `t`.
    pub fn cell(&self, i: usize, j: usize, t: usize) -> &[f32] {
        let start = self.offset(i, j, 0, t);
        &self.data[start..start + self.n_ens]
    }

    pub fn cell_mut(&mut self, i: usize, j: usize, t: usize) -> &mut [f32] {
        let start = self.offset(i, j, 0, t);
        let n_ens = self.n_ens;
        &mut self.data[start..start + n_ens]
    }

    /// All values for lead time `t`, cell by cell.
    pub fn time_slice(&self, t: usize) -> &[f32] {
        &self.data[self.time_range(t)]
    }

    pub fn time_slice_mut(&mut self, t: usize) -> &mut [f32] {
        let range = self.time_range(t);
        &mut self.data[range]
    }

    /// Raw storage in the layout described on [`GriddedField`].
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl Index<(usize, usize, usize, usize)> for GriddedField {
    type Output = f32;

    fn index(&self, (i, j, e, t): (usize, usize, usize, usize)) -> &f32 {
        &self.data[self.offset(i, j, e, t)]
    }
}

impl IndexMut<(usize, usize, usize, usize)> for GriddedField {
    fn index_mut(&mut self, (i, j, e, t): (usize, usize, usize, usize)) -> &mut f32 {
        let idx = self.offset(i, j, e, t);
        &mut self.data[idx]
    }
}
