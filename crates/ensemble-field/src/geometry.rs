//! Grid geometry: latitude, longitude and elevation of every gridpoint.

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, FieldResult};
use crate::serde_nan;
use crate::util::{is_valid, same_value, same_values, MISSING};

/// A point on the Earth's surface. Elevation may be missing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub lat: f32,
    pub lon: f32,
    #[serde(with = "serde_nan::scalar", default = "missing_elev")]
    pub elev: f32,
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        same_value(self.lat, other.lat)
            && same_value(self.lon, other.lon)
            && same_value(self.elev, other.elev)
    }
}

fn missing_elev() -> f32 {
    MISSING
}

impl Location {
    /// Create a new location.
    pub fn new(lat: f32, lon: f32, elev: f32) -> Self {
        Self { lat, lon, elev }
    }

    /// True if latitude and longitude are both valid.
    pub fn has_coordinates(&self) -> bool {
        is_valid(self.lat) && is_valid(self.lon)
    }
}

/// Coordinates of an `n_lat` × `n_lon` grid.
///
/// Arrays are row-major: the value for gridpoint `(i, j)` lives at
/// `i * n_lon + j`. The grid need not be regular; every point carries its own
/// latitude and longitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GeometryRepr")]
pub struct GridGeometry {
    n_lat: usize,
    n_lon: usize,
    #[serde(with = "serde_nan")]
    lats: Vec<f32>,
    #[serde(with = "serde_nan")]
    lons: Vec<f32>,
    #[serde(with = "serde_nan")]
    elevs: Vec<f32>,
}

/// Missing coordinates and elevations compare equal to each other.
impl PartialEq for GridGeometry {
    fn eq(&self, other: &Self) -> bool {
        self.n_lat == other.n_lat
            && self.n_lon == other.n_lon
            && same_values(&self.lats, &other.lats)
            && same_values(&self.lons, &other.lons)
            && same_values(&self.elevs, &other.elevs)
    }
}

#[derive(Deserialize)]
struct GeometryRepr {
    n_lat: usize,
    n_lon: usize,
    #[serde(with = "serde_nan")]
    lats: Vec<f32>,
    #[serde(with = "serde_nan")]
    lons: Vec<f32>,
    #[serde(with = "serde_nan")]
    elevs: Vec<f32>,
}

impl TryFrom<GeometryRepr> for GridGeometry {
    type Error = FieldError;

    fn try_from(repr: GeometryRepr) -> FieldResult<Self> {
        Self::new(repr.n_lat, repr.n_lon, repr.lats, repr.lons, repr.elevs)
    }
}

impl GridGeometry {
    /// Create a geometry from row-major coordinate arrays.
    ///
    /// # Arguments
    /// * `n_lat` - Number of rows (first index)
    /// * `n_lon` - Number of columns (second index)
    /// * `lats`, `lons`, `elevs` - Arrays of `n_lat * n_lon` values
    pub fn new(
        n_lat: usize,
        n_lon: usize,
        lats: Vec<f32>,
        lons: Vec<f32>,
        elevs: Vec<f32>,
    ) -> FieldResult<Self> {
        let expected = n_lat * n_lon;
        for (array, len) in [("lats", lats.len()), ("lons", lons.len()), ("elevs", elevs.len())] {
            if len != expected {
                return Err(FieldError::GeometryMismatch {
                    array,
                    expected,
                    found: len,
                });
            }
        }
        Ok(Self {
            n_lat,
            n_lon,
            lats,
            lons,
            elevs,
        })
    }

    /// Regular lat/lon grid starting at (`first_lat`, `first_lon`) with missing elevations.
    pub fn regular(
        n_lat: usize,
        n_lon: usize,
        first_lat: f32,
        first_lon: f32,
        dlat: f32,
        dlon: f32,
    ) -> Self {
        let mut lats = Vec::with_capacity(n_lat * n_lon);
        let mut lons = Vec::with_capacity(n_lat * n_lon);
        for i in 0..n_lat {
            for j in 0..n_lon {
                lats.push(first_lat + i as f32 * dlat);
                lons.push(first_lon + j as f32 * dlon);
            }
        }
        Self {
            n_lat,
            n_lon,
            lats,
            lons,
            elevs: vec![MISSING; n_lat * n_lon],
        }
    }

    /// Replace the elevation array.
    pub fn with_elevations(mut self, elevs: Vec<f32>) -> FieldResult<Self> {
        if elevs.len() != self.len() {
            return Err(FieldError::GeometryMismatch {
                array: "elevs",
                expected: self.len(),
                found: elevs.len(),
            });
        }
        self.elevs = elevs;
        Ok(self)
    }

    pub fn n_lat(&self) -> usize {
        self.n_lat
    }

    pub fn n_lon(&self) -> usize {
        self.n_lon
    }

    /// Total number of gridpoints.
    pub fn len(&self) -> usize {
        self.n_lat * self.n_lon
    }

    /// Check if the grid has no points.
    pub fn is_empty(&self) -> bool {
        self.n_lat == 0 || self.n_lon == 0
    }

    /// Flat index of gridpoint `(i, j)`.
    #[inline]
    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        i * self.n_lon + j
    }

    /// Inverse of [`GridGeometry::flat_index`]. An empty grid maps everything to `(0, 0)`.
    #[inline]
    pub fn grid_index(&self, flat: usize) -> (usize, usize) {
        match self.n_lon {
            0 => (0, 0),
            n_lon => (flat / n_lon, flat % n_lon),
        }
    }

    pub fn lat(&self, i: usize, j: usize) -> f32 {
        self.lats[self.flat_index(i, j)]
    }

    pub fn lon(&self, i: usize, j: usize) -> f32 {
        self.lons[self.flat_index(i, j)]
    }

    pub fn elev(&self, i: usize, j: usize) -> f32 {
        self.elevs[self.flat_index(i, j)]
    }

    /// Location of gridpoint `(i, j)`.
    pub fn location(&self, i: usize, j: usize) -> Location {
        let idx = self.flat_index(i, j);
        Location::new(self.lats[idx], self.lons[idx], self.elevs[idx])
    }

    pub fn lats(&self) -> &[f32] {
        &self.lats
    }

    pub fn lons(&self) -> &[f32] {
        &self.lons
    }

    pub fn elevs(&self) -> &[f32] {
        &self.elevs
    }
}
