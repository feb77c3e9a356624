//! Test data generators for synthetic ensemble forecasts.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use ensemble_field::{Dataset, GridGeometry, GriddedField, Variable, MISSING};

/// Creates a regular test geometry over southern Norway.
///
/// Gridpoint `(i, j)` sits at latitude `58 + 0.1 * i` and longitude
/// `5 + 0.1 * j`. Elevations are missing.
///
/// # Example
///
/// ```
/// use test_utils::create_test_geometry;
///
/// let geometry = create_test_geometry(10, 5);
/// assert_eq!(geometry.len(), 50);
/// assert_eq!(geometry.lat(0, 0), 58.0);
/// ```
pub fn create_test_geometry(n_lat: usize, n_lon: usize) -> GridGeometry {
    GridGeometry::regular(n_lat, n_lon, 58.0, 5.0, 0.1, 0.1)
}

/// Creates a test geometry with terrain.
///
/// Elevation rises eastward by `meters_per_column` per gridpoint, plus a
/// small deterministic bump so no two rows are identical.
pub fn create_terrain_geometry(n_lat: usize, n_lon: usize, meters_per_column: f32) -> GridGeometry {
    let mut elevs = Vec::with_capacity(n_lat * n_lon);
    for i in 0..n_lat {
        for j in 0..n_lon {
            let bump = (simple_hash(j as u32, i as u32, 7) % 100) as f32 / 10.0;
            elevs.push(j as f32 * meters_per_column + bump);
        }
    }
    // Dimensions match by construction.
    match create_test_geometry(n_lat, n_lon).with_elevations(elevs) {
        Ok(geometry) => geometry,
        Err(e) => panic!("terrain geometry: {}", e),
    }
}

/// Creates a temperature-like ensemble in Kelvin.
///
/// Values follow a gradient from 270K in the north-west corner to about
/// 290K in the south-east, with member `e` offset by `0.5 * e` and lead
/// time `t` by `0.1 * t`.
pub fn create_temperature_field(
    n_lat: usize,
    n_lon: usize,
    n_ens: usize,
    n_time: usize,
) -> GriddedField {
    GriddedField::from_fn(n_lat, n_lon, n_ens, n_time, |i, j, e, t| {
        let x_factor = j as f32 / n_lon.max(1) as f32;
        let y_factor = i as f32 / n_lat.max(1) as f32;
        270.0 + x_factor * 10.0 + y_factor * 10.0 + 0.5 * e as f32 + 0.1 * t as f32
    })
}

/// Creates a precipitation-like ensemble in mm.
///
/// About three quarters of the values are dry (0 mm); the rest range up to
/// 50 mm. The same seed always gives the same field.
pub fn create_precipitation_field(
    n_lat: usize,
    n_lon: usize,
    n_ens: usize,
    n_time: usize,
    seed: u32,
) -> GriddedField {
    GriddedField::from_fn(n_lat, n_lon, n_ens, n_time, |i, j, e, t| {
        let hash = simple_hash(
            (j * n_ens + e) as u32,
            (i * n_time.max(1) + t) as u32,
            seed,
        );
        if hash % 4 == 0 {
            (hash % 5000) as f32 / 100.0
        } else {
            0.0
        }
    })
}

/// Replace the listed `(i, j, e, t)` entries with [`MISSING`].
pub fn with_missing(mut field: GriddedField, positions: &[(usize, usize, usize, usize)]) -> GriddedField {
    let (n_lat, n_lon, n_ens, n_time) = field.shape();
    for &(i, j, e, t) in positions {
        if i < n_lat && j < n_lon && e < n_ens && t < n_time {
            field.set(i, j, e, t, MISSING);
        }
    }
    field
}

/// Creates a dataset with a temperature field on [`create_test_geometry`].
pub fn create_temperature_dataset(n_lat: usize, n_lon: usize, n_ens: usize, n_time: usize) -> Dataset {
    let mut dataset = Dataset::new(create_test_geometry(n_lat, n_lon), n_ens, n_time);
    let field = create_temperature_field(n_lat, n_lon, n_ens, n_time);
    if let Err(e) = dataset.set_field(Variable::T, field) {
        panic!("temperature dataset: {}", e);
    }
    dataset
}

/// Creates a dataset with a precipitation field on [`create_test_geometry`].
pub fn create_precipitation_dataset(
    n_lat: usize,
    n_lon: usize,
    n_ens: usize,
    n_time: usize,
    seed: u32,
) -> Dataset {
    let mut dataset = Dataset::new(create_test_geometry(n_lat, n_lon), n_ens, n_time);
    let field = create_precipitation_field(n_lat, n_lon, n_ens, n_time, seed);
    if let Err(e) = dataset.set_field(Variable::Precip, field) {
        panic!("precipitation dataset: {}", e);
    }
    dataset
}

/// Creates a dataset with the fields a phase pass reads.
///
/// Temperature is [`create_temperature_field`]. Relative humidity is 0.9
/// and pressure 1000 hPa everywhere. Row `i = 0` is dry (0 mm); every
/// other row has 1.5 mm.
pub fn create_phase_dataset(n_lat: usize, n_lon: usize, n_ens: usize, n_time: usize) -> Dataset {
    let mut dataset = create_temperature_dataset(n_lat, n_lon, n_ens, n_time);
    let fields = [
        (
            Variable::Precip,
            GriddedField::from_fn(n_lat, n_lon, n_ens, n_time, |i, _, _, _| {
                if i == 0 {
                    0.0
                } else {
                    1.5
                }
            }),
        ),
        (Variable::Rh, GriddedField::filled(n_lat, n_lon, n_ens, n_time, 0.9)),
        (Variable::P, GriddedField::filled(n_lat, n_lon, n_ens, n_time, 100000.0)),
    ];
    for (variable, field) in fields {
        if let Err(e) = dataset.set_field(variable, field) {
            panic!("phase dataset: {}", e);
        }
    }
    dataset
}

/// Simple deterministic hash for reproducible test data.
fn simple_hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_mul(31).wrapping_add(x);
    h = h.wrapping_mul(31).wrapping_add(y);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}
