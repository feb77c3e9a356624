//! Calibration parameters and the sources that serve them.
//!
//! A [`ParameterSource`] answers "which coefficients apply at this lead time
//! and location". [`ParameterFile`] is the stock implementation: either one
//! table of parameter sets keyed by lead time, or one such table per site
//! with a KD-tree picking the nearest site for each gridpoint.
//!
//! # Text format
//!
//! One parameter set per line, whitespace separated. `#` starts a comment.
//!
//! ```text
//! # global: time p0 p1 ...
//! 0 0.3 1.0
//! 1 0.2 1.1
//!
//! # spatial: time lat lon elev p0 p1 ...
//! 0 60.0 10.0 120 0.3 1.0
//! ```
//!
//! A table holding a single lead time applies to every lead time.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Index;
use std::path::Path;

use ensemble_field::{all_valid, Location};
use serde::{Deserialize, Serialize};
use spatial_index::KdTree;
use tracing::debug;

use crate::error::{CalibrationError, Result};

/// An ordered set of coefficients for one calibration method.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Vec<f32>);

impl Parameters {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    /// True if every coefficient is a valid number.
    pub fn is_valid(&self) -> bool {
        all_valid(&self.0)
    }
}

impl From<Vec<f32>> for Parameters {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl Index<usize> for Parameters {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

/// Provides parameter sets by lead time and, optionally, location.
pub trait ParameterSource: Send + Sync {
    /// True if parameters vary between gridpoints.
    fn is_location_dependent(&self) -> bool;

    /// Number of coefficients in every parameter set.
    fn num_parameters(&self) -> usize;

    /// Parameters for a lead time when they do not depend on location.
    fn parameters(&self, time: usize) -> Option<&Parameters>;

    /// Parameters for a lead time at a location.
    fn parameters_at(&self, time: usize, location: &Location) -> Option<&Parameters>;

    /// True if some parameter set applies to `time`.
    fn covers_time(&self, time: usize) -> bool;

    /// Every stored parameter set.
    fn parameter_sets(&self) -> Box<dyn Iterator<Item = &Parameters> + '_>;
}

/// How rows of a parameter file are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLayout {
    /// `time p0 p1 ...`
    #[default]
    Global,
    /// `time lat lon elev p0 p1 ...`
    Spatial,
}

impl ParameterLayout {
    fn leading_columns(self) -> usize {
        match self {
            ParameterLayout::Global => 1,
            ParameterLayout::Spatial => 4,
        }
    }
}

/// Parameter sets keyed by lead time.
#[derive(Debug, Clone, Default, PartialEq)]
struct TimeTable(BTreeMap<usize, Parameters>);

impl TimeTable {
    /// Exact match, or the only entry of a single-time table.
    fn resolve(&self, time: usize) -> Option<&Parameters> {
        self.0.get(&time).or_else(|| {
            if self.0.len() == 1 {
                self.0.values().next()
            } else {
                None
            }
        })
    }

    fn covers(&self, time: usize) -> bool {
        self.resolve(time).is_some()
    }
}

#[derive(Debug, Clone)]
enum Sites {
    Global(TimeTable),
    Spatial {
        locations: Vec<Location>,
        tables: Vec<TimeTable>,
        index: KdTree,
    },
}

/// Parameter sets loaded from a table, global or per site.
#[derive(Debug, Clone)]
pub struct ParameterFile {
    num_parameters: usize,
    sites: Sites,
}

impl ParameterFile {
    /// One parameter set that applies to every lead time and location.
    pub fn constant(parameters: Parameters) -> Self {
        let num_parameters = parameters.len();
        let mut table = TimeTable::default();
        table.0.insert(0, parameters);
        Self {
            num_parameters,
            sites: Sites::Global(table),
        }
    }

    /// Location-independent parameters keyed by lead time.
    pub fn global(by_time: BTreeMap<usize, Parameters>) -> Result<Self> {
        let num_parameters = check_counts(None, &by_time)?.unwrap_or(0);
        Ok(Self {
            num_parameters,
            sites: Sites::Global(TimeTable(by_time)),
        })
    }

    /// Per-site parameters. Each gridpoint uses the nearest site.
    pub fn spatial(sites: Vec<(Location, BTreeMap<usize, Parameters>)>) -> Result<Self> {
        let mut expected = None;
        for (_, by_time) in &sites {
            expected = check_counts(expected, by_time)?;
        }

        let (locations, tables): (Vec<Location>, Vec<TimeTable>) = sites
            .into_iter()
            .map(|(location, by_time)| (location, TimeTable(by_time)))
            .unzip();
        let index = KdTree::from_points(
            locations
                .iter()
                .enumerate()
                .map(|(k, loc)| (loc.lon, loc.lat, k, 0)),
        );

        Ok(Self {
            num_parameters: expected.unwrap_or(0),
            sites: Sites::Spatial {
                locations,
                tables,
                index,
            },
        })
    }

    /// Replace or add the global parameter set for one lead time.
    pub fn set_parameters(&mut self, time: usize, parameters: Parameters) -> Result<()> {
        match &mut self.sites {
            Sites::Global(table) => {
                if !table.0.is_empty() && parameters.len() != self.num_parameters {
                    return Err(CalibrationError::InconsistentParameterCount {
                        expected: self.num_parameters,
                        found: parameters.len(),
                        time,
                    });
                }
                self.num_parameters = parameters.len();
                table.0.insert(time, parameters);
                Ok(())
            }
            Sites::Spatial { .. } => Err(CalibrationError::invalid_option(
                "parameters",
                "cannot set global parameters on a spatial parameter file",
            )),
        }
    }

    /// Parse the text format described in the module docs.
    pub fn from_text(text: &str, layout: ParameterLayout) -> Result<Self> {
        let leading = layout.leading_columns();
        let mut width: Option<usize> = None;
        let mut global: BTreeMap<usize, Parameters> = BTreeMap::new();
        let mut site_order: Vec<Location> = Vec::new();
        let mut site_tables: HashMap<(u32, u32, u32), BTreeMap<usize, Parameters>> =
            HashMap::new();

        for (n, raw_line) in text.lines().enumerate() {
            let line_no = n + 1;
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() <= leading {
                return Err(CalibrationError::parse(
                    line_no,
                    format!("expected at least {} columns, found {}", leading + 1, tokens.len()),
                ));
            }
            match width {
                Some(w) if w != tokens.len() => {
                    return Err(CalibrationError::parse(
                        line_no,
                        format!("expected {} columns like earlier rows, found {}", w, tokens.len()),
                    ));
                }
                _ => width = Some(tokens.len()),
            }

            let time: usize = tokens[0].parse().map_err(|_| {
                CalibrationError::parse(line_no, format!("invalid lead time '{}'", tokens[0]))
            })?;
            let numbers = tokens[1..]
                .iter()
                .map(|tok| {
                    tok.parse::<f32>().map_err(|_| {
                        CalibrationError::parse(line_no, format!("invalid number '{}'", tok))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            match layout {
                ParameterLayout::Global => {
                    if global.insert(time, Parameters::new(numbers)).is_some() {
                        return Err(CalibrationError::parse(
                            line_no,
                            format!("lead time {} appears more than once", time),
                        ));
                    }
                }
                ParameterLayout::Spatial => {
                    let location = Location::new(numbers[0], numbers[1], numbers[2]);
                    let key = (
                        location.lat.to_bits(),
                        location.lon.to_bits(),
                        location.elev.to_bits(),
                    );
                    let table = site_tables.entry(key).or_insert_with(|| {
                        site_order.push(location);
                        BTreeMap::new()
                    });
                    if table.insert(time, Parameters::new(numbers[3..].to_vec())).is_some() {
                        return Err(CalibrationError::parse(
                            line_no,
                            format!(
                                "lead time {} appears more than once for site ({}, {})",
                                time, location.lat, location.lon
                            ),
                        ));
                    }
                }
            }
        }

        let file = match layout {
            ParameterLayout::Global => Self::global(global)?,
            ParameterLayout::Spatial => {
                let mut sites = Vec::with_capacity(site_order.len());
                for location in site_order {
                    let key = (
                        location.lat.to_bits(),
                        location.lon.to_bits(),
                        location.elev.to_bits(),
                    );
                    let table = site_tables.remove(&key).unwrap_or_default();
                    sites.push((location, table));
                }
                Self::spatial(sites)?
            }
        };

        debug!(
            layout = ?layout,
            sites = file.num_sites(),
            num_parameters = file.num_parameters,
            "Parsed parameter file"
        );
        Ok(file)
    }

    /// Read and parse a parameter file from disk.
    pub fn from_path(path: impl AsRef<Path>, layout: ParameterLayout) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_text(&text, layout)
    }

    /// Number of sites; a global file counts as one.
    pub fn num_sites(&self) -> usize {
        match &self.sites {
            Sites::Global(_) => 1,
            Sites::Spatial { locations, .. } => locations.len(),
        }
    }

    /// Site locations of a spatial file.
    pub fn locations(&self) -> &[Location] {
        match &self.sites {
            Sites::Global(_) => &[],
            Sites::Spatial { locations, .. } => locations,
        }
    }
}

/// Checks that every set in `by_time` has the same length as `expected`.
fn check_counts(
    mut expected: Option<usize>,
    by_time: &BTreeMap<usize, Parameters>,
) -> Result<Option<usize>> {
    for (&time, parameters) in by_time {
        match expected {
            Some(n) if n != parameters.len() => {
                return Err(CalibrationError::InconsistentParameterCount {
                    expected: n,
                    found: parameters.len(),
                    time,
                });
            }
            _ => expected = Some(parameters.len()),
        }
    }
    Ok(expected)
}

impl ParameterSource for ParameterFile {
    fn is_location_dependent(&self) -> bool {
        matches!(self.sites, Sites::Spatial { .. })
    }

    fn num_parameters(&self) -> usize {
        self.num_parameters
    }

    fn parameters(&self, time: usize) -> Option<&Parameters> {
        match &self.sites {
            Sites::Global(table) => table.resolve(time),
            Sites::Spatial { .. } => None,
        }
    }

    fn parameters_at(&self, time: usize, location: &Location) -> Option<&Parameters> {
        match &self.sites {
            Sites::Global(table) => table.resolve(time),
            Sites::Spatial { tables, index, .. } => {
                if !location.has_coordinates() {
                    return None;
                }
                let (site, _) = index.nearest(location.lon, location.lat)?;
                tables[site].resolve(time)
            }
        }
    }

    fn covers_time(&self, time: usize) -> bool {
        match &self.sites {
            Sites::Global(table) => table.covers(time),
            Sites::Spatial { tables, .. } => {
                !tables.is_empty() && tables.iter().all(|table| table.covers(time))
            }
        }
    }

    fn parameter_sets(&self) -> Box<dyn Iterator<Item = &Parameters> + '_> {
        match &self.sites {
            Sites::Global(table) => Box::new(table.0.values()),
            Sites::Spatial { tables, .. } => {
                Box::new(tables.iter().flat_map(|table| table.0.values()))
            }
        }
    }
}
