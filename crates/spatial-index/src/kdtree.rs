//! Balanced 2-d tree over (longitude, latitude).
//!
//! Nodes live in an arena (`Vec<Node>`) and refer to their children and
//! parent by index. The parent link is only used to walk back up the tree
//! after the greedy first descent.
//!
//! Distances are squared planar distances in degrees. This is the metric the
//! splitting planes are defined in, so pruning on plane distance is exact.

use ensemble_field::GridGeometry;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Result, SpatialIndexError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Lon,
    Lat,
}

impl Axis {
    #[inline]
    fn next(self) -> Self {
        match self {
            Axis::Lon => Axis::Lat,
            Axis::Lat => Axis::Lon,
        }
    }

    #[inline]
    fn coord(self, lon: f64, lat: f64) -> f64 {
        match self {
            Axis::Lon => lon,
            Axis::Lat => lat,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    lon: f64,
    lat: f64,
    i: usize,
    j: usize,
}

#[derive(Debug, Clone)]
struct Node {
    lon: f64,
    lat: f64,
    i: usize,
    j: usize,
    axis: Axis,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
}

impl Node {
    /// Signed distance from `(lon, lat)` to this node's splitting plane.
    #[inline]
    fn plane_offset(&self, lon: f64, lat: f64) -> f64 {
        self.axis.coord(lon, lat) - self.axis.coord(self.lon, self.lat)
    }

    #[inline]
    fn distance2(&self, lon: f64, lat: f64) -> f64 {
        let dlon = self.lon - lon;
        let dlat = self.lat - lat;
        dlon * dlon + dlat * dlat
    }
}

#[derive(Debug, Clone, Copy)]
struct Best {
    node: usize,
    distance2: f64,
}

impl Best {
    #[inline]
    fn offer(&mut self, node: usize, distance2: f64) {
        // Strictly closer only: the first point found at a given distance wins.
        if distance2 < self.distance2 {
            self.node = node;
            self.distance2 = distance2;
        }
    }
}

/// KD-tree answering "nearest gridpoint" queries.
///
/// Immutable after construction; queries take `&self` and can run from many
/// threads at once.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree {
    /// Build a tree from row-major coordinate arrays.
    ///
    /// Point `k` gets grid index `(k / n_lon, k % n_lon)`. Points with a
    /// missing latitude or longitude are left out of the tree.
    ///
    /// # Arguments
    /// * `lats` - Latitudes in degrees
    /// * `lons` - Longitudes in degrees, same length as `lats`
    /// * `n_lon` - Row width used to turn flat positions into `(i, j)`
    pub fn new(lats: &[f32], lons: &[f32], n_lon: usize) -> Result<Self> {
        if lats.len() != lons.len() {
            return Err(SpatialIndexError::LengthMismatch {
                lats: lats.len(),
                lons: lons.len(),
            });
        }
        if !lats.is_empty() && (n_lon == 0 || lats.len() % n_lon != 0) {
            return Err(SpatialIndexError::InvalidShape {
                len: lats.len(),
                n_lon,
            });
        }

        let points = lats
            .iter()
            .zip(lons)
            .enumerate()
            .map(|(k, (&lat, &lon))| (lon, lat, k / n_lon.max(1), k % n_lon.max(1)));
        Ok(Self::from_points(points))
    }

    /// Build a tree over every gridpoint of `geometry`.
    pub fn from_geometry(geometry: &GridGeometry) -> Self {
        let n_lon = geometry.n_lon();
        let points = geometry
            .lats()
            .iter()
            .zip(geometry.lons())
            .enumerate()
            .map(|(k, (&lat, &lon))| (lon, lat, k / n_lon, k % n_lon));
        Self::from_points(points)
    }

    /// Build a tree from `(lon, lat, i, j)` tuples.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f32, f32, usize, usize)>,
    {
        let mut points: Vec<IndexedPoint> = points
            .into_iter()
            .filter(|(lon, lat, _, _)| lon.is_finite() && lat.is_finite())
            .map(|(lon, lat, i, j)| IndexedPoint {
                lon: lon as f64,
                lat: lat as f64,
                i,
                j,
            })
            .collect();

        let mut tree = Self {
            nodes: Vec::with_capacity(points.len()),
            root: None,
        };
        tree.root = tree.build_subtree(&mut points, Axis::Lon, None);
        debug!(points = tree.nodes.len(), "Built KD-tree");
        tree
    }

    fn build_subtree(
        &mut self,
        points: &mut [IndexedPoint],
        axis: Axis,
        parent: Option<usize>,
    ) -> Option<usize> {
        if points.is_empty() {
            return None;
        }

        // Stable sort keeps the layout deterministic when coordinates repeat.
        points.sort_by(|a, b| axis.coord(a.lon, a.lat).total_cmp(&axis.coord(b.lon, b.lat)));
        let mid = points.len() / 2;
        let median = points[mid];

        let index = self.nodes.len();
        self.nodes.push(Node {
            lon: median.lon,
            lat: median.lat,
            i: median.i,
            j: median.j,
            axis,
            left: None,
            right: None,
            parent,
        });

        let (lower, rest) = points.split_at_mut(mid);
        let upper = &mut rest[1..];
        let left = self.build_subtree(lower, axis.next(), Some(index));
        let right = self.build_subtree(upper, axis.next(), Some(index));
        self.nodes[index].left = left;
        self.nodes[index].right = right;

        Some(index)
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Grid index `(i, j)` of the point nearest to `(lon, lat)`.
    ///
    /// Returns `None` if the tree is empty or the query has a missing
    /// coordinate.
    pub fn nearest(&self, lon: f32, lat: f32) -> Option<(usize, usize)> {
        let root = self.root?;
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let (lon, lat) = (lon as f64, lat as f64);

        let leaf = self.first_guess(root, lon, lat);
        let mut best = Best {
            node: leaf,
            distance2: self.nodes[leaf].distance2(lon, lat),
        };

        // Walk back towards the root, visiting the other side of each split
        // whenever the splitting plane is closer than the best point so far.
        let mut child = leaf;
        while let Some(parent) = self.nodes[child].parent {
            let node = &self.nodes[parent];
            best.offer(parent, node.distance2(lon, lat));

            let sibling = if node.left == Some(child) {
                node.right
            } else {
                node.left
            };
            if let Some(sibling) = sibling {
                let offset = node.plane_offset(lon, lat);
                if offset * offset < best.distance2 {
                    self.search(sibling, lon, lat, &mut best);
                }
            }
            child = parent;
        }

        let node = &self.nodes[best.node];
        Some((node.i, node.j))
    }

    /// Greedy descent following the split axis to a leaf.
    fn first_guess(&self, mut index: usize, lon: f64, lat: f64) -> usize {
        loop {
            let node = &self.nodes[index];
            let next = if node.plane_offset(lon, lat) < 0.0 {
                node.left.or(node.right)
            } else {
                node.right.or(node.left)
            };
            match next {
                Some(next) => index = next,
                None => return index,
            }
        }
    }

    /// Exhaustive search of a subtree with plane pruning.
    fn search(&self, index: usize, lon: f64, lat: f64, best: &mut Best) {
        let node = &self.nodes[index];
        best.offer(index, node.distance2(lon, lat));

        let offset = node.plane_offset(lon, lat);
        let (near, far) = if offset < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.search(near, lon, lat, best);
        }
        if let Some(far) = far {
            if offset * offset < best.distance2 {
                self.search(far, lon, lat, best);
            }
        }
    }

    /// Nearest gridpoint for each `(lons[k], lats[k])`, computed in parallel.
    ///
    /// Identical to calling [`KdTree::nearest`] for each point.
    pub fn nearest_many(&self, lats: &[f32], lons: &[f32]) -> Vec<Option<(usize, usize)>> {
        lats.par_iter()
            .zip(lons.par_iter())
            .map(|(&lat, &lon)| self.nearest(lon, lat))
            .collect()
    }

    /// Nearest source gridpoint for every point of `target`, in the target's
    /// row-major order.
    pub fn nearest_for_grid(&self, target: &GridGeometry) -> Vec<Option<(usize, usize)>> {
        self.nearest_many(target.lats(), target.lons())
    }
}
