//! Nearest-neighbour lookup over gridpoints.
//!
//! [`KdTree`] partitions a fixed set of (longitude, latitude) points,
//! alternating the split axis per level and splitting at the median. Each node
//! remembers the `(i, j)` grid index it came from, so a query answers "which
//! gridpoint is closest" rather than "which coordinate".
//!
//! # Example
//!
//! ```
//! use spatial_index::KdTree;
//!
//! // 2 x 2 grid, row-major
//! let lats = [60.0, 60.0, 61.0, 61.0];
//! let lons = [10.0, 11.0, 10.0, 11.0];
//! let tree = KdTree::new(&lats, &lons, 2).unwrap();
//!
//! assert_eq!(tree.nearest(10.9, 60.8), Some((1, 1)));
//! ```

pub mod error;
pub mod kdtree;

pub use error::{Result, SpatialIndexError};
pub use kdtree::KdTree;
