//! KD-tree answers compared against an exhaustive scan over random points.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatial_index::KdTree;

/// Exhaustive nearest search using the same planar metric as the tree.
fn linear_scan(lats: &[f32], lons: &[f32], n_lon: usize, lon: f32, lat: f32) -> (usize, usize) {
    let mut best = (0, f64::INFINITY);
    for (k, (&plat, &plon)) in lats.iter().zip(lons).enumerate() {
        let dlon = plon as f64 - lon as f64;
        let dlat = plat as f64 - lat as f64;
        let d = dlon * dlon + dlat * dlat;
        if d < best.1 {
            best = (k, d);
        }
    }
    (best.0 / n_lon, best.0 % n_lon)
}

fn random_points(rng: &mut StdRng, n: usize) -> (Vec<f32>, Vec<f32>) {
    let lats = (0..n).map(|_| rng.gen_range(-90.0..90.0)).collect();
    let lons = (0..n).map(|_| rng.gen_range(-180.0..180.0)).collect();
    (lats, lons)
}

fn check_against_scan(n_lat: usize, n_lon: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (lats, lons) = random_points(&mut rng, n_lat * n_lon);
    let tree = KdTree::new(&lats, &lons, n_lon).unwrap();
    assert_eq!(tree.len(), n_lat * n_lon);

    for _ in 0..500 {
        let lat = rng.gen_range(-95.0..95.0);
        let lon = rng.gen_range(-185.0..185.0);
        let expected = linear_scan(&lats, &lons, n_lon, lon, lat);
        assert_eq!(
            tree.nearest(lon, lat),
            Some(expected),
            "mismatch for query ({}, {}) with {} points",
            lon,
            lat,
            lats.len()
        );
    }
}

#[test]
fn test_single_point_matches_scan() {
    check_against_scan(1, 1, 1);
}

#[test]
fn test_two_points_match_scan() {
    check_against_scan(1, 2, 2);
    check_against_scan(2, 1, 3);
}

#[test]
fn test_hundred_points_match_scan() {
    check_against_scan(10, 10, 4);
}

#[test]
fn test_large_irregular_grid_matches_scan() {
    check_against_scan(37, 53, 5);
}

#[test]
fn test_clustered_points_match_scan() {
    // Many points crowded into a small box stress the pruning near plane ties.
    let mut rng = StdRng::seed_from_u64(6);
    let n_lon = 25;
    let lats: Vec<f32> = (0..500).map(|_| rng.gen_range(59.9..60.1)).collect();
    let lons: Vec<f32> = (0..500).map(|_| rng.gen_range(9.9..10.1)).collect();
    let tree = KdTree::new(&lats, &lons, n_lon).unwrap();

    for _ in 0..500 {
        let lat = rng.gen_range(59.8..60.2);
        let lon = rng.gen_range(9.8..10.2);
        assert_eq!(tree.nearest(lon, lat), Some(linear_scan(&lats, &lons, n_lon, lon, lat)));
    }
}

#[test]
fn test_bulk_query_matches_scan() {
    let mut rng = StdRng::seed_from_u64(7);
    let (lats, lons) = random_points(&mut rng, 400);
    let tree = KdTree::new(&lats, &lons, 20).unwrap();

    let (qlats, qlons) = random_points(&mut rng, 300);
    let bulk = tree.nearest_many(&qlats, &qlons);
    for (k, found) in bulk.into_iter().enumerate() {
        assert_eq!(found, Some(linear_scan(&lats, &lons, 20, qlons[k], qlats[k])));
    }
}

#[test]
fn test_duplicate_coordinates_find_a_nearest_copy() {
    // 300 points on only 12 distinct coordinates. Ties may resolve to any
    // copy, so compare distances rather than indices.
    let mut rng = StdRng::seed_from_u64(8);
    let sites: Vec<(f32, f32)> = (0..12)
        .map(|_| (rng.gen_range(50.0..70.0), rng.gen_range(0.0..30.0)))
        .collect();
    let picks: Vec<(f32, f32)> = (0..300).map(|_| sites[rng.gen_range(0..sites.len())]).collect();
    let lats: Vec<f32> = picks.iter().map(|p| p.0).collect();
    let lons: Vec<f32> = picks.iter().map(|p| p.1).collect();
    let n_lon = 15;
    let tree = KdTree::new(&lats, &lons, n_lon).unwrap();

    let distance = |(i, j): (usize, usize), lon: f32, lat: f32| {
        let k = i * n_lon + j;
        let dlon = lons[k] as f64 - lon as f64;
        let dlat = lats[k] as f64 - lat as f64;
        dlon * dlon + dlat * dlat
    };
    for _ in 0..300 {
        let lat = rng.gen_range(45.0..75.0);
        let lon = rng.gen_range(-5.0..35.0);
        let found = tree.nearest(lon, lat).unwrap();
        let expected = linear_scan(&lats, &lons, n_lon, lon, lat);
        assert_eq!(distance(found, lon, lat), distance(expected, lon, lat));
    }

    // A query exactly on a duplicated site resolves to one of its copies.
    let (lat, lon) = sites[0];
    let found = tree.nearest(lon, lat).unwrap();
    assert_eq!(distance(found, lon, lat), 0.0);
}
