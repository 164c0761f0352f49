//! # DBSCAN Spatial Clustering
//!
//! Density-based clustering of raw (lat, lng) positions.
//!
//! ## Algorithm
//! 1. Bulk-load every position into an R-tree
//! 2. Query each point's `eps` neighborhood (inclusive, planar degrees); the
//!    neighborhood includes the point itself
//! 3. A point with at least `min_samples` neighbors is a core point
//! 4. Scan points in ascending index order; each unlabeled core point starts a
//!    new cluster, expanded through neighboring core points
//! 5. Non-core points reached during an expansion join that cluster (the first
//!    one to reach them); everything left over is [`NOISE`]
//!
//! Labels are numbered by each cluster's lowest-index core point, so both the
//! partition and the label values are fixed for a given input order.

use std::collections::BTreeMap;

use crate::geo_utils::planar_distance_sq;
use crate::GpsPoint;
use log::info;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Label of points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Derived clustering fields, one label per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterResult {
    /// Cluster label per record, or [`NOISE`]
    pub labels: Vec<i32>,
    /// Number of clusters (noise excluded)
    pub n_clusters: usize,
}

impl ClusterResult {
    /// Member count of every cluster, indexed by label.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            if label != NOISE {
                sizes[label as usize] += 1;
            }
        }
        sizes
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Record ids grouped by cluster label.
    pub fn members(&self) -> BTreeMap<i32, Vec<usize>> {
        let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (id, &label) in self.labels.iter().enumerate() {
            if label != NOISE {
                members.entry(label).or_default().push(id);
            }
        }
        members
    }
}

// =============================================================================
// R-tree Indexed Point for Neighbor Queries
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    point: GpsPoint,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.point.latitude, self.point.longitude])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        planar_distance_sq(&self.point, &GpsPoint::new(point[0], point[1]))
    }
}

fn build_rtree(points: &[GpsPoint]) -> RTree<IndexedPoint> {
    let indexed: Vec<IndexedPoint> = points
        .iter()
        .enumerate()
        .map(|(idx, &point)| IndexedPoint { idx, point })
        .collect();
    RTree::bulk_load(indexed)
}

/// Sorted ids of every indexed point within `sqrt(eps_sq)` of `point`.
fn region_query(tree: &RTree<IndexedPoint>, point: &GpsPoint, eps_sq: f64) -> Vec<usize> {
    let mut ids: Vec<usize> = tree
        .locate_within_distance([point.latitude, point.longitude], eps_sq)
        .map(|p| p.idx)
        .collect();
    ids.sort_unstable();
    ids
}

// =============================================================================
// Main Entry Point
// =============================================================================

/// Cluster `points` with DBSCAN.
///
/// `eps` is a radius in degrees; `min_samples` counts the point itself.
///
/// # Example
/// ```
/// use fleet_anomaly::{dbscan, GpsPoint, NOISE};
///
/// let mut points: Vec<GpsPoint> = (0..5)
///     .map(|i| GpsPoint::new(-3.73 + i as f64 * 0.0001, -38.54))
///     .collect();
/// points.push(GpsPoint::new(-3.90, -38.60)); // far away
///
/// let result = dbscan(&points, 0.01, 5);
/// assert_eq!(result.n_clusters, 1);
/// assert_eq!(result.labels, vec![0, 0, 0, 0, 0, NOISE]);
/// ```
pub fn dbscan(points: &[GpsPoint], eps: f64, min_samples: usize) -> ClusterResult {
    let start = std::time::Instant::now();
    let n = points.len();
    if n == 0 {
        return ClusterResult::default();
    }

    let tree = build_rtree(points);
    let eps_sq = eps * eps;

    #[cfg(feature = "parallel")]
    let neighborhoods: Vec<Vec<usize>> = {
        use rayon::prelude::*;
        points.par_iter().map(|p| region_query(&tree, p, eps_sq)).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let neighborhoods: Vec<Vec<usize>> = points.iter().map(|p| region_query(&tree, p, eps_sq)).collect();

    let is_core: Vec<bool> = neighborhoods.iter().map(|nb| nb.len() >= min_samples).collect();

    let mut labels = vec![NOISE; n];
    let mut n_clusters = 0usize;
    let mut stack: Vec<usize> = Vec::new();

    for seed in 0..n {
        if !is_core[seed] || labels[seed] != NOISE {
            continue;
        }

        let label = n_clusters as i32;
        n_clusters += 1;
        labels[seed] = label;
        stack.push(seed);

        while let Some(p) = stack.pop() {
            for &q in &neighborhoods[p] {
                if labels[q] != NOISE {
                    continue;
                }
                labels[q] = label;
                if is_core[q] {
                    stack.push(q);
                }
            }
        }
    }

    let result = ClusterResult { labels, n_clusters };
    info!(
        "[Clustering] {} clusters, {} noise points from {} positions in {}ms",
        result.n_clusters,
        result.noise_count(),
        n,
        start.elapsed().as_millis()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(lat: f64, lng: f64, count: usize, step: f64) -> Vec<GpsPoint> {
        (0..count)
            .map(|i| GpsPoint::new(lat + i as f64 * step, lng + i as f64 * step))
            .collect()
    }

    #[test]
    fn test_two_clusters_and_noise() {
        let mut points = blob(-3.73, -38.54, 6, 0.0005);
        points.extend(blob(-3.80, -38.45, 6, 0.0005));
        points.push(GpsPoint::new(-3.60, -38.70));

        let result = dbscan(&points, 0.01, 5);
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.cluster_sizes(), vec![6, 6]);
        assert_eq!(result.labels[12], NOISE);
        assert!(result.labels[..6].iter().all(|&l| l == 0));
        assert!(result.labels[6..12].iter().all(|&l| l == 1));
    }

    #[test]
    fn test_min_samples_counts_self() {
        // Exactly min_samples points in a tight group: all core
        let points = blob(-3.73, -38.54, 5, 0.0001);
        assert_eq!(dbscan(&points, 0.01, 5).n_clusters, 1);
        assert_eq!(dbscan(&points, 0.01, 6).n_clusters, 0);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Core group of 5 within eps of each other, plus a point reachable
        // only from the last core point
        let mut points = blob(0.0, 0.0, 5, 0.001);
        points.push(GpsPoint::new(0.004 + 0.009, 0.004));

        let result = dbscan(&points, 0.01, 5);
        assert_eq!(result.n_clusters, 1);
        assert_eq!(result.labels[5], 0);
    }

    #[test]
    fn test_border_point_shared_by_two_clusters() {
        // Non-core point at index 0, within eps of one core point in each
        // group; the group listed first gets label 0 and claims it
        let at = |offset: f64| GpsPoint::new(-3.73, -38.54 + offset);
        let points = vec![
            at(0.011),
            at(0.020),
            at(0.0215),
            at(0.0218),
            at(0.0221),
            at(0.0),
            at(0.0003),
            at(0.0006),
            at(0.002),
        ];

        let result = dbscan(&points, 0.01, 4);
        assert_eq!(result.n_clusters, 2);
        assert_eq!(result.labels, vec![0, 0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(result.cluster_sizes(), vec![5, 4]);
    }

    #[test]
    fn test_chain_of_core_points_is_one_cluster() {
        // Points every 0.004 degrees: each has neighbors on both sides
        let points: Vec<GpsPoint> = (0..30).map(|i| GpsPoint::new(i as f64 * 0.004, 0.0)).collect();
        let result = dbscan(&points, 0.01, 3);
        assert_eq!(result.n_clusters, 1);
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn test_sparse_points_are_noise() {
        let points: Vec<GpsPoint> = (0..10).map(|i| GpsPoint::new(i as f64, 0.0)).collect();
        let result = dbscan(&points, 0.01, 2);
        assert_eq!(result.n_clusters, 0);
        assert!(result.labels.iter().all(|&l| l == NOISE));
    }

    #[test]
    fn test_deterministic_labels() {
        let mut points = blob(-3.80, -38.45, 7, 0.0003);
        points.extend(blob(-3.73, -38.54, 7, 0.0003));
        let a = dbscan(&points, 0.005, 4);
        let b = dbscan(&points, 0.005, 4);
        assert_eq!(a, b);
        // First cluster is the one containing the lowest-index core point
        assert_eq!(a.labels[0], 0);
        assert_eq!(a.labels[7], 1);
    }

    #[test]
    fn test_members() {
        let mut points = blob(-3.73, -38.54, 5, 0.0001);
        points.insert(2, GpsPoint::new(10.0, 10.0));
        let members = dbscan(&points, 0.01, 5).members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[&0], vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(dbscan(&[], 0.01, 5), ClusterResult::default());
    }
}
