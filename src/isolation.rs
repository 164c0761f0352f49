//! # Isolation Forest
//!
//! Multivariate outlier scoring over standardized feature vectors.
//!
//! ## Algorithm
//! 1. Standardize every feature with statistics from the full dataset
//! 2. Build `n_trees` isolation trees, each on a random subsample of
//!    `min(max_samples, N)` records drawn without replacement
//! 3. Each node splits on a random non-constant feature at a uniform random
//!    value inside the node's range, until one record remains, all features
//!    are constant, or the height limit `ceil(log2(subsample))` is hit
//! 4. A record's path length is the leaf depth plus `c(leaf_size)`, the
//!    expected depth of an unbuilt subtree
//! 5. Score `s = 2^(-E[h] / c(subsample))`: close to 1 for easily isolated
//!    records, well below 0.5 for records deep in dense regions
//! 6. Flag the `ceil(contamination * N)` highest scores, lower index first on
//!    ties
//!
//! All randomness comes from one [`StdRng`] seeded by the caller. Per-tree
//! seeds are drawn from it up front, so trees can be grown in parallel without
//! changing the result.

use crate::features::{FeatureVector, StandardScaler, FEATURE_NAMES, NUM_FEATURES};
use crate::DetectionConfig;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Derived outlier fields, one entry per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierResult {
    /// Anomaly score in (0, 1]; higher is more anomalous
    pub scores: Vec<f64>,
    pub flags: Vec<bool>,
}

impl OutlierResult {
    pub fn outlier_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// One randomly grown isolation tree.
#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(data: &[FeatureVector], sample: &mut [usize], height_limit: usize, rng: &mut StdRng) -> Self {
        Self { root: grow_node(data, sample, 0, height_limit, rng) }
    }

    fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split { feature, threshold, left, right } => {
                    node = if x[*feature] <= *threshold { &**left } else { &**right };
                    depth += 1.0;
                }
            }
        }
    }
}

fn grow_node(
    data: &[FeatureVector],
    sample: &mut [usize],
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if sample.len() <= 1 || depth >= height_limit {
        return Node::Leaf { size: sample.len() };
    }

    let splittable: Vec<(usize, f64, f64)> = (0..NUM_FEATURES)
        .filter_map(|f| {
            let (min, max) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(data[i][f]), hi.max(data[i][f]))
            });
            (max > min).then_some((f, min, max))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    // threshold in [min, max): both sides of `<=` are non-empty
    let threshold = rng.gen_range(min..max);

    let mut split = 0;
    for i in 0..sample.len() {
        if data[sample[i]][feature] <= threshold {
            sample.swap(i, split);
            split += 1;
        }
    }

    let (left, right) = sample.split_at_mut(split);
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow_node(data, left, depth + 1, height_limit, rng)),
        right: Box::new(grow_node(data, right, depth + 1, height_limit, rng)),
    }
}

/// Average path length of an unsuccessful BST search over `n` records.
///
/// Normalizes path lengths: `c(n) = 2H(n-1) - 2(n-1)/n`.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// An ensemble of isolation trees fitted on one dataset.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
}

impl IsolationForest {
    /// Grow `n_trees` trees on `data` (already standardized).
    ///
    /// Each tree sees `min(max_samples, data.len())` records.
    pub fn fit(data: &[FeatureVector], n_trees: usize, max_samples: usize, rng: &mut StdRng) -> Self {
        let subsample_size = max_samples.min(data.len());
        if subsample_size == 0 {
            return Self { trees: Vec::new(), subsample_size };
        }

        let height_limit = (subsample_size as f64).log2().ceil() as usize;
        let seeds: Vec<u64> = (0..n_trees).map(|_| rng.gen()).collect();

        let grow = |seed: u64| {
            let mut tree_rng = StdRng::seed_from_u64(seed);
            let mut sample =
                rand::seq::index::sample(&mut tree_rng, data.len(), subsample_size).into_vec();
            IsolationTree::grow(data, &mut sample, height_limit, &mut tree_rng)
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<IsolationTree> = {
            use rayon::prelude::*;
            seeds.into_par_iter().map(grow).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let trees: Vec<IsolationTree> = seeds.into_iter().map(grow).collect();

        debug!(
            "[Isolation] Grew {} trees (subsample {}, height limit {})",
            trees.len(),
            subsample_size,
            height_limit
        );

        Self { trees, subsample_size }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean path length of `x` across all trees.
    pub fn mean_path_length(&self, x: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Normalized anomaly score in (0, 1]; higher is more anomalous.
    pub fn score(&self, x: &FeatureVector) -> f64 {
        let norm = average_path_length(self.subsample_size);
        if norm == 0.0 {
            // One-record subsample: nothing to isolate against
            return 0.5;
        }
        2f64.powf(-self.mean_path_length(x) / norm)
    }

    pub fn score_all(&self, data: &[FeatureVector]) -> Vec<f64> {
        data.iter().map(|x| self.score(x)).collect()
    }
}

/// Standardize `features`, score them with a seeded forest, and flag the
/// `ceil(contamination * N)` most anomalous records.
pub fn detect_outliers(features: &[FeatureVector], config: &DetectionConfig) -> OutlierResult {
    let start = std::time::Instant::now();
    let n = features.len();
    if n == 0 {
        return OutlierResult::default();
    }

    let scaler = StandardScaler::fit(features);
    for (name, (mean, std_dev)) in FEATURE_NAMES.iter().zip(scaler.means.iter().zip(&scaler.std_devs)) {
        debug!("[Isolation] {}: mean={:.4} std={:.4}", name, mean, std_dev);
    }
    let scaled = scaler.transform(features);
    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let forest = IsolationForest::fit(&scaled, config.n_trees, config.max_samples, &mut rng);
    let scores = forest.score_all(&scaled);

    let n_flagged = outlier_budget(config.contamination, n);
    let flags = flag_top_scores(&scores, n_flagged);

    info!(
        "[Isolation] Flagged {} of {} records ({} trees) in {}ms",
        n_flagged,
        n,
        forest.n_trees(),
        start.elapsed().as_millis()
    );

    OutlierResult { scores, flags }
}

/// Number of records to flag: `ceil(contamination * n)`, capped at `n`.
///
/// The product is nudged down by a relative epsilon first, so rounding error
/// cannot push an exact count such as `0.07 * 100` to the next integer.
pub fn outlier_budget(contamination: f64, n: usize) -> usize {
    let product = contamination * n as f64;
    let count = (product - product.abs() * 1e-9).ceil().max(0.0) as usize;
    count.min(n)
}

/// Flag the `k` highest scores; equal scores favour the lower index.
fn flag_top_scores(scores: &[f64], k: usize) -> Vec<bool> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable: ties keep ascending index order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut flags = vec![false; scores.len()];
    for &i in order.iter().take(k) {
        flags[i] = true;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(n: usize) -> Vec<FeatureVector> {
        // Deterministic, gently spread inliers
        (0..n)
            .map(|i| {
                let t = i as f64;
                [
                    -3.73 + (t * 0.37).sin() * 0.01,
                    -38.54 + (t * 0.73).cos() * 0.01,
                    30.0 + (t * 1.3).sin() * 5.0,
                    180.0 + (t * 0.11).cos() * 20.0,
                    50.0 + (t * 0.91).sin() * 10.0,
                ]
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is about 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_isolated_point_scores_highest() {
        let mut data = cloud(200);
        data.push([-3.73, -38.54, 119.0, 5.0, 40_000.0]);
        let config = DetectionConfig::default();

        let result = detect_outliers(&data, &config);
        let best = (0..data.len())
            .max_by(|&a, &b| result.scores[a].total_cmp(&result.scores[b]))
            .unwrap();
        assert_eq!(best, 200);
        assert!(result.flags[200]);
    }

    #[test]
    fn test_flag_count_is_ceil_of_contamination() {
        let data = cloud(137);
        for (contamination, expected) in [(0.01, 2), (0.05, 7), (0.1, 14), (0.33, 46)] {
            let config = DetectionConfig { contamination, ..Default::default() };
            let result = detect_outliers(&data, &config);
            assert_eq!(result.outlier_count(), expected);
        }
    }

    #[test]
    fn test_outlier_budget_exact_products() {
        // 0.07 * 100 evaluates to 7.000000000000001
        assert_eq!(outlier_budget(0.07, 100), 7);
        assert_eq!(outlier_budget(0.1, 30), 3);
        assert_eq!(outlier_budget(0.29, 100), 29);
        assert_eq!(outlier_budget(0.01, 8), 1);
        assert_eq!(outlier_budget(0.5, 3), 2);
        assert_eq!(outlier_budget(0.99, 1), 1);
        assert_eq!(outlier_budget(0.5, 0), 0);
    }

    #[test]
    fn test_flag_count_for_exact_contamination() {
        let data = cloud(100);
        let config = DetectionConfig { contamination: 0.07, ..Default::default() };
        assert_eq!(detect_outliers(&data, &config).outlier_count(), 7);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = cloud(300);
        let config = DetectionConfig { contamination: 0.05, ..Default::default() };
        let a = detect_outliers(&data, &config);
        let b = detect_outliers(&data, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_subsample_still_flags() {
        let data = cloud(3);
        let config = DetectionConfig { contamination: 0.5, ..Default::default() };
        let result = detect_outliers(&data, &config);
        assert_eq!(result.outlier_count(), 2);
        assert!(result.scores.iter().all(|s| *s > 0.0 && *s <= 1.0));
    }

    #[test]
    fn test_single_record() {
        let result = detect_outliers(&cloud(1), &DetectionConfig::default());
        assert_eq!(result.flags, vec![true]);
        assert_eq!(result.scores, vec![0.5]);
    }

    #[test]
    fn test_identical_records_tie_by_index() {
        let data = vec![[1.0, 2.0, 3.0, 4.0, 5.0]; 10];
        let config = DetectionConfig { contamination: 0.2, ..Default::default() };
        let result = detect_outliers(&data, &config);
        assert_eq!(result.flags, vec![true, true, false, false, false, false, false, false, false, false]);
    }

    #[test]
    fn test_empty() {
        let result = detect_outliers(&[], &DetectionConfig::default());
        assert!(result.scores.is_empty());
        assert!(result.flags.is_empty());
    }

    #[test]
    fn test_flag_top_scores_ties() {
        let flags = flag_top_scores(&[0.5, 0.9, 0.9, 0.1], 2);
        assert_eq!(flags, vec![false, true, true, false]);
        let flags = flag_top_scores(&[0.5, 0.9, 0.9, 0.1], 1);
        assert_eq!(flags, vec![false, true, false, false]);
    }
}
