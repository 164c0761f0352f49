//! Feature assembly and standardization for outlier scoring.

use crate::trajectory::JumpTable;
use crate::GpsRecord;

/// Number of features per record.
pub const NUM_FEATURES: usize = 5;

/// Feature order of a [`FeatureVector`].
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = ["lat", "lng", "speed", "direction", "jump_distance_m"];

/// `(lat, lng, speed, direction, jump_distance_m)` for one record.
pub type FeatureVector = [f64; NUM_FEATURES];

/// Build one feature vector per record, indexed by [`crate::RecordId`].
pub fn assemble_features(records: &[GpsRecord], jumps: &JumpTable) -> Vec<FeatureVector> {
    records
        .iter()
        .zip(&jumps.distances_m)
        .map(|(r, &jump)| [r.lat, r.lng, r.speed, r.direction, jump])
        .collect()
}

/// Per-feature mean and standard deviation fitted over a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    pub means: FeatureVector,
    /// Population standard deviations
    pub std_devs: FeatureVector,
}

impl StandardScaler {
    /// Fit means and population standard deviations.
    ///
    /// An empty dataset yields zero means and unit deviations.
    pub fn fit(data: &[FeatureVector]) -> Self {
        let mut means = [0.0; NUM_FEATURES];
        let mut std_devs = [1.0; NUM_FEATURES];
        if data.is_empty() {
            return Self { means, std_devs };
        }

        let n = data.len() as f64;
        for f in 0..NUM_FEATURES {
            let mean = data.iter().map(|x| x[f]).sum::<f64>() / n;
            let variance = data.iter().map(|x| (x[f] - mean).powi(2)).sum::<f64>() / n;
            means[f] = mean;
            std_devs[f] = variance.sqrt();
        }

        Self { means, std_devs }
    }

    /// Standardize one vector. Zero-variance features map to 0.
    pub fn transform_one(&self, x: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; NUM_FEATURES];
        for f in 0..NUM_FEATURES {
            if self.std_devs[f] > 0.0 {
                out[f] = (x[f] - self.means[f]) / self.std_devs[f];
            }
        }
        out
    }

    pub fn transform(&self, data: &[FeatureVector]) -> Vec<FeatureVector> {
        data.iter().map(|x| self.transform_one(x)).collect()
    }

    pub fn fit_transform(data: &[FeatureVector]) -> Vec<FeatureVector> {
        Self::fit(data).transform(data)
    }
}
