//! # Fleet Anomaly
//!
//! Batch anomaly detection for bus fleet GPS telemetry.
//!
//! This library provides:
//! - Record sanitization against GPS domain ranges
//! - Per-vehicle trajectory segmentation and geodesic jump detection
//! - Service-area (bounding box) checks
//! - Multivariate outlier scoring with a seeded isolation forest
//! - Density-based spatial clustering (DBSCAN) backed by an R-tree
//! - Fusion of all flags into a single exportable anomaly set
//!
//! ## Features
//!
//! - **`parallel`** (default) - Parallel per-vehicle processing and concurrent
//!   detector/clusterer stages with rayon
//! - **`cli`** - Build the `fleet-anomaly` command-line tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use fleet_anomaly::{detect_anomalies, DetectionConfig, RawRecord};
//!
//! let raw = vec![
//!     RawRecord::new("bus-1", 0, -3.7300, -38.5400, 30.0, 90.0),
//!     RawRecord::new("bus-1", 60_000, -3.7300, -38.5292, 35.0, 90.0), // ~1.2 km east
//!     RawRecord::new("bus-2", 0, -3.7400, -38.5500, 20.0, 180.0),
//! ];
//!
//! let report = detect_anomalies(&raw, &DetectionConfig::default()).unwrap();
//! let summary = report.anomalies.summary();
//! assert_eq!(summary.jump_anomalies, 1);
//! println!("{} anomalous records", report.anomalies.len());
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{AnomalyError, Result};

// Geographic utilities (geodesic and planar distances)
pub mod geo_utils;

// Stage 1: drop rows outside the GPS domain ranges
pub mod sanitize;
pub use sanitize::{sanitize_records, SanitizeReport};

// Stage 2: service-area check
pub mod region;
pub use region::flag_outside_region;

// Stage 3: per-vehicle trajectories and jump distances
pub mod trajectory;
pub use trajectory::{compute_jump_distances, segment_trajectories, JumpTable, Trajectory};

// Stage 4: feature assembly and standardization
pub mod features;
pub use features::{assemble_features, FeatureVector, StandardScaler, FEATURE_NAMES};

// Stage 5a: isolation forest outlier scoring
pub mod isolation;
pub use isolation::{detect_outliers, outlier_budget, IsolationForest, OutlierResult};

// Stage 5b: DBSCAN spatial clustering
pub mod clustering;
pub use clustering::{dbscan, ClusterResult, NOISE};

// Stage 6: flag fusion and summary
pub mod aggregate;
pub use aggregate::{aggregate, annotate, AnnotatedRecord, AnomalySet, AnomalySummary};

// End-to-end pipeline
pub mod pipeline;
pub use pipeline::{detect_anomalies, detect_anomalies_in, DetectionReport};

// CSV / JSON input and output
pub mod io;

// ============================================================================
// Core Types
// ============================================================================

/// Stable identity of a sanitized record: its index in the sanitizer output.
///
/// Every derived-field table produced by a stage is indexed by this value.
pub type RecordId = usize;

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use fleet_anomaly::GpsPoint;
/// let point = GpsPoint::new(-3.7300, -38.5400); // Fortaleza
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Input columns the pipeline reads but does not interpret.
///
/// Filled by the CSV loader and written back unchanged by the exporter, so an
/// exported row keeps its source timestamp text and any extra columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFields {
    /// The `date_time` cell exactly as read
    pub date_time: Option<String>,
    /// Columns outside the pipeline's input set, as `(header, value)` in input order
    pub extra: Vec<(String, String)>,
}

impl SourceFields {
    /// Value of an extra column by header name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

/// An unvalidated telemetry row as handed over by a loader.
///
/// Every field may be missing. Numeric fields may hold any value, including
/// NaN; only [`sanitize_records`] turns a raw row into a [`GpsRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub vehicle_id: Option<String>,
    /// Unix epoch milliseconds
    pub timestamp: Option<i64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// km/h
    pub speed: Option<f64>,
    /// Heading in degrees
    pub direction: Option<f64>,
    pub source: SourceFields,
}

impl RawRecord {
    /// Create a raw record with every field present.
    pub fn new(
        vehicle_id: &str,
        timestamp: i64,
        lat: f64,
        lng: f64,
        speed: f64,
        direction: f64,
    ) -> Self {
        Self {
            vehicle_id: Some(vehicle_id.to_string()),
            timestamp: Some(timestamp),
            lat: Some(lat),
            lng: Some(lng),
            speed: Some(speed),
            direction: Some(direction),
            source: SourceFields::default(),
        }
    }
}

/// One validated telemetry ping.
///
/// Construct through [`sanitize_records`]; every instance the pipeline sees
/// satisfies [`GpsRecord::is_valid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsRecord {
    pub vehicle_id: String,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    pub direction: f64,
    /// Loader columns passed through to the export
    #[serde(skip)]
    pub source: SourceFields,
}

impl GpsRecord {
    /// Inclusive latitude range in degrees.
    pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);
    /// Inclusive longitude range in degrees.
    pub const LNG_RANGE: (f64, f64) = (-180.0, 180.0);
    /// Inclusive speed range in km/h.
    pub const SPEED_RANGE: (f64, f64) = (0.0, 120.0);
    /// Inclusive heading range in degrees.
    pub const DIRECTION_RANGE: (f64, f64) = (0.0, 360.0);

    /// Check all four raw fields against their domain ranges.
    ///
    /// NaN fails every range, so non-finite values are rejected too.
    pub fn is_valid(&self) -> bool {
        in_range(self.lat, Self::LAT_RANGE)
            && in_range(self.lng, Self::LNG_RANGE)
            && in_range(self.speed, Self::SPEED_RANGE)
            && in_range(self.direction, Self::DIRECTION_RANGE)
    }

    /// Position of this ping.
    #[inline]
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.lat, self.lng)
    }
}

#[inline]
pub(crate) fn in_range(value: f64, (min, max): (f64, f64)) -> bool {
    (min..=max).contains(&value)
}

/// Geographic rectangle describing the expected service area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lng_min: f64, lng_max: f64) -> Self {
        Self { lat_min, lat_max, lng_min, lng_max }
    }

    /// Inclusive containment test.
    #[inline]
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        in_range(lat, (self.lat_min, self.lat_max)) && in_range(lng, (self.lng_min, self.lng_max))
    }
}

impl Default for BoundingBox {
    /// Fortaleza, Brazil.
    fn default() -> Self {
        Self {
            lat_min: -4.0,
            lat_max: -3.6,
            lng_min: -38.7,
            lng_max: -38.4,
        }
    }
}

/// Configuration for the detection pipeline.
///
/// Deserializes from partial JSON: missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Expected service area. Points outside are reported, not fused.
    /// Default: Fortaleza (-4.0..-3.6, -38.7..-38.4)
    pub bounding_box: BoundingBox,

    /// Consecutive-ping distance above which a jump is anomalous.
    /// Default: 1000.0 meters
    pub jump_threshold_m: f64,

    /// Fraction of records flagged as outliers, in (0, 1).
    /// Default: 0.01
    pub contamination: f64,

    /// Seed for the isolation forest.
    /// Default: 42
    pub random_seed: u64,

    /// DBSCAN neighborhood radius in degrees (planar lat/lng distance).
    /// Default: 0.01 (~1.1 km)
    pub dbscan_eps: f64,

    /// Points (including itself) a core point needs within `dbscan_eps`.
    /// Default: 5
    pub dbscan_min_samples: usize,

    /// Number of isolation trees.
    /// Default: 100
    pub n_trees: usize,

    /// Subsample size per isolation tree (capped at the record count).
    /// Default: 256
    pub max_samples: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            bounding_box: BoundingBox::default(),
            jump_threshold_m: 1000.0,
            contamination: 0.01,
            random_seed: 42,
            dbscan_eps: 0.01,
            dbscan_min_samples: 5,
            n_trees: 100,
            max_samples: 256,
        }
    }
}

impl DetectionConfig {
    /// Check every option against its domain.
    ///
    /// Called by the pipeline before any stage runs.
    pub fn validate(&self) -> Result<()> {
        let bbox = &self.bounding_box;
        let bbox_ok = [bbox.lat_min, bbox.lat_max, bbox.lng_min, bbox.lng_max]
            .iter()
            .all(|v| v.is_finite())
            && bbox.lat_min <= bbox.lat_max
            && bbox.lng_min <= bbox.lng_max;
        if !bbox_ok {
            return Err(AnomalyError::invalid_config(
                "bounding_box",
                format!("must be finite with min <= max, got {:?}", bbox),
            ));
        }
        if !(self.jump_threshold_m.is_finite() && self.jump_threshold_m >= 0.0) {
            return Err(AnomalyError::invalid_config(
                "jump_threshold_m",
                format!("must be a non-negative number, got {}", self.jump_threshold_m),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination < 1.0) {
            return Err(AnomalyError::invalid_config(
                "contamination",
                format!("must lie in (0, 1), got {}", self.contamination),
            ));
        }
        if !(self.dbscan_eps.is_finite() && self.dbscan_eps > 0.0) {
            return Err(AnomalyError::invalid_config(
                "dbscan_eps",
                format!("must be positive, got {}", self.dbscan_eps),
            ));
        }
        if self.dbscan_min_samples == 0 {
            return Err(AnomalyError::invalid_config("dbscan_min_samples", "must be at least 1"));
        }
        if self.n_trees == 0 {
            return Err(AnomalyError::invalid_config("n_trees", "must be at least 1"));
        }
        if self.max_samples == 0 {
            return Err(AnomalyError::invalid_config("max_samples", "must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> GpsRecord {
        GpsRecord {
            vehicle_id: "bus-1".to_string(),
            timestamp: 0,
            lat: -3.73,
            lng: -38.54,
            speed: 40.0,
            direction: 90.0,
            source: Default::default(),
        }
    }

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(-3.73, -38.54).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_record_validation_bounds_inclusive() {
        let mut r = sample_record();
        assert!(r.is_valid());

        r.speed = 120.0;
        r.direction = 360.0;
        r.lat = -90.0;
        r.lng = 180.0;
        assert!(r.is_valid());

        r.speed = 120.5;
        assert!(!r.is_valid());
    }

    #[test]
    fn test_record_validation_rejects_nan() {
        let mut r = sample_record();
        r.direction = f64::NAN;
        assert!(!r.is_valid());
    }

    #[test]
    fn test_bounding_box_contains() {
        let bbox = BoundingBox::default();
        assert!(bbox.contains(-3.73, -38.54));
        assert!(bbox.contains(-4.0, -38.4)); // corner is inside
        assert!(!bbox.contains(-4.01, -38.54));
        assert!(!bbox.contains(-3.73, -38.3));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_contamination() {
        for c in [0.0, 1.0, -0.1, f64::NAN] {
            let config = DetectionConfig { contamination: c, ..Default::default() };
            assert!(matches!(
                config.validate(),
                Err(AnomalyError::InvalidConfig { field: "contamination", .. })
            ));
        }
    }

    #[test]
    fn test_config_rejects_inverted_bbox() {
        let config = DetectionConfig {
            bounding_box: BoundingBox::new(-3.6, -4.0, -38.7, -38.4),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_min_samples() {
        let config = DetectionConfig { dbscan_min_samples: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_json() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{ "contamination": 0.05, "random_seed": 7 }"#).unwrap();
        assert_eq!(config.contamination, 0.05);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.jump_threshold_m, 1000.0);
        assert_eq!(config.bounding_box, BoundingBox::default());
    }
}
