//! # Detection Pipeline
//!
//! Runs every stage over one closed batch:
//!
//! ```text
//! raw rows -> sanitize -> segment -> { jump distances, region check }
//!          -> features -> { isolation forest, DBSCAN } -> fuse -> AnomalySet
//! ```
//!
//! Each stage reads an immutable slice and returns a new table indexed by
//! record id. The isolation forest and DBSCAN only share read access to the
//! assembled inputs, so with the `parallel` feature they run side by side.

use crate::aggregate::{aggregate, annotate, AnnotatedRecord, AnomalySet};
use crate::clustering::{dbscan, ClusterResult};
use crate::features::assemble_features;
use crate::isolation::{detect_outliers, OutlierResult};
use crate::region::flag_outside_region;
use crate::sanitize::{sanitize_records, SanitizeReport};
use crate::trajectory::{compute_jump_distances, segment_trajectories};
use crate::{DetectionConfig, GpsPoint, GpsRecord, RawRecord, Result};
use log::info;

/// Everything one run produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    pub sanitize: SanitizeReport,
    /// Every surviving record with its derived fields, in sanitized order
    pub annotated: Vec<AnnotatedRecord>,
    /// The fused anomaly subset and summary
    pub anomalies: AnomalySet,
}

/// Sanitize `raw` rows and run the full pipeline.
///
/// Fails only on an invalid configuration; bad rows are dropped and counted.
pub fn detect_anomalies(raw: &[RawRecord], config: &DetectionConfig) -> Result<DetectionReport> {
    config.validate()?;
    let (records, sanitize) = sanitize_records(raw);
    Ok(run_stages(&records, sanitize, config))
}

/// Run the pipeline on already-validated records.
///
/// Records failing [`GpsRecord::is_valid`] are dropped first, so the range
/// invariant holds for every stage.
pub fn detect_anomalies_in(records: Vec<GpsRecord>, config: &DetectionConfig) -> Result<DetectionReport> {
    config.validate()?;
    let input = records.len();
    let records: Vec<GpsRecord> = records.into_iter().filter(GpsRecord::is_valid).collect();
    let sanitize = SanitizeReport {
        input,
        kept: records.len(),
        dropped: input - records.len(),
    };
    Ok(run_stages(&records, sanitize, config))
}

fn run_stages(records: &[GpsRecord], sanitize: SanitizeReport, config: &DetectionConfig) -> DetectionReport {
    let start = std::time::Instant::now();
    info!("[Pipeline] Running on {} records", records.len());

    let trajectories = segment_trajectories(records);
    let jumps = compute_jump_distances(records, &trajectories, config.jump_threshold_m);
    let outside_region = flag_outside_region(records, &config.bounding_box);

    let features = assemble_features(records, &jumps);
    let points: Vec<GpsPoint> = records.iter().map(GpsRecord::point).collect();

    let (outliers, clusters) = score_and_cluster(&features, &points, config);

    let annotated = annotate(records, &jumps, &outside_region, &outliers, &clusters);
    let anomalies = aggregate(&annotated, &sanitize);

    let summary = anomalies.summary();
    info!(
        "[Pipeline] {} anomalies ({} jumps, {} outliers), {} outside region, {} clusters, {} vehicles in {}ms",
        summary.fused_anomalies,
        summary.jump_anomalies,
        summary.outlier_anomalies,
        summary.bbox_anomalies,
        summary.clusters,
        summary.vehicles,
        start.elapsed().as_millis()
    );

    DetectionReport { sanitize, annotated, anomalies }
}

#[cfg(feature = "parallel")]
fn score_and_cluster(
    features: &[crate::FeatureVector],
    points: &[GpsPoint],
    config: &DetectionConfig,
) -> (OutlierResult, ClusterResult) {
    rayon::join(
        || detect_outliers(features, config),
        || dbscan(points, config.dbscan_eps, config.dbscan_min_samples),
    )
}

#[cfg(not(feature = "parallel"))]
fn score_and_cluster(
    features: &[crate::FeatureVector],
    points: &[GpsPoint],
    config: &DetectionConfig,
) -> (OutlierResult, ClusterResult) {
    (
        detect_outliers(features, config),
        dbscan(points, config.dbscan_eps, config.dbscan_min_samples),
    )
}
