//! Flag fusion and summary.
//!
//! Joins every derived-field table onto its records, applies the fused
//! decision `anomaly = jump_anomaly || outlier_flag`, and counts. The region
//! flag and cluster label are carried through for reporting only.

use std::collections::HashSet;

use crate::clustering::{ClusterResult, NOISE};
use crate::isolation::OutlierResult;
use crate::sanitize::SanitizeReport;
use crate::trajectory::JumpTable;
use crate::GpsRecord;
use serde::{Deserialize, Serialize};

/// A record joined with all of its derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    #[serde(flatten)]
    pub record: GpsRecord,
    pub jump_distance_m: f64,
    pub jump_anomaly: bool,
    pub outlier_flag: bool,
    pub bbox_anomaly: bool,
    pub cluster_id: i32,
}

impl AnnotatedRecord {
    /// The fused decision. The region flag is deliberately left out.
    #[inline]
    pub fn is_anomaly(&self) -> bool {
        self.jump_anomaly || self.outlier_flag
    }
}

/// Aggregate counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub input_records: usize,
    pub kept_records: usize,
    pub dropped_records: usize,
    pub vehicles: usize,
    pub jump_anomalies: usize,
    pub outlier_anomalies: usize,
    pub bbox_anomalies: usize,
    /// Distinct cluster labels, noise excluded
    pub clusters: usize,
    /// Records where `jump_anomaly || outlier_flag`
    pub fused_anomalies: usize,
}

/// The anomalous subset of one run plus its summary. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalySet {
    records: Vec<AnnotatedRecord>,
    summary: AnomalySummary,
}

impl AnomalySet {
    /// Anomalous records, in sanitized input order.
    pub fn records(&self) -> &[AnnotatedRecord] {
        &self.records
    }

    pub fn summary(&self) -> &AnomalySummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<AnnotatedRecord> {
        self.records
    }
}

/// Join derived-field tables onto their records by record id.
///
/// Every table must hold exactly one entry per record.
pub fn annotate(
    records: &[GpsRecord],
    jumps: &JumpTable,
    outside_region: &[bool],
    outliers: &OutlierResult,
    clusters: &ClusterResult,
) -> Vec<AnnotatedRecord> {
    debug_assert_eq!(records.len(), jumps.distances_m.len());
    debug_assert_eq!(records.len(), outside_region.len());
    debug_assert_eq!(records.len(), outliers.flags.len());
    debug_assert_eq!(records.len(), clusters.labels.len());

    records
        .iter()
        .enumerate()
        .map(|(id, record)| AnnotatedRecord {
            record: record.clone(),
            jump_distance_m: jumps.distances_m[id],
            jump_anomaly: jumps.anomalies[id],
            outlier_flag: outliers.flags[id],
            bbox_anomaly: outside_region[id],
            cluster_id: clusters.labels[id],
        })
        .collect()
}

/// Build the anomaly set and summary counts from annotated records.
pub fn aggregate(annotated: &[AnnotatedRecord], sanitize: &SanitizeReport) -> AnomalySet {
    let count = |pred: fn(&AnnotatedRecord) -> bool| annotated.iter().filter(|r| pred(r)).count();

    let clusters: HashSet<i32> = annotated
        .iter()
        .map(|r| r.cluster_id)
        .filter(|&c| c != NOISE)
        .collect();
    let vehicles: HashSet<&str> = annotated.iter().map(|r| r.record.vehicle_id.as_str()).collect();

    let records: Vec<AnnotatedRecord> = annotated.iter().filter(|r| r.is_anomaly()).cloned().collect();

    let summary = AnomalySummary {
        input_records: sanitize.input,
        kept_records: sanitize.kept,
        dropped_records: sanitize.dropped,
        vehicles: vehicles.len(),
        jump_anomalies: count(|r| r.jump_anomaly),
        outlier_anomalies: count(|r| r.outlier_flag),
        bbox_anomalies: count(|r| r.bbox_anomaly),
        clusters: clusters.len(),
        fused_anomalies: records.len(),
    };

    AnomalySet { records, summary }
}
