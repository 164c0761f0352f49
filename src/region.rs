//! Service-area check.
//!
//! The resulting flag is informational: it is counted in the summary and
//! exported, but never fused into the anomaly decision.

use crate::{BoundingBox, GpsRecord};

/// Flag every record lying outside `bbox` (bounds inclusive).
///
/// Returns one flag per record, indexed by [`crate::RecordId`].
pub fn flag_outside_region(records: &[GpsRecord], bbox: &BoundingBox) -> Vec<bool> {
    records.iter().map(|r| !bbox.contains(r.lat, r.lng)).collect()
}
