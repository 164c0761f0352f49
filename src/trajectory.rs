//! # Trajectory Segmentation and Jump Detection
//!
//! Groups sanitized records into per-vehicle trajectories ordered by time, then
//! measures the geodesic distance between consecutive pings of each vehicle.
//!
//! ## Algorithm
//! 1. Partition record ids by `vehicle_id` (first-appearance order of vehicles)
//! 2. Stable-sort each partition by timestamp, so equal timestamps keep
//!    ingestion order
//! 3. For each trajectory, the first ping gets distance 0; every later ping
//!    gets the distance from its predecessor
//! 4. Scatter the per-trajectory results back into a table indexed by record id
//!
//! Step 3 touches only one vehicle's records, so trajectories are processed in
//! parallel when the `parallel` feature is enabled.

use std::collections::HashMap;

use crate::geo_utils::geodesic_distance;
use crate::{GpsRecord, RecordId};
use log::{debug, info};

/// All record ids of one vehicle, ordered by ascending timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    pub vehicle_id: String,
    pub record_ids: Vec<RecordId>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }
}

/// Derived jump fields, one entry per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JumpTable {
    /// Meters from the previous ping of the same vehicle (0 for the first ping)
    pub distances_m: Vec<f64>,
    /// `distance > threshold`
    pub anomalies: Vec<bool>,
}

impl JumpTable {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|&&a| a).count()
    }
}

/// Partition records by vehicle and order each partition by time.
///
/// Vehicles appear in the order their first record appears in the input.
///
/// # Example
/// ```
/// use fleet_anomaly::{GpsRecord, segment_trajectories};
///
/// let ping = |id: &str, t: i64| GpsRecord {
///     vehicle_id: id.to_string(), timestamp: t,
///     lat: -3.73, lng: -38.54, speed: 20.0, direction: 0.0,
///     source: Default::default(),
/// };
/// let records = vec![ping("a", 20), ping("b", 5), ping("a", 10)];
///
/// let trajectories = segment_trajectories(&records);
/// assert_eq!(trajectories.len(), 2);
/// assert_eq!(trajectories[0].record_ids, vec![2, 0]);
/// assert_eq!(trajectories[1].record_ids, vec![1]);
/// ```
pub fn segment_trajectories(records: &[GpsRecord]) -> Vec<Trajectory> {
    let mut slot_by_vehicle: HashMap<&str, usize> = HashMap::new();
    let mut trajectories: Vec<Trajectory> = Vec::new();

    for (id, record) in records.iter().enumerate() {
        let slot = *slot_by_vehicle.entry(record.vehicle_id.as_str()).or_insert_with(|| {
            trajectories.push(Trajectory {
                vehicle_id: record.vehicle_id.clone(),
                record_ids: Vec::new(),
            });
            trajectories.len() - 1
        });
        trajectories[slot].record_ids.push(id);
    }

    // Ids were pushed in ascending order, and sort_by_key is stable
    for trajectory in &mut trajectories {
        trajectory.record_ids.sort_by_key(|&id| records[id].timestamp);
    }

    debug!(
        "[Trajectory] Segmented {} records into {} trajectories",
        records.len(),
        trajectories.len()
    );

    trajectories
}

/// Compute consecutive-ping distances and jump flags for every trajectory.
///
/// Every record must belong to exactly one of `trajectories`, as produced by
/// [`segment_trajectories`] on the same `records`.
pub fn compute_jump_distances(
    records: &[GpsRecord],
    trajectories: &[Trajectory],
    threshold_m: f64,
) -> JumpTable {
    let start = std::time::Instant::now();

    #[cfg(feature = "parallel")]
    let per_trajectory: Vec<Vec<(RecordId, f64)>> = {
        use rayon::prelude::*;
        trajectories
            .par_iter()
            .map(|t| trajectory_jumps(records, t))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let per_trajectory: Vec<Vec<(RecordId, f64)>> = trajectories
        .iter()
        .map(|t| trajectory_jumps(records, t))
        .collect();

    let mut table = JumpTable {
        distances_m: vec![0.0; records.len()],
        anomalies: vec![false; records.len()],
    };
    for (id, distance) in per_trajectory.into_iter().flatten() {
        table.distances_m[id] = distance;
        table.anomalies[id] = distance > threshold_m;
    }

    info!(
        "[Trajectory] {} jumps > {}m across {} trajectories in {}ms",
        table.anomaly_count(),
        threshold_m,
        trajectories.len(),
        start.elapsed().as_millis()
    );

    table
}

/// Distances for one trajectory, in trajectory order.
fn trajectory_jumps(records: &[GpsRecord], trajectory: &Trajectory) -> Vec<(RecordId, f64)> {
    let ids = &trajectory.record_ids;
    let mut jumps = Vec::with_capacity(ids.len());

    if let Some(&first) = ids.first() {
        jumps.push((first, 0.0));
    }
    jumps.extend(ids.windows(2).map(|w| {
        let prev = records[w[0]].point();
        let curr = records[w[1]].point();
        (w[1], geodesic_distance(&prev, &curr))
    }));

    jumps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(vehicle: &str, timestamp: i64, lat: f64, lng: f64) -> GpsRecord {
        GpsRecord {
            vehicle_id: vehicle.to_string(),
            timestamp,
            lat,
            lng,
            speed: 30.0,
            direction: 90.0,
            source: Default::default(),
        }
    }

    #[test]
    fn test_segment_orders_by_timestamp() {
        let records = vec![
            ping("a", 30, -3.73, -38.54),
            ping("a", 10, -3.73, -38.54),
            ping("a", 20, -3.73, -38.54),
        ];
        let trajectories = segment_trajectories(&records);
        assert_eq!(trajectories.len(), 1);
        assert_eq!(trajectories[0].vehicle_id, "a");
        assert_eq!(trajectories[0].record_ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_segment_ties_keep_ingestion_order() {
        let records = vec![
            ping("a", 10, -3.73, -38.54),
            ping("b", 10, -3.73, -38.54),
            ping("a", 5, -3.73, -38.54),
            ping("a", 10, -3.74, -38.54),
        ];
        let trajectories = segment_trajectories(&records);
        assert_eq!(trajectories[0].record_ids, vec![2, 0, 3]);
        assert_eq!(trajectories[1].record_ids, vec![1]);
    }

    #[test]
    fn test_first_ping_has_zero_jump() {
        let records = vec![
            ping("a", 2, -3.73, -38.5292),
            ping("a", 1, -3.73, -38.54),
        ];
        let trajectories = segment_trajectories(&records);
        let table = compute_jump_distances(&records, &trajectories, 1000.0);

        // Record 1 is first by time
        assert_eq!(table.distances_m[1], 0.0);
        assert!(!table.anomalies[1]);
        assert!(table.distances_m[0] > 1000.0);
        assert!(table.anomalies[0]);
    }

    #[test]
    fn test_jump_threshold() {
        // ~1200m then ~500m east
        let records = vec![
            ping("a", 0, -3.73, -38.54),
            ping("a", 1, -3.73, -38.5292),
            ping("a", 2, -3.73, -38.5247),
        ];
        let trajectories = segment_trajectories(&records);
        let table = compute_jump_distances(&records, &trajectories, 1000.0);
        assert_eq!(table.anomalies, vec![false, true, false]);
        assert_eq!(table.anomaly_count(), 1);
        assert!((table.distances_m[2] - 500.0).abs() < 5.0);
    }

    #[test]
    fn test_single_ping_trajectory() {
        let records = vec![ping("solo", 0, -3.73, -38.54)];
        let trajectories = segment_trajectories(&records);
        let table = compute_jump_distances(&records, &trajectories, 0.0);
        assert_eq!(table.distances_m, vec![0.0]);
        assert_eq!(table.anomalies, vec![false]);
    }

    #[test]
    fn test_vehicles_do_not_interact() {
        // Interleaved vehicles far apart: no cross-vehicle jumps
        let records = vec![
            ping("a", 0, -3.73, -38.54),
            ping("b", 0, -3.90, -38.60),
            ping("a", 1, -3.7301, -38.54),
            ping("b", 1, -3.9001, -38.60),
        ];
        let trajectories = segment_trajectories(&records);
        let table = compute_jump_distances(&records, &trajectories, 1000.0);
        assert_eq!(table.anomaly_count(), 0);
        assert!(table.distances_m.iter().all(|&d| d < 20.0));
    }

    #[test]
    fn test_empty() {
        let trajectories = segment_trajectories(&[]);
        assert!(trajectories.is_empty());
        let table = compute_jump_distances(&[], &trajectories, 1000.0);
        assert_eq!(table, JumpTable::default());
    }
}
