//! Record sanitization.
//!
//! Drops raw rows with a missing field or a value outside its GPS domain range.
//! Rows are never repaired; survivors keep their original relative order.

use crate::{GpsRecord, RawRecord};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Counts reported by [`sanitize_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub input: usize,
    pub kept: usize,
    pub dropped: usize,
}

impl RawRecord {
    /// Convert into a [`GpsRecord`] if every field is present and in range.
    pub fn validate(&self) -> Option<GpsRecord> {
        let record = GpsRecord {
            vehicle_id: self.vehicle_id.clone()?,
            timestamp: self.timestamp?,
            lat: self.lat?,
            lng: self.lng?,
            speed: self.speed?,
            direction: self.direction?,
            source: self.source.clone(),
        };
        record.is_valid().then_some(record)
    }
}

/// Validate raw rows, returning the survivors in input order plus drop counts.
///
/// Never fails: an empty result is valid output.
pub fn sanitize_records(raw: &[RawRecord]) -> (Vec<GpsRecord>, SanitizeReport) {
    let records: Vec<GpsRecord> = raw.iter().filter_map(RawRecord::validate).collect();

    let report = SanitizeReport {
        input: raw.len(),
        kept: records.len(),
        dropped: raw.len() - records.len(),
    };

    info!(
        "[Sanitize] Kept {} of {} records ({} dropped)",
        report.kept, report.input, report.dropped
    );
    if report.dropped > 0 {
        debug!("[Sanitize] Dropped rows had a missing field or an out-of-range value");
    }

    (records, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RawRecord {
        RawRecord::new("bus-1", 1_000, -3.73, -38.54, 40.0, 90.0)
    }

    #[test]
    fn test_keeps_valid_records_in_order() {
        let raw = vec![
            RawRecord::new("a", 3, -3.70, -38.50, 10.0, 10.0),
            RawRecord::new("b", 1, -3.71, -38.51, 20.0, 20.0),
            RawRecord::new("c", 2, -3.72, -38.52, 30.0, 30.0),
        ];
        let (records, report) = sanitize_records(&raw);
        let ids: Vec<&str> = records.iter().map(|r| r.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(report, SanitizeReport { input: 3, kept: 3, dropped: 0 });
    }

    #[test]
    fn test_drops_missing_fields() {
        let mut no_speed = valid();
        no_speed.speed = None;
        let mut no_id = valid();
        no_id.vehicle_id = None;
        let mut no_time = valid();
        no_time.timestamp = None;

        let (records, report) = sanitize_records(&[no_speed, valid(), no_id, no_time]);
        assert_eq!(records.len(), 1);
        assert_eq!(report.dropped, 3);
    }

    #[test]
    fn test_drops_out_of_range_values() {
        let mut bad_lat = valid();
        bad_lat.lat = Some(90.5);
        let mut bad_lng = valid();
        bad_lng.lng = Some(-180.1);
        let mut bad_speed = valid();
        bad_speed.speed = Some(-1.0);
        let mut fast = valid();
        fast.speed = Some(121.0);
        let mut bad_dir = valid();
        bad_dir.direction = Some(361.0);
        let mut nan = valid();
        nan.lat = Some(f64::NAN);

        let (records, report) =
            sanitize_records(&[bad_lat, bad_lng, bad_speed, fast, bad_dir, nan]);
        assert!(records.is_empty());
        assert_eq!(report, SanitizeReport { input: 6, kept: 0, dropped: 6 });
    }

    #[test]
    fn test_survivors_satisfy_ranges() {
        let raw: Vec<RawRecord> = (0..50)
            .map(|i| {
                let x = i as f64;
                RawRecord::new("bus", i, x * 4.0 - 100.0, x * 8.0 - 200.0, x * 3.0 - 10.0, x * 9.0 - 20.0)
            })
            .collect();
        let (records, _) = sanitize_records(&raw);
        assert!(!records.is_empty());
        for r in &records {
            assert!((-90.0..=90.0).contains(&r.lat));
            assert!((-180.0..=180.0).contains(&r.lng));
            assert!((0.0..=120.0).contains(&r.speed));
            assert!((0.0..=360.0).contains(&r.direction));
        }
    }

    #[test]
    fn test_empty_input() {
        let (records, report) = sanitize_records(&[]);
        assert!(records.is_empty());
        assert_eq!(report, SanitizeReport::default());
    }
}
