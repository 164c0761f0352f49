//! Run the detector on a synthetic fleet with injected faults.
//!
//! Run with: cargo run --example synthetic_fleet

use fleet_anomaly::{detect_anomalies, DetectionConfig, RawRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

fn main() {
    println!("Synthetic Fleet Example\n");

    let mut rng = StdRng::seed_from_u64(7);
    let mut raw = Vec::new();

    // 20 buses, 120 pings each, one ping a minute, drifting ~150m per ping
    for bus in 0..20 {
        let mut lat = rng.gen_range(-3.85..-3.70);
        let mut lng = rng.gen_range(-38.60..-38.45);
        let heading: f64 = rng.gen_range(0.0..360.0);

        for step in 0..120 {
            lat += heading.to_radians().cos() * 0.0013 + rng.gen_range(-0.0002..0.0002);
            lng += heading.to_radians().sin() * 0.0013 + rng.gen_range(-0.0002..0.0002);
            raw.push(RawRecord::new(
                &format!("bus-{:02}", bus),
                step * 60_000,
                lat,
                lng,
                rng.gen_range(15.0..55.0),
                heading,
            ));
        }
    }

    // GPS teleport: one ping 5km off course
    raw[500].lat = raw[500].lat.map(|v| v + 0.045);
    // Out of service area
    raw[900].lng = Some(-38.2);
    // Invalid rows the sanitizer must drop
    raw[100].speed = Some(250.0);
    raw[200].direction = None;

    let config = DetectionConfig::default();
    let start = Instant::now();
    let report = match detect_anomalies(&raw, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("detection failed: {}", e);
            return;
        }
    };
    let elapsed = start.elapsed();

    let summary = report.anomalies.summary();
    println!("Processed {} rows in {:?}", raw.len(), elapsed);
    println!("  dropped:          {}", summary.dropped_records);
    println!("  jumps > {}m:    {}", config.jump_threshold_m, summary.jump_anomalies);
    println!("  outliers:         {}", summary.outlier_anomalies);
    println!("  outside region:   {}", summary.bbox_anomalies);
    println!("  clusters:         {}", summary.clusters);
    println!("  fused anomalies:  {}\n", summary.fused_anomalies);

    println!("First anomalies:");
    for r in report.anomalies.records().iter().take(10) {
        println!(
            "  {} t={}s jump={:.0}m outlier={} cluster={}",
            r.record.vehicle_id,
            r.record.timestamp / 1000,
            r.jump_distance_m,
            r.outlier_flag,
            r.cluster_id
        );
    }
}
