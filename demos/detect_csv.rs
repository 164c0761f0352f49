//! Detect anomalies in a CSV export and print the flagged rows.
//!
//! Run with: cargo run --example detect_csv -- demos/data/sample_gps_bus.csv

use fleet_anomaly::{detect_anomalies, io, DetectionConfig};

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/data/sample_gps_bus.csv".to_string());

    let raw = match io::load_records(&path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("failed to load {}: {}", path, e);
            return;
        }
    };

    // Small sample: flag a larger share and accept tiny clusters
    let config = DetectionConfig {
        contamination: 0.1,
        dbscan_min_samples: 3,
        ..Default::default()
    };

    let report = match detect_anomalies(&raw, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("detection failed: {}", e);
            return;
        }
    };

    let summary = report.anomalies.summary();
    println!("Rows: {} ({} dropped)", summary.input_records, summary.dropped_records);
    println!("Jumps > {}m: {}", config.jump_threshold_m, summary.jump_anomalies);
    println!("Isolation Forest anomalies: {}", summary.outlier_anomalies);
    println!("Outside bounding box: {}", summary.bbox_anomalies);
    println!("DBSCAN Clusters: {}\n", summary.clusters);

    for r in report.anomalies.records() {
        println!(
            "Bus {} at {}: speed {:.1} km/h, jump {:.1} m{}{}",
            r.record.vehicle_id,
            io::format_timestamp(r.record.timestamp),
            r.record.speed,
            r.jump_distance_m,
            if r.jump_anomaly { " [jump]" } else { "" },
            if r.outlier_flag { " [outlier]" } else { "" },
        );
    }
}
