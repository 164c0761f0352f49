//! fleet-anomaly CLI - flag anomalous GPS pings in a bus fleet export
//!
//! Usage:
//!   fleet-anomaly <input.csv> [--output anomalies.csv] [--summary summary.json]
//!                 [--config config.json] [--jump-threshold M] [--contamination C]
//!                 [--seed S] [--eps DEG] [--min-samples N] [--trees N]
//!                 [--bbox LAT_MIN,LAT_MAX,LNG_MIN,LNG_MAX] [-v]
//!
//! Options given on the command line override the config file, which
//! overrides the built-in defaults.

use clap::Parser;
use fleet_anomaly::{detect_anomalies, io, AnomalySummary, BoundingBox, DetectionConfig};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fleet-anomaly")]
#[command(about = "Detect anomalous GPS pings in bus fleet telemetry", long_about = None)]
struct Cli {
    /// CSV file with date_time, bus_id, lat, lng, speed, direction columns
    input: PathBuf,

    /// Where to write the anomaly subset (CSV)
    #[arg(short, long, default_value = "anomalies_detected.csv")]
    output: PathBuf,

    /// Also write the summary counts as JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    /// JSON file with detection options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Jump distance threshold in meters
    #[arg(long)]
    jump_threshold: Option<f64>,

    /// Fraction of records flagged by the isolation forest
    #[arg(long)]
    contamination: Option<f64>,

    /// Random seed for the isolation forest
    #[arg(long)]
    seed: Option<u64>,

    /// DBSCAN radius in degrees
    #[arg(long)]
    eps: Option<f64>,

    /// DBSCAN minimum neighborhood size
    #[arg(long)]
    min_samples: Option<usize>,

    /// Number of isolation trees
    #[arg(long)]
    trees: Option<usize>,

    /// Service area as LAT_MIN,LAT_MAX,LNG_MIN,LNG_MAX
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Enable verbose debug output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p.trim(), e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [lat_min, lat_max, lng_min, lng_max] => Ok(BoundingBox::new(*lat_min, *lat_max, *lng_min, *lng_max)),
        _ => Err(format!("expected 4 comma-separated numbers, got {}", parts.len())),
    }
}

impl Cli {
    fn detection_config(&self) -> fleet_anomaly::Result<DetectionConfig> {
        let mut config = match &self.config {
            Some(path) => io::load_config(path)?,
            None => DetectionConfig::default(),
        };

        if let Some(v) = self.jump_threshold {
            config.jump_threshold_m = v;
        }
        if let Some(v) = self.contamination {
            config.contamination = v;
        }
        if let Some(v) = self.seed {
            config.random_seed = v;
        }
        if let Some(v) = self.eps {
            config.dbscan_eps = v;
        }
        if let Some(v) = self.min_samples {
            config.dbscan_min_samples = v;
        }
        if let Some(v) = self.trees {
            config.n_trees = v;
        }
        if let Some(v) = self.bbox {
            config.bounding_box = v;
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> fleet_anomaly::Result<()> {
    let config = cli.detection_config()?;
    let raw = io::load_records(&cli.input)?;
    let report = detect_anomalies(&raw, &config)?;

    print_summary(report.anomalies.summary(), &config);

    io::export_anomalies(&cli.output, report.anomalies.records())?;
    println!("Anomalies saved to {}", cli.output.display());

    if let Some(path) = &cli.summary {
        io::export_summary(path, report.anomalies.summary())?;
        println!("Summary saved to {}", path.display());
    }

    Ok(())
}

fn print_summary(summary: &AnomalySummary, config: &DetectionConfig) {
    println!("\n{}", "=".repeat(60));
    println!(
        "Records: {} read, {} kept, {} dropped ({} vehicles)",
        summary.input_records, summary.kept_records, summary.dropped_records, summary.vehicles
    );
    println!("Jumps > {}m: {}", config.jump_threshold_m, summary.jump_anomalies);
    println!("Isolation Forest anomalies: {}", summary.outlier_anomalies);
    println!("Outside bounding box: {}", summary.bbox_anomalies);
    println!("DBSCAN Clusters: {}", summary.clusters);
    println!("Fused anomalies (jump or outlier): {}", summary.fused_anomalies);
    println!("{}\n", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("-4.0,-3.6,-38.7,-38.4").unwrap();
        assert_eq!(bbox, BoundingBox::default());
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("1,2,x,4").is_err());
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "fleet-anomaly",
            "data.csv",
            "--contamination",
            "0.05",
            "--bbox",
            "-4.0,-3.5,-39.0,-38.0",
        ]);
        let config = cli.detection_config().unwrap();
        assert_eq!(config.contamination, 0.05);
        assert_eq!(config.bounding_box.lat_max, -3.5);
        assert_eq!(config.jump_threshold_m, 1000.0);
    }
}
