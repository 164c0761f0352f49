//! CSV and JSON input/output around the pipeline.
//!
//! Input columns: `date_time`, `bus_id`, `lat`, `lng`, `speed`, `direction`.
//! Any other column is carried through [`SourceFields`] and written back on
//! export. A missing column is fatal; a bad cell (unparseable or not UTF-8)
//! only makes its row fail sanitization later.
//!
//! Output: the anomaly subset with the input columns, the source `date_time`
//! text, every pass-through column, and the derived fields.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::aggregate::{AnnotatedRecord, AnomalySummary};
use crate::{AnomalyError, DetectionConfig, RawRecord, Result, SourceFields};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use log::{debug, info};

/// Columns every input file must have.
pub const REQUIRED_COLUMNS: [&str; 6] = ["date_time", "bus_id", "lat", "lng", "speed", "direction"];

/// Columns appended to every exported row.
pub const DERIVED_COLUMNS: [&str; 5] = [
    "jump_distance_m",
    "jump_anomaly",
    "outlier_flag",
    "bbox_anomaly",
    "cluster_id",
];

/// Naive formats tried after RFC 3339; interpreted as UTC.
const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

// =============================================================================
// Timestamps
// =============================================================================

/// Parse a `date_time` cell into Unix epoch milliseconds.
///
/// Accepts RFC 3339, common naive date-time layouts (taken as UTC), and bare
/// `YYYY-MM-DD` dates. Returns `None` for anything else.
///
/// # Example
/// ```
/// use fleet_anomaly::io::parse_timestamp;
///
/// assert_eq!(parse_timestamp("1970-01-01 00:00:01"), Some(1_000));
/// assert_eq!(parse_timestamp("1970-01-01T00:00:01.5Z"), Some(1_500));
/// assert_eq!(parse_timestamp("yesterday"), None);
/// ```
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Render epoch milliseconds as RFC 3339 UTC (fractional seconds only when non-zero).
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => millis.to_string(),
    }
}

// =============================================================================
// Loading
// =============================================================================

fn parse_number(cell: Option<&str>) -> Option<f64> {
    cell.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
}

fn parse_text(cell: Option<&str>) -> Option<String> {
    cell.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Read raw records from CSV data with a header row.
///
/// Fails with [`AnomalyError::MissingColumn`] if a required column is absent,
/// or [`AnomalyError::Csv`] if the data is not readable CSV. Cells that are
/// empty, unparseable, or not valid UTF-8 become `None`. Columns outside
/// [`REQUIRED_COLUMNS`] are kept in [`SourceFields::extra`].
pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut positions = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| AnomalyError::missing_column(column))?;
    }
    let [time_col, id_col, lat_col, lng_col, speed_col, dir_col] = positions;

    let extra_cols: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !positions.contains(i))
        .collect();

    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row?;
        let cell = |i: usize| row.get(i).and_then(|bytes| std::str::from_utf8(bytes).ok());

        let date_time = parse_text(cell(time_col));
        let extra = extra_cols
            .iter()
            .map(|&(i, name)| {
                let value = row.get(i).map(String::from_utf8_lossy).unwrap_or_default();
                (name.to_string(), value.into_owned())
            })
            .collect();

        records.push(RawRecord {
            vehicle_id: parse_text(cell(id_col)),
            timestamp: date_time.as_deref().and_then(parse_timestamp),
            lat: parse_number(cell(lat_col)),
            lng: parse_number(cell(lng_col)),
            speed: parse_number(cell(speed_col)),
            direction: parse_number(cell(dir_col)),
            source: SourceFields { date_time, extra },
        });
    }

    debug!("[IO] Read {} rows ({} pass-through columns)", records.len(), extra_cols.len());
    Ok(records)
}

/// Load raw records from a CSV file.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_records(BufReader::new(file))?;
    info!("[IO] Loaded {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// Load a [`DetectionConfig`] from a JSON file; absent keys keep defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<DetectionConfig> {
    let file = File::open(path.as_ref())?;
    let config: DetectionConfig = serde_json::from_reader(BufReader::new(file))?;
    Ok(config)
}

// =============================================================================
// Export
// =============================================================================

/// Pass-through column names across `records`, in first-seen order.
///
/// Names that clash with an input or derived column are left out, so a
/// re-exported file gets fresh derived values instead of duplicate columns.
fn pass_through_columns(records: &[AnnotatedRecord]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for r in records {
        for (name, _) in &r.record.source.extra {
            let name = name.as_str();
            if !columns.contains(&name)
                && !REQUIRED_COLUMNS.contains(&name)
                && !DERIVED_COLUMNS.contains(&name)
            {
                columns.push(name);
            }
        }
    }
    columns
}

/// Write annotated records as CSV.
///
/// Header: [`REQUIRED_COLUMNS`], then any pass-through columns, then
/// [`DERIVED_COLUMNS`]. `date_time` is written as read when the record came
/// from a loader and as RFC 3339 otherwise. An empty slice produces a
/// header-only file.
pub fn write_anomalies<W: Write>(writer: W, records: &[AnnotatedRecord]) -> Result<()> {
    let extra_columns = pass_through_columns(records);

    let mut wtr = csv::Writer::from_writer(writer);
    let header = REQUIRED_COLUMNS
        .iter()
        .chain(&extra_columns)
        .chain(DERIVED_COLUMNS.iter());
    wtr.write_record(header)?;

    for r in records {
        let record = &r.record;
        let date_time = match &record.source.date_time {
            Some(text) => text.clone(),
            None => format_timestamp(record.timestamp),
        };

        let mut fields = vec![
            date_time,
            record.vehicle_id.clone(),
            record.lat.to_string(),
            record.lng.to_string(),
            record.speed.to_string(),
            record.direction.to_string(),
        ];
        fields.extend(
            extra_columns
                .iter()
                .map(|column| record.source.get(column).unwrap_or_default().to_string()),
        );
        fields.extend([
            r.jump_distance_m.to_string(),
            r.jump_anomaly.to_string(),
            r.outlier_flag.to_string(),
            r.bbox_anomaly.to_string(),
            r.cluster_id.to_string(),
        ]);
        wtr.write_record(&fields)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write annotated records to a CSV file.
pub fn export_anomalies(path: impl AsRef<Path>, records: &[AnnotatedRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_anomalies(BufWriter::new(file), records)?;
    info!("[IO] Wrote {} anomalies to {}", records.len(), path.display());
    Ok(())
}

/// Write the summary as pretty-printed JSON.
pub fn write_summary<W: Write>(writer: W, summary: &AnomalySummary) -> Result<()> {
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

/// Write the summary to a JSON file.
pub fn export_summary(path: impl AsRef<Path>, summary: &AnomalySummary) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_summary(&mut writer, summary)?;
    writer.flush()?;
    info!("[IO] Wrote summary to {}", path.display());
    Ok(())
}
