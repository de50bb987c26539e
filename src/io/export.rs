//! CSV export of the daily enclosure table and the outliers table.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::energy::types::DailyEnclosureRecord;
use crate::error::{PipelineError, Result};
use crate::reporting::outliers::OutlierRow;

/// Column header of the daily table.
pub const DAILY_HEADER: [&str; 4] = ["day", "enclosure_id", "charged_kwh", "discharged_kwh"];

/// Column header of the outliers table.
pub const OUTLIERS_HEADER: [&str; 4] = [
    "metric",
    "enclosure_id",
    "total_charged_kwh",
    "total_discharged_kwh",
];

fn create(path: &Path) -> Result<io::BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::write(path, e))?;
    Ok(io::BufWriter::new(file))
}

/// Writes the daily table to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`PipelineError::Write`] if the file cannot be created, or a
/// CSV error if writing fails.
pub fn export_daily_csv(records: &[DailyEnclosureRecord], path: &Path) -> Result<()> {
    write_daily_csv(records, create(path)?)
}

/// Writes the daily table as CSV to any writer.
///
/// Days are ISO dates; energies use the shortest representation that reads
/// back to the same `f64`.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_daily_csv(records: &[DailyEnclosureRecord], writer: impl Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(DAILY_HEADER)?;
    for r in records {
        wtr.write_record(&[
            r.day.format("%Y-%m-%d").to_string(),
            r.enclosure_id.clone(),
            r.charged_kwh.to_string(),
            r.discharged_kwh.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads a daily table written by [`write_daily_csv`].
///
/// # Errors
///
/// Returns a CSV error on malformed rows.
pub fn read_daily_csv(reader: impl Read) -> Result<Vec<DailyEnclosureRecord>> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let records = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<DailyEnclosureRecord>, csv::Error>>()?;
    Ok(records)
}

/// Writes the outliers table to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`PipelineError::Write`] if the file cannot be created, or a
/// CSV error if writing fails.
pub fn export_outliers_csv(rows: &[OutlierRow], path: &Path) -> Result<()> {
    write_outliers_csv(rows, create(path)?)
}

/// Writes the outliers table as CSV to any writer.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_outliers_csv(rows: &[OutlierRow], writer: impl Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(OUTLIERS_HEADER)?;
    for r in rows {
        wtr.write_record(&[
            r.metric.as_str().to_string(),
            r.enclosure_id.clone(),
            r.total_charged_kwh.to_string(),
            r.total_discharged_kwh.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::outliers::OutlierMetric;
    use chrono::NaiveDate;

    fn make_record(d: u32, n: u32) -> DailyEnclosureRecord {
        DailyEnclosureRecord {
            day: NaiveDate::from_ymd_opt(2024, 6, d).unwrap_or_default(),
            enclosure_id: format!("1A1BAT{n}"),
            charged_kwh: 0.1 * f64::from(n),
            discharged_kwh: 12.345_678_9 / f64::from(n),
        }
    }

    #[test]
    fn header_matches_daily_schema() {
        let mut buf = Vec::new();
        write_daily_csv(&[make_record(1, 1)], &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let first_line = output.as_deref().unwrap_or("").lines().next().unwrap_or("");
        assert_eq!(first_line, "day,enclosure_id,charged_kwh,discharged_kwh");
    }

    #[test]
    fn row_count_matches_record_count() {
        let records: Vec<_> = (1..=6).map(|n| make_record(1, n)).collect();
        let mut buf = Vec::new();
        write_daily_csv(&records, &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let lines: Vec<&str> = output.as_deref().unwrap_or("").lines().collect();
        // 1 header + 6 data rows
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn day_is_iso_date() {
        let mut buf = Vec::new();
        write_daily_csv(&[make_record(9, 2)], &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let row = output.as_deref().unwrap_or("").lines().nth(1).unwrap_or("");
        assert!(row.starts_with("2024-06-09,1A1BAT2,"), "{row}");
    }

    #[test]
    fn deterministic_output() {
        let records: Vec<_> = (1..=3).map(|n| make_record(2, n)).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_daily_csv(&records, &mut buf1).ok();
        write_daily_csv(&records, &mut buf2).ok();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn round_trip_preserves_keys_and_values() {
        let records: Vec<_> = (1..=3)
            .flat_map(|d| (1..=4).map(move |n| make_record(d, n)))
            .collect();
        let mut buf = Vec::new();
        write_daily_csv(&records, &mut buf).ok();

        let back = read_daily_csv(buf.as_slice());
        assert_eq!(back.ok(), Some(records));
    }

    #[test]
    fn export_creates_parent_directories() {
        let dir = tempfile::tempdir().ok();
        let Some(dir) = dir else {
            panic!("tempdir should be creatable");
        };
        let path = dir.path().join("nested/out/daily.csv");
        assert!(export_daily_csv(&[make_record(1, 1)], &path).is_ok());
        assert!(path.is_file());
    }

    #[test]
    fn unwritable_target_names_the_path() {
        let dir = tempfile::tempdir().ok();
        let Some(dir) = dir else {
            panic!("tempdir should be creatable");
        };
        // A directory where the file should go.
        let path = dir.path().join("daily.csv");
        assert!(fs::create_dir(&path).is_ok());
        match export_daily_csv(&[make_record(1, 1)], &path) {
            Err(PipelineError::Write { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected write error, got {other:?}"),
        }
    }

    #[test]
    fn outliers_header_and_metric_tags() {
        let rows = vec![
            OutlierRow {
                metric: OutlierMetric::LowestCharged,
                enclosure_id: "1A1BAT1".to_string(),
                total_charged_kwh: 1.0,
                total_discharged_kwh: 2.0,
            },
            OutlierRow {
                metric: OutlierMetric::LowestDischarged,
                enclosure_id: "1A1BAT2".to_string(),
                total_charged_kwh: 3.0,
                total_discharged_kwh: 0.5,
            },
        ];
        let mut buf = Vec::new();
        write_outliers_csv(&rows, &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let lines: Vec<&str> = output.as_deref().unwrap_or("").lines().collect();
        assert_eq!(
            lines,
            vec![
                "metric,enclosure_id,total_charged_kwh,total_discharged_kwh",
                "lowest_charged,1A1BAT1,1,2",
                "lowest_discharged,1A1BAT2,3,0.5",
            ]
        );
    }
}
