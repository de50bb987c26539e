//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};

use bess_energy::config::AppConfig;
use bess_energy::energy::types::DailyEnclosureRecord;

/// Power columns such as `1APCS1.DC2.Power`.
pub const POWER_REGEX: &str = r"^(?P<inv>\d[AB]PCS\d+)\.DC(?P<input>[12])\.Power$";
/// Enclosure ids such as `1A1BAT3`, anywhere in a column name.
pub const ENCLOSURE_REGEX: &str = r"(?P<eid>\d[AB]\dBAT\d+)";

/// Absolute tolerance for energy comparisons (kWh).
pub const TOLERANCE: f64 = 1e-9;

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < TOLERANCE,
        "expected {expected}, got {actual}"
    );
}

/// Config TOML reading `data_glob` and writing into `out_dir`.
pub fn config_toml(data_glob: &str, out_dir: &Path, timezone: &str) -> String {
    format!(
        r#"
[data]
paths = ["{data}"]

[parsing]
timestamp_col = "Timestamp"
timezone = "{timezone}"

[power]
dc_input_power_regex = '{POWER_REGEX}'

[allocation]
battery_system_regex = '{ENCLOSURE_REGEX}'
split_6 = [3, 3]
split_4 = [2, 2]

[output]
dir = "{out}"
daily_table_file = "daily_enclosure_energy.csv"
outliers_file = "outliers.csv"
heatmap_file = "discharged_heatmap.svg"
"#,
        data = data_glob.replace('\\', "/"),
        out = out_dir.display().to_string().replace('\\', "/"),
    )
}

/// Parsed default config over `data_glob` (timezone `Europe/Oslo`).
pub fn app_config(data_glob: &str, out_dir: &Path) -> AppConfig {
    AppConfig::from_toml_str(&config_toml(data_glob, out_dir, "Europe/Oslo"))
        .expect("fixture config should parse")
}

/// `count` naive timestamps `step_minutes` apart, starting at `start`.
pub fn timestamps(start: &str, count: usize, step_minutes: i64) -> Vec<String> {
    let start = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S")
        .expect("fixture start should parse");
    (0..count)
        .map(|i| {
            (start + Duration::minutes(step_minutes * i as i64))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .collect()
}

/// Builder for a wide telemetry CSV.
#[derive(Debug, Clone, Default)]
pub struct WideCsv {
    columns: Vec<(String, Vec<String>)>,
}

impl WideCsv {
    pub fn new(timestamps: Vec<String>) -> Self {
        Self {
            columns: vec![("Timestamp".to_string(), timestamps)],
        }
    }

    fn rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, v)| v.len())
    }

    /// Power column with one value per timestamp.
    pub fn power(mut self, name: &str, values: impl IntoIterator<Item = f64>) -> Self {
        let cells: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        assert_eq!(cells.len(), self.rows(), "column {name} length");
        self.columns.push((name.to_string(), cells));
        self
    }

    /// Power column holding `kw` at every timestamp.
    pub fn constant(self, name: &str, kw: f64) -> Self {
        let n = self.rows();
        self.power(name, std::iter::repeat_n(kw, n))
    }

    /// Metadata-only `<id>.SOC` columns for each enclosure id.
    pub fn enclosures<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        let n = self.rows();
        for id in ids {
            self.columns.push((format!("{id}.SOC"), vec!["50".to_string(); n]));
        }
        self
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<&str> = self.columns.iter().map(|(n, _)| n.as_str()).collect();
        let _ = writeln!(out, "{}", header.join(","));
        for row in 0..self.rows() {
            let cells: Vec<&str> = self.columns.iter().map(|(_, v)| v[row].as_str()).collect();
            let _ = writeln!(out, "{}", cells.join(","));
        }
        out
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("fixture dir should be creatable");
        }
        fs::write(path, self.to_csv()).expect("fixture csv should be writable");
        path.to_path_buf()
    }
}

/// `1A1BAT1` .. `1A1BAT<n>` for `group`.
pub fn enclosure_ids(group: &str, n: u32) -> Vec<String> {
    (1..=n).map(|i| format!("{group}BAT{i}")).collect()
}

/// Records for one enclosure id.
pub fn records_for<'a>(
    records: &'a [DailyEnclosureRecord],
    enclosure_id: &str,
) -> Vec<&'a DailyEnclosureRecord> {
    records
        .iter()
        .filter(|r| r.enclosure_id == enclosure_id)
        .collect()
}
