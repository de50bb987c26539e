//! TOML-based run configuration and validation.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::reporting::heatmap::HeatmapFormat;
use crate::schema::{EnclosurePattern, PowerChannelPattern};
use crate::topology::SplitRule;

/// Inverter-code marker removed to obtain the inverter group (`1APCS1` -> `1A1`).
pub const DEFAULT_INVERTER_INFIX: &str = "PCS";

/// Number of enclosures listed per metric in the outliers table.
pub const DEFAULT_OUTLIERS_N: usize = 5;

/// Validated run configuration.
///
/// Built once by [`AppConfig::load`] (or [`AppConfig::from_toml_str`] followed
/// by [`AppConfig::validate`]) and only ever borrowed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Input files.
    pub data: DataConfig,
    /// Timestamp handling.
    pub parsing: ParsingConfig,
    /// Power-column discovery.
    pub power: PowerConfig,
    /// Enclosure inference and channel splitting.
    pub allocation: AllocationConfig,
    /// Output locations.
    pub output: OutputConfig,
}

/// Input files.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    /// Literal paths or glob patterns.
    pub paths: Vec<String>,
}

/// Timestamp handling.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingConfig {
    /// Name of the timestamp column in the raw table.
    pub timestamp_col: String,
    /// IANA timezone used for localisation and day bucketing.
    pub timezone: String,
}

/// Power-column discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerConfig {
    /// Regex with named captures `input` (DC input number) and `inv` (inverter code).
    pub dc_input_power_regex: String,
    /// Marker stripped from the inverter code to form the inverter group.
    pub inverter_infix: String,
}

/// Enclosure inference and channel splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationConfig {
    /// Regex with named capture `eid` (enclosure identifier).
    pub battery_system_regex: String,
    /// Enclosures per DC input for six-enclosure groups.
    pub split_6: Vec<i64>,
    /// Enclosures per DC input for four-enclosure groups.
    pub split_4: Vec<i64>,
}

/// Output locations.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// Directory receiving all three outputs (created if missing).
    pub dir: PathBuf,
    /// Daily per-enclosure table (CSV).
    pub daily_table_file: String,
    /// Bottom-N outliers table (CSV).
    pub outliers_file: String,
    /// Discharged-energy heatmap (`.svg` or `.png`).
    pub heatmap_file: String,
    /// N for the outliers table.
    pub outliers_n: usize,
}

/// Compiled, typed view of an [`AppConfig`] consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub timezone: Tz,
    pub power_pattern: PowerChannelPattern,
    pub enclosure_pattern: EnclosurePattern,
    pub split_6: SplitRule,
    pub split_4: SplitRule,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"parsing.timezone"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "missing config key")
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

// File mirror. Every key is optional here so that absent keys can be reported
// by dotted path rather than by serde's bare field name.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    data: RawData,
    parsing: RawParsing,
    power: RawPower,
    allocation: RawAllocation,
    output: RawOutput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawData {
    paths: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawParsing {
    timestamp_col: Option<String>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawPower {
    dc_input_power_regex: Option<String>,
    inverter_infix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawAllocation {
    battery_system_regex: Option<String>,
    split_6: Option<Vec<i64>>,
    split_4: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawOutput {
    dir: Option<PathBuf>,
    daily_table_file: Option<String>,
    outliers_file: Option<String>,
    heatmap_file: Option<String>,
    outliers_n: Option<usize>,
}

/// Takes a required value out of the raw mirror, recording its absence.
fn require<T>(value: Option<T>, field: &str, errors: &mut Vec<ConfigError>) -> Option<T> {
    if value.is_none() {
        errors.push(ConfigError::missing(field));
    }
    value
}

impl RawConfig {
    fn into_config(self) -> Result<AppConfig, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let e = &mut errors;

        let paths = require(self.data.paths, "data.paths", e);
        let timestamp_col = require(self.parsing.timestamp_col, "parsing.timestamp_col", e);
        let timezone = require(self.parsing.timezone, "parsing.timezone", e);
        let dc_input_power_regex =
            require(self.power.dc_input_power_regex, "power.dc_input_power_regex", e);
        let battery_system_regex = require(
            self.allocation.battery_system_regex,
            "allocation.battery_system_regex",
            e,
        );
        let split_6 = require(self.allocation.split_6, "allocation.split_6", e);
        let split_4 = require(self.allocation.split_4, "allocation.split_4", e);
        let dir = require(self.output.dir, "output.dir", e);
        let daily_table_file = require(self.output.daily_table_file, "output.daily_table_file", e);
        let outliers_file = require(self.output.outliers_file, "output.outliers_file", e);
        let heatmap_file = require(self.output.heatmap_file, "output.heatmap_file", e);

        match (
            paths,
            timestamp_col,
            timezone,
            dc_input_power_regex,
            battery_system_regex,
            split_6,
            split_4,
            dir,
            daily_table_file,
            outliers_file,
            heatmap_file,
        ) {
            (
                Some(paths),
                Some(timestamp_col),
                Some(timezone),
                Some(dc_input_power_regex),
                Some(battery_system_regex),
                Some(split_6),
                Some(split_4),
                Some(dir),
                Some(daily_table_file),
                Some(outliers_file),
                Some(heatmap_file),
            ) => Ok(AppConfig {
                data: DataConfig { paths },
                parsing: ParsingConfig {
                    timestamp_col,
                    timezone,
                },
                power: PowerConfig {
                    dc_input_power_regex,
                    inverter_infix: self
                        .power
                        .inverter_infix
                        .unwrap_or_else(|| DEFAULT_INVERTER_INFIX.to_string()),
                },
                allocation: AllocationConfig {
                    battery_system_regex,
                    split_6,
                    split_4,
                },
                output: OutputConfig {
                    dir,
                    daily_table_file,
                    outliers_file,
                    heatmap_file,
                    outliers_n: self.output.outliers_n.unwrap_or(DEFAULT_OUTLIERS_N),
                },
            }),
            _ => Err(errors),
        }
    }
}

impl AppConfig {
    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] listing every problem found.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let cfg = Self::from_toml_file(path).map_err(PipelineError::Config)?;
        let errors = cfg.validate();
        if errors.is_empty() {
            Ok(cfg)
        } else {
            Err(PipelineError::Config(errors))
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns the read failure, the TOML syntax error, or every missing key.
    pub fn from_toml_file(path: &Path) -> Result<Self, Vec<ConfigError>> {
        let content = fs::read_to_string(path).map_err(|e| {
            vec![ConfigError::new(
                "config",
                format!("cannot read \"{}\": {e}", path.display()),
            )]
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns the TOML syntax error (including unknown keys) or every missing key.
    pub fn from_toml_str(s: &str) -> Result<Self, Vec<ConfigError>> {
        let raw: RawConfig =
            toml::from_str(s).map_err(|e| vec![ConfigError::new("toml", e.to_string())])?;
        raw.into_config()
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        match self.settings() {
            Ok(_) => Vec::new(),
            Err(errors) => errors,
        }
    }

    /// Compiles patterns, resolves the timezone and builds split rules.
    ///
    /// # Errors
    ///
    /// Returns every constraint violation found.
    pub fn settings(&self) -> Result<RunSettings, Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.data.paths.is_empty() {
            errors.push(ConfigError::new("data.paths", "must list at least one path"));
        }
        if self.parsing.timestamp_col.is_empty() {
            errors.push(ConfigError::new("parsing.timestamp_col", "must not be empty"));
        }

        let timezone = self
            .parsing
            .timezone
            .parse::<Tz>()
            .map_err(|_| {
                errors.push(ConfigError::new(
                    "parsing.timezone",
                    format!("unknown timezone \"{}\"", self.parsing.timezone),
                ));
            })
            .ok();

        let power_pattern = PowerChannelPattern::new(
            &self.power.dc_input_power_regex,
            &self.power.inverter_infix,
        )
        .map_err(|e| errors.push(ConfigError::new("power.dc_input_power_regex", e.to_string())))
        .ok();

        let enclosure_pattern = EnclosurePattern::new(&self.allocation.battery_system_regex)
            .map_err(|e| {
                errors.push(ConfigError::new(
                    "allocation.battery_system_regex",
                    e.to_string(),
                ));
            })
            .ok();

        let split_6 = split_rule(&self.allocation.split_6, 6, "allocation.split_6", &mut errors);
        let split_4 = split_rule(&self.allocation.split_4, 4, "allocation.split_4", &mut errors);

        let out = &self.output;
        if out.outliers_n == 0 {
            errors.push(ConfigError::new("output.outliers_n", "must be > 0"));
        }
        for (field, name) in [
            ("output.daily_table_file", &out.daily_table_file),
            ("output.outliers_file", &out.outliers_file),
            ("output.heatmap_file", &out.heatmap_file),
        ] {
            if name.is_empty() {
                errors.push(ConfigError::new(field, "must not be empty"));
            }
        }
        if !out.heatmap_file.is_empty()
            && HeatmapFormat::from_path(Path::new(&out.heatmap_file)).is_none()
        {
            errors.push(ConfigError::new(
                "output.heatmap_file",
                "heatmap must be a .svg or .png file",
            ));
        }

        match (timezone, power_pattern, enclosure_pattern, split_6, split_4) {
            (Some(timezone), Some(power_pattern), Some(enclosure_pattern), Some(split_6), Some(split_4))
                if errors.is_empty() =>
            {
                Ok(RunSettings {
                    timezone,
                    power_pattern,
                    enclosure_pattern,
                    split_6,
                    split_4,
                })
            }
            _ => Err(errors),
        }
    }

    /// Full path of the daily table.
    pub fn daily_table_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.daily_table_file)
    }

    /// Full path of the outliers table.
    pub fn outliers_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.outliers_file)
    }

    /// Full path of the heatmap image.
    pub fn heatmap_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.heatmap_file)
    }
}

fn split_rule(
    raw: &[i64],
    group_size: usize,
    field: &str,
    errors: &mut Vec<ConfigError>,
) -> Option<SplitRule> {
    let [first, second] = raw else {
        errors.push(ConfigError::new(
            field,
            format!("must be a length-2 list, got {} element(s)", raw.len()),
        ));
        return None;
    };
    let (Ok(first), Ok(second)) = (usize::try_from(*first), usize::try_from(*second)) else {
        errors.push(ConfigError::new(field, "elements must be positive"));
        return None;
    };
    if first == 0 || second == 0 {
        errors.push(ConfigError::new(field, "elements must be positive"));
        return None;
    }
    if first + second != group_size {
        errors.push(ConfigError::new(
            field,
            format!("elements must sum to {group_size}, got {}", first + second),
        ));
        return None;
    }
    Some(SplitRule::new(first, second))
}
