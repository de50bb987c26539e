//! Error taxonomy for a pipeline run.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;

/// Every fatal condition that stops a run.
///
/// Silent-drop policies (unparseable enclosure ids, unmapped channels) are
/// not errors; they surface as counts in the per-stage outcomes instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{}", join_config_errors(.0))]
    Config(Vec<ConfigError>),

    #[error("invalid input pattern \"{pattern}\": {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("no input files found; check config data.paths")]
    NoInputFiles,

    #[error("unsupported file type: {} (supported: .parquet/.pq/.csv)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("no DC input power columns matched power.dc_input_power_regex \"{0}\"")]
    NoPowerColumns(String),

    #[error("timestamp column \"{0}\" not found (was a parquet index left unmaterialised?)")]
    MissingTimestampColumn(String),

    #[error("all timestamps in column \"{0}\" failed to parse; check parsing.timestamp_col")]
    UnparseableTimestamps(String),

    #[error("reading {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("writing {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("rendering {}: {message}", path.display())]
    Render { path: PathBuf, message: String },
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        Self::Config(vec![err])
    }
}

impl PipelineError {
    pub(crate) fn write(path: &Path, err: impl ToString) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used across the library.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
