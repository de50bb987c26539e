//! File readers producing polars [`DataFrame`]s.
//!
//! CSV cells are read as text and parsed by the consumers. Parquet numeric
//! columns become `Float64`; datetime columns are rendered to timestamp text
//! so both formats share one timestamp parser.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::functions::concat_df_diagonal;
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Column name pyarrow gives an unnamed pandas index.
pub const PANDAS_INDEX_COLUMN: &str = "__index_level_0__";

/// Supported input formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Parquet,
}

impl InputFormat {
    /// Case-insensitive: `.csv`, `.parquet` and `.pq`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

fn read_error(path: &Path, err: impl ToString) -> PipelineError {
    PipelineError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Reads one input file into a normalised frame.
///
/// If `timestamp_col` is absent but an unnamed pandas index column is
/// present, that column is renamed to `timestamp_col`.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedFormat`] for unknown extensions and
/// [`PipelineError::Read`] when the file cannot be opened or decoded.
pub fn read_frame(path: &Path, timestamp_col: &str) -> Result<DataFrame> {
    let format = InputFormat::from_path(path)
        .ok_or_else(|| PipelineError::UnsupportedFormat(path.to_path_buf()))?;
    let raw = match format {
        InputFormat::Csv => read_csv(path)?,
        InputFormat::Parquet => read_parquet(path)?,
    };
    let mut frame = normalize_frame(&raw)?;
    if frame.column(timestamp_col).is_err() && frame.column(PANDAS_INDEX_COLUMN).is_ok() {
        frame.rename(PANDAS_INDEX_COLUMN, timestamp_col.into())?;
        debug!(
            path = %path.display(),
            column = timestamp_col,
            "materialised parquet index as timestamp column"
        );
    }
    debug!(
        path = %path.display(),
        rows = frame.height(),
        columns = frame.width(),
        "read input file"
    );
    Ok(frame)
}

/// Reads every file and concatenates them row-wise.
///
/// Columns are the union of all inputs in first-seen order; cells a file
/// does not have are null. All extensions are checked before any file is
/// opened, so an unsupported file aborts the run without partial reads.
///
/// # Errors
///
/// Returns the first read failure.
pub fn load_files(paths: &[impl AsRef<Path>], timestamp_col: &str) -> Result<DataFrame> {
    if paths.is_empty() {
        return Err(PipelineError::NoInputFiles);
    }
    if let Some(bad) = paths
        .iter()
        .map(AsRef::as_ref)
        .find(|p| InputFormat::from_path(p).is_none())
    {
        return Err(PipelineError::UnsupportedFormat(bad.to_path_buf()));
    }

    let mut frames = paths
        .iter()
        .map(|p| read_frame(p.as_ref(), timestamp_col))
        .collect::<Result<Vec<_>>>()?;
    let frame = if frames.len() == 1 {
        frames.swap_remove(0)
    } else {
        align_dtypes(&mut frames)?;
        concat_df_diagonal(&frames)?
    };
    info!(
        files = paths.len(),
        rows = frame.height(),
        columns = frame.width(),
        "loaded input files"
    );
    Ok(frame)
}

/// Reads a headed CSV file with every column as text; empty cells are null.
fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| read_error(path, e))?
        .finish()
        .map_err(|e| read_error(path, e))
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|e| read_error(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| read_error(path, e))
}

/// Reduces a frame to `Float64` and `String` columns.
///
/// Datetime columns become timestamp text, other numeric columns become
/// `Float64` and everything else is cast to text.
///
/// # Errors
///
/// Propagates polars cast failures.
pub fn normalize_frame(frame: &DataFrame) -> Result<DataFrame> {
    let columns = frame
        .get_columns()
        .iter()
        .map(|column| match column.dtype() {
            DataType::String | DataType::Float64 => Ok(column.clone()),
            DataType::Datetime(unit, tz) => {
                let cells = datetime_cells(column, *unit, tz.is_some())?;
                Ok(Column::new(column.name().clone(), cells))
            }
            dtype if dtype.is_primitive_numeric() => Ok(column.cast(&DataType::Float64)?),
            _ => Ok(column.cast(&DataType::String)?),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Casts columns whose type differs between frames to text in every frame,
/// so the diagonal concat sees one type per column.
fn align_dtypes(frames: &mut [DataFrame]) -> Result<()> {
    let mut first_seen: BTreeMap<String, DataType> = BTreeMap::new();
    let mut mixed: BTreeSet<String> = BTreeSet::new();
    for frame in frames.iter() {
        for column in frame.get_columns() {
            let name = column.name().as_str();
            match first_seen.get(name) {
                Some(dtype) if dtype != column.dtype() => {
                    mixed.insert(name.to_string());
                }
                Some(_) => {}
                None => {
                    first_seen.insert(name.to_string(), column.dtype().clone());
                }
            }
        }
    }
    if mixed.is_empty() {
        return Ok(());
    }

    debug!(columns = ?mixed, "columns with mixed types across files are read as text");
    for frame in frames.iter_mut() {
        for name in &mixed {
            let Ok(column) = frame.column(name) else {
                continue;
            };
            let text = column.cast(&DataType::String)?;
            frame.with_column(text)?;
        }
    }
    Ok(())
}

/// Renders datetime cells as text the timestamp parser understands.
///
/// Timezone-aware columns store UTC instants and are rendered with a `Z`
/// suffix; naive columns are rendered as wall-clock time.
fn datetime_cells(column: &Column, unit: TimeUnit, aware: bool) -> Result<Vec<Option<String>>> {
    let raw = column.cast(&DataType::Int64)?;
    let cells = raw
        .i64()?
        .into_iter()
        .map(|cell| {
            let instant: DateTime<Utc> = match unit {
                TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(cell?)),
                TimeUnit::Microseconds => DateTime::from_timestamp_micros(cell?),
                TimeUnit::Milliseconds => DateTime::from_timestamp_millis(cell?),
            }?;
            let naive = instant.naive_utc().format("%Y-%m-%d %H:%M:%S%.f");
            Some(if aware {
                format!("{naive}Z")
            } else {
                naive.to_string()
            })
        })
        .collect();
    Ok(cells)
}
