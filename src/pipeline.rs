//! End-to-end daily run: discover, load, compute, write.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::config::AppConfig;
use crate::energy::daily_enclosure_energy;
use crate::error::{PipelineError, Result};
use crate::io::discovery::expand_globs;
use crate::io::export::{export_daily_csv, export_outliers_csv};
use crate::io::reader::load_files;
use crate::reporting::heatmap::save_discharged_heatmap;
use crate::reporting::outliers::outliers_table;

/// What a run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub input_files: usize,
    pub input_rows: usize,
    pub power_columns: usize,
    pub enclosures: usize,
    pub daily_records: usize,
    /// Rows skipped for lack of a usable timestamp.
    pub dropped_rows: usize,
    /// Wall-clock timestamps inside a DST fall-back fold.
    pub ambiguous_times: usize,
    /// Enclosure-like ids without the fixed naming shape.
    pub discarded_enclosure_ids: usize,
    /// Daily input records on channels without enclosures.
    pub unallocated_records: usize,
    pub daily_table_path: PathBuf,
    pub outliers_path: PathBuf,
    pub heatmap_path: PathBuf,
}

impl RunSummary {
    /// The three written outputs, in write order.
    pub fn output_paths(&self) -> [&PathBuf; 3] {
        [&self.daily_table_path, &self.outliers_path, &self.heatmap_path]
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Input files:           {}", self.input_files)?;
        writeln!(f, "Input rows:            {}", self.input_rows)?;
        writeln!(f, "Power columns:         {}", self.power_columns)?;
        writeln!(f, "Enclosures:            {}", self.enclosures)?;
        writeln!(f, "Daily records:         {}", self.daily_records)?;
        writeln!(f, "Dropped rows:          {}", self.dropped_rows)?;
        writeln!(f, "Ambiguous times:       {}", self.ambiguous_times)?;
        writeln!(f, "Discarded ids:         {}", self.discarded_enclosure_ids)?;
        write!(f, "Unallocated records:   {}", self.unallocated_records)
    }
}

/// Runs the whole pipeline for `cfg` and writes the daily table, the
/// outliers table and the heatmap into the output directory.
///
/// Configuration is validated before any file is touched.
///
/// # Errors
///
/// Returns the first fatal [`PipelineError`]; outputs written before the
/// failure are left in place.
pub fn run_daily(cfg: &AppConfig) -> Result<RunSummary> {
    let settings = cfg.settings().map_err(PipelineError::Config)?;

    let files = expand_globs(&cfg.data.paths)?;
    info!(files = files.len(), "discovered input files");
    let frame = load_files(&files, &cfg.parsing.timestamp_col)?;

    let energy = daily_enclosure_energy(&frame, &cfg.parsing.timestamp_col, &settings)?;
    let records = energy.records();

    fs::create_dir_all(&cfg.output.dir).map_err(|e| PipelineError::write(&cfg.output.dir, e))?;

    let daily_table_path = cfg.daily_table_path();
    export_daily_csv(records, &daily_table_path)?;
    info!(path = %daily_table_path.display(), rows = records.len(), "wrote daily table");

    let outliers_path = cfg.outliers_path();
    let outliers = outliers_table(records, cfg.output.outliers_n);
    export_outliers_csv(&outliers, &outliers_path)?;
    info!(path = %outliers_path.display(), rows = outliers.len(), "wrote outliers table");

    let heatmap_path = cfg.heatmap_path();
    save_discharged_heatmap(records, &heatmap_path)?;
    info!(path = %heatmap_path.display(), "wrote heatmap");

    Ok(RunSummary {
        input_files: files.len(),
        input_rows: frame.height(),
        power_columns: energy.integration.power_columns.len(),
        enclosures: energy.topology.mapping.enclosure_count(),
        daily_records: records.len(),
        dropped_rows: energy.integration.dropped_rows,
        ambiguous_times: energy.integration.ambiguous_rows,
        discarded_enclosure_ids: energy.topology.discarded.len(),
        unallocated_records: energy.allocation.dropped_records,
        daily_table_path,
        outliers_path,
        heatmap_path,
    })
}
