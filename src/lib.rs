//! Daily charged/discharged energy per BESS enclosure from DC-input power telemetry.

pub mod cli;
pub mod config;
/// Topology inference, power integration and allocation.
pub mod energy;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod reporting;
pub mod schema;
pub mod topology;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{RunSummary, run_daily};
