//! Daily per-enclosure energy: topology, integration and allocation.

pub mod allocator;
pub mod integrator;
pub mod timestamps;
pub mod types;

use polars::prelude::DataFrame;
use tracing::info;

use crate::config::RunSettings;
use crate::error::Result;
use crate::topology::{TopologyInferrer, TopologyReport};

pub use allocator::{AllocationOutcome, allocate};
pub use integrator::{EnergyIntegrator, IntegrationOutcome};
pub use types::{ChannelKey, DailyEnclosureRecord, DailyInputRecord};

/// Everything computed from one raw frame.
#[derive(Debug, Clone)]
pub struct DailyEnergy {
    pub topology: TopologyReport,
    pub integration: IntegrationOutcome,
    pub allocation: AllocationOutcome,
}

impl DailyEnergy {
    /// Daily enclosure records, sorted by (day, enclosure id).
    pub fn records(&self) -> &[DailyEnclosureRecord] {
        &self.allocation.records
    }
}

/// Runs topology inference, integration and allocation over `frame`.
///
/// # Errors
///
/// Propagates the fatal integration errors (no power columns, missing or
/// unparseable timestamp column).
pub fn daily_enclosure_energy(
    frame: &DataFrame,
    timestamp_col: &str,
    settings: &RunSettings,
) -> Result<DailyEnergy> {
    let inferrer = TopologyInferrer::new(
        settings.enclosure_pattern.clone(),
        settings.split_6,
        settings.split_4,
    );
    let topology = inferrer.infer(frame.get_column_names_str());

    let integration = EnergyIntegrator::new(timestamp_col, settings.timezone, &settings.power_pattern)
        .integrate(frame)?;
    let allocation = allocate(&integration.records, &topology.mapping);

    info!(
        enclosures = topology.mapping.enclosure_count(),
        power_columns = integration.power_columns.len(),
        daily_records = allocation.records.len(),
        "computed daily enclosure energy"
    );
    Ok(DailyEnergy {
        topology,
        integration,
        allocation,
    })
}
