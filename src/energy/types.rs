//! Records flowing between the integrator, the allocator and the reporters.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One DC input of one inverter group, e.g. (`1A1`, 2).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    /// Inverter group, e.g. `1A1`.
    pub inverter_group: String,
    /// DC input number, normally 1 or 2.
    pub dc_input: u32,
}

impl ChannelKey {
    pub fn new(inverter_group: impl Into<String>, dc_input: u32) -> Self {
        Self {
            inverter_group: inverter_group.into(),
            dc_input,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/DC{}", self.inverter_group, self.dc_input)
    }
}

/// Energy through one raw power column on one local calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyInputRecord {
    pub day: NaiveDate,
    pub channel: ChannelKey,
    /// Energy into the batteries (kWh, >= 0).
    pub charged_kwh: f64,
    /// Energy out of the batteries (kWh, >= 0).
    pub discharged_kwh: f64,
}

/// Energy attributed to one enclosure on one local calendar day.
///
/// Field order is the column order of the persisted daily table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEnclosureRecord {
    pub day: NaiveDate,
    pub enclosure_id: String,
    pub charged_kwh: f64,
    pub discharged_kwh: f64,
}
