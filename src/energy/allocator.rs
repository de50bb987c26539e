//! Equal-share allocation of per-input energy to enclosures.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::energy::types::{ChannelKey, DailyEnclosureRecord, DailyInputRecord};
use crate::topology::TopologyMapping;

/// Result of allocating daily input records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationOutcome {
    /// Sorted by day, then enclosure id.
    pub records: Vec<DailyEnclosureRecord>,
    /// Input records whose channel had no enclosures.
    pub dropped_records: usize,
    /// Distinct channels behind the dropped records.
    pub unmapped_channels: Vec<ChannelKey>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    charged_kwh: f64,
    discharged_kwh: f64,
}

/// Splits each input record equally across the enclosures of its channel
/// and sums shares per (day, enclosure).
///
/// Records on unmapped or empty channels are dropped, so the allocated total
/// equals the total of the mapped input records.
pub fn allocate(inputs: &[DailyInputRecord], mapping: &TopologyMapping) -> AllocationOutcome {
    let mut sums: BTreeMap<(NaiveDate, &str), Totals> = BTreeMap::new();
    let mut dropped_records = 0;
    let mut unmapped: BTreeSet<&ChannelKey> = BTreeSet::new();

    for input in inputs {
        let enclosures = match mapping.get(&input.channel) {
            Some(list) if !list.is_empty() => list,
            _ => {
                dropped_records += 1;
                unmapped.insert(&input.channel);
                continue;
            }
        };
        let weight = 1.0 / enclosures.len() as f64;
        for enclosure in enclosures {
            let totals = sums.entry((input.day, enclosure.as_str())).or_default();
            totals.charged_kwh += input.charged_kwh * weight;
            totals.discharged_kwh += input.discharged_kwh * weight;
        }
    }

    if dropped_records > 0 {
        warn!(
            dropped_records,
            channels = ?unmapped.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "input energy on channels without enclosures was not allocated"
        );
    }

    let records: Vec<DailyEnclosureRecord> = sums
        .into_iter()
        .map(|((day, enclosure_id), t)| DailyEnclosureRecord {
            day,
            enclosure_id: enclosure_id.to_string(),
            charged_kwh: t.charged_kwh,
            discharged_kwh: t.discharged_kwh,
        })
        .collect();
    debug!(records = records.len(), "allocated daily enclosure energy");

    AllocationOutcome {
        records,
        dropped_records,
        unmapped_channels: unmapped.into_iter().cloned().collect(),
    }
}
