//! Bottom-N enclosures by total charged and discharged energy.

use std::collections::BTreeMap;
use std::fmt;

use crate::energy::types::DailyEnclosureRecord;

/// Which total an outlier row is ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierMetric {
    LowestCharged,
    LowestDischarged,
}

impl OutlierMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowestCharged => "lowest_charged",
            Self::LowestDischarged => "lowest_discharged",
        }
    }
}

impl fmt::Display for OutlierMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Energy of one enclosure summed over all days.
#[derive(Debug, Clone, PartialEq)]
pub struct EnclosureTotals {
    pub enclosure_id: String,
    pub total_charged_kwh: f64,
    pub total_discharged_kwh: f64,
}

/// One row of the outliers table.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierRow {
    pub metric: OutlierMetric,
    pub enclosure_id: String,
    pub total_charged_kwh: f64,
    pub total_discharged_kwh: f64,
}

impl OutlierRow {
    fn new(metric: OutlierMetric, totals: &EnclosureTotals) -> Self {
        Self {
            metric,
            enclosure_id: totals.enclosure_id.clone(),
            total_charged_kwh: totals.total_charged_kwh,
            total_discharged_kwh: totals.total_discharged_kwh,
        }
    }
}

/// Per-enclosure totals, sorted by enclosure id.
pub fn enclosure_totals(records: &[DailyEnclosureRecord]) -> Vec<EnclosureTotals> {
    let mut sums: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for r in records {
        let entry = sums.entry(r.enclosure_id.as_str()).or_default();
        entry.0 += r.charged_kwh;
        entry.1 += r.discharged_kwh;
    }
    sums.into_iter()
        .map(|(id, (charged, discharged))| EnclosureTotals {
            enclosure_id: id.to_string(),
            total_charged_kwh: charged,
            total_discharged_kwh: discharged,
        })
        .collect()
}

/// The `n` lowest enclosures by total charged energy followed by the `n`
/// lowest by total discharged energy.
///
/// Ranking is a stable ascending sort over totals ordered by enclosure id,
/// so ties keep id order. Fewer than `n` enclosures yields all of them.
pub fn outliers_table(records: &[DailyEnclosureRecord], n: usize) -> Vec<OutlierRow> {
    let totals = enclosure_totals(records);

    let mut by_charged: Vec<&EnclosureTotals> = totals.iter().collect();
    by_charged.sort_by(|a, b| a.total_charged_kwh.total_cmp(&b.total_charged_kwh));
    let mut by_discharged: Vec<&EnclosureTotals> = totals.iter().collect();
    by_discharged.sort_by(|a, b| a.total_discharged_kwh.total_cmp(&b.total_discharged_kwh));

    by_charged
        .into_iter()
        .take(n)
        .map(|t| OutlierRow::new(OutlierMetric::LowestCharged, t))
        .chain(
            by_discharged
                .into_iter()
                .take(n)
                .map(|t| OutlierRow::new(OutlierMetric::LowestDischarged, t)),
        )
        .collect()
}
