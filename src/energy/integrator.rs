//! Power-to-energy integration under irregular, gapped sampling.
//!
//! Each sample's power is applied to the interval since the previous sample
//! ("delta since previous sample x current power"). Intervals longer than
//! the gap threshold contribute nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use polars::prelude::{DataFrame, DataType};
use tracing::{debug, warn};

use crate::energy::timestamps::localize_column;
use crate::energy::types::DailyInputRecord;
use crate::error::{PipelineError, Result};
use crate::schema::{PowerChannelPattern, PowerColumn};

/// Sampling interval assumed when fewer than two samples exist (one minute).
pub const DEFAULT_DT_HOURS: f64 = 1.0 / 60.0;
/// Lower bound of the gap threshold (five minutes).
pub const MIN_GAP_HOURS: f64 = 5.0 / 60.0;
/// Gap threshold as a multiple of the median sampling interval.
pub const GAP_MEDIAN_FACTOR: f64 = 3.0;

/// Median with the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn hours_between(earlier: &DateTime<Tz>, later: &DateTime<Tz>) -> f64 {
    let delta = *later - *earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 3_600_000_000.0,
        None => delta.num_seconds() as f64 / 3600.0,
    }
}

/// Per-sample integration weights for an ascending time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWeights {
    /// Hours credited to each sample; gaps are zero, the first sample gets the median.
    pub dt_hours: Vec<f64>,
    /// Median of the raw inter-sample deltas (or [`DEFAULT_DT_HOURS`]).
    pub dt_median: f64,
    /// Deltas above this were zeroed.
    pub gap_threshold: f64,
    /// Number of zeroed intervals.
    pub gaps: usize,
}

impl TimeWeights {
    /// Computes weights for timestamps that are already sorted ascending.
    pub fn from_sorted(timestamps: &[DateTime<Tz>]) -> Self {
        let deltas: Vec<f64> = timestamps
            .windows(2)
            .map(|pair| hours_between(&pair[0], &pair[1]))
            .collect();
        let dt_median = median(&deltas).unwrap_or(DEFAULT_DT_HOURS);
        let gap_threshold = MIN_GAP_HOURS.max(GAP_MEDIAN_FACTOR * dt_median);

        let mut gaps = 0;
        let mut dt_hours = Vec::with_capacity(timestamps.len());
        if !timestamps.is_empty() {
            dt_hours.push(dt_median);
        }
        for dt in deltas {
            if dt > gap_threshold {
                gaps += 1;
                dt_hours.push(0.0);
            } else {
                dt_hours.push(dt);
            }
        }

        Self {
            dt_hours,
            dt_median,
            gap_threshold,
            gaps,
        }
    }
}

/// Result of integrating one table.
#[derive(Debug, Clone)]
pub struct IntegrationOutcome {
    /// One record per (power column, local day) with at least one sample.
    pub records: Vec<DailyInputRecord>,
    /// Power columns that matched the pattern.
    pub power_columns: Vec<PowerColumn>,
    /// Rows skipped for lack of a usable timestamp.
    pub dropped_rows: usize,
    /// Wall-clock timestamps repeated by a DST fall-back, placed by row order.
    pub ambiguous_rows: usize,
    pub dt_median_hours: f64,
    pub gaps: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct DayTotals {
    charged_kwh: f64,
    discharged_kwh: f64,
    samples: usize,
}

/// Turns raw power columns into daily charged/discharged energy.
#[derive(Debug, Clone)]
pub struct EnergyIntegrator<'a> {
    timestamp_col: &'a str,
    timezone: Tz,
    pattern: &'a PowerChannelPattern,
}

impl<'a> EnergyIntegrator<'a> {
    pub fn new(timestamp_col: &'a str, timezone: Tz, pattern: &'a PowerChannelPattern) -> Self {
        Self {
            timestamp_col,
            timezone,
            pattern,
        }
    }

    /// Integrates every matching power column of `frame` per local day.
    ///
    /// The timestamp column is read as text. Power columns are cast to
    /// `Float64`; cells that do not parse as numbers count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoPowerColumns`] if nothing matches the power
    /// pattern, [`PipelineError::MissingTimestampColumn`] if the timestamp
    /// column is absent, and [`PipelineError::UnparseableTimestamps`] if no
    /// row has a usable timestamp.
    pub fn integrate(&self, frame: &DataFrame) -> Result<IntegrationOutcome> {
        let power_columns = self
            .pattern
            .power_columns(frame.get_column_names_str());
        if power_columns.is_empty() {
            return Err(PipelineError::NoPowerColumns(self.pattern.as_str().to_string()));
        }

        let ts_column = frame
            .column(self.timestamp_col)
            .map_err(|_| PipelineError::MissingTimestampColumn(self.timestamp_col.to_string()))?
            .cast(&DataType::String)?;
        let localized = localize_column(ts_column.str()?, self.timezone);

        // (timestamp, original row) for rows with a usable time, sorted stably.
        let mut order: Vec<(DateTime<Tz>, usize)> = localized
            .values
            .iter()
            .enumerate()
            .filter_map(|(row, ts)| ts.map(|ts| (ts, row)))
            .collect();
        if order.is_empty() {
            return Err(PipelineError::UnparseableTimestamps(self.timestamp_col.to_string()));
        }
        order.sort_by_key(|(ts, _)| *ts);

        let dropped_rows = frame.height() - order.len();
        if dropped_rows > 0 {
            warn!(
                dropped_rows,
                unparseable = localized.unparseable,
                nonexistent_local_time = localized.nonexistent,
                column = self.timestamp_col,
                "rows without a usable timestamp were skipped"
            );
        }
        if localized.ambiguous > 0 {
            warn!(
                ambiguous_local_time = localized.ambiguous,
                column = self.timestamp_col,
                "wall-clock times repeated by a DST fall-back were placed by row order"
            );
        }

        let sorted: Vec<DateTime<Tz>> = order.iter().map(|(ts, _)| *ts).collect();
        let weights = TimeWeights::from_sorted(&sorted);
        let days: Vec<NaiveDate> = sorted.iter().map(DateTime::date_naive).collect();
        debug!(
            rows = sorted.len(),
            dt_median_hours = weights.dt_median,
            gap_threshold_hours = weights.gap_threshold,
            gaps = weights.gaps,
            "built time axis"
        );

        let mut records = Vec::new();
        for power in &power_columns {
            let values = power_values(frame, &power.column_name)?;
            let mut per_day: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
            for (i, (_, row)) in order.iter().enumerate() {
                let Some(kw) = values[*row] else {
                    continue;
                };
                let dt = weights.dt_hours[i];
                let totals = per_day.entry(days[i]).or_default();
                totals.discharged_kwh += kw.max(0.0) * dt;
                totals.charged_kwh += (-kw).max(0.0) * dt;
                totals.samples += 1;
            }
            records.extend(per_day.into_iter().map(|(day, t)| DailyInputRecord {
                day,
                channel: power.channel.clone(),
                charged_kwh: t.charged_kwh,
                discharged_kwh: t.discharged_kwh,
            }));
        }

        debug!(
            power_columns = power_columns.len(),
            records = records.len(),
            "integrated daily input energy"
        );
        Ok(IntegrationOutcome {
            records,
            power_columns,
            dropped_rows,
            ambiguous_rows: localized.ambiguous,
            dt_median_hours: weights.dt_median,
            gaps: weights.gaps,
        })
    }
}

/// Numeric cells of one column; NaN and unparseable text become `None`.
fn power_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = frame.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|kw| !kw.is_nan()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::types::ChannelKey;
    use chrono::{Duration, NaiveDateTime, TimeZone};
    use polars::prelude::{Column, NamedFrom};

    const POWER: &str = r"^(?P<inv>\d[AB]PCS\d+)\.DC(?P<input>[12])\.Power$";
    const P1: &str = "1APCS1.DC1.Power";

    fn tz() -> Tz {
        "Europe/Oslo".parse().unwrap()
    }

    fn pattern() -> PowerChannelPattern {
        PowerChannelPattern::new(POWER, "PCS").unwrap()
    }

    fn start() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-01-10 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn stamps(minutes: &[i64]) -> Vec<String> {
        minutes
            .iter()
            .map(|m| (start() + Duration::minutes(*m)).format("%Y-%m-%d %H:%M:%S").to_string())
            .collect()
    }

    /// Frame with text timestamps and one power column.
    fn frame_of(ts: &[&str], power: &[Option<f64>]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("Timestamp".into(), ts),
            Column::new(P1.into(), power),
        ])
        .unwrap()
    }

    /// Frame with naive timestamps at the given minute offsets.
    fn table(minutes: &[i64], power: &[Option<f64>]) -> DataFrame {
        let ts = stamps(minutes);
        let cells: Vec<&str> = ts.iter().map(String::as_str).collect();
        frame_of(&cells, power)
    }

    fn run(frame: &DataFrame) -> Result<IntegrationOutcome> {
        let pattern = pattern();
        EnergyIntegrator::new("Timestamp", tz(), &pattern).integrate(frame)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn median_matches_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn single_sample_uses_default_interval() {
        let t = tz().with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let w = TimeWeights::from_sorted(&[t]);
        assert_eq!(w.dt_hours, vec![DEFAULT_DT_HOURS]);
        assert!(close(w.gap_threshold, MIN_GAP_HOURS));
    }

    #[test]
    fn first_sample_gets_median_and_gaps_are_zeroed() {
        let base = tz().with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let ts: Vec<_> = [0, 1, 2, 3, 60, 61]
            .iter()
            .map(|m| base + Duration::minutes(*m))
            .collect();
        let w = TimeWeights::from_sorted(&ts);
        let minute = 1.0 / 60.0;
        assert!(close(w.dt_median, minute));
        assert!(close(w.gap_threshold, MIN_GAP_HOURS));
        assert_eq!(w.gaps, 1);
        assert!(close(w.dt_hours[0], minute));
        assert_eq!(w.dt_hours[4], 0.0);
        assert!(close(w.dt_hours[5], minute));
    }

    #[test]
    fn one_hour_of_ten_kilowatts_is_ten_kwh() {
        // The reading at 01:00 covers the hour since the 00:00 reading.
        let outcome = run(&table(&[0, 60], &[Some(0.0), Some(10.0)])).unwrap();
        assert_eq!(outcome.records.len(), 1);
        let r = &outcome.records[0];
        assert_eq!(r.channel, ChannelKey::new("1A1", 1));
        assert!(close(r.discharged_kwh, 10.0));
        assert!(close(r.charged_kwh, 0.0));
    }

    #[test]
    fn negative_power_is_charging() {
        let outcome = run(&table(&[0, 60, 120], &[Some(-2.0), Some(-2.0), Some(-2.0)])).unwrap();
        let r = &outcome.records[0];
        assert!(close(r.charged_kwh, 6.0));
        assert!(close(r.discharged_kwh, 0.0));
    }

    #[test]
    fn gap_contributes_no_energy() {
        let minutes: Vec<i64> = (0..10).collect();
        let steady = run(&table(&minutes, &[Some(6.0); 10])).unwrap();

        // Same samples, but the last five arrive after a two-hour outage.
        let gapped_minutes: Vec<i64> = (0..5).chain(125..130).collect();
        let gapped = run(&table(&gapped_minutes, &[Some(6.0); 10])).unwrap();

        let expected = 6.0 * 10.0 / 60.0;
        assert!(close(steady.records[0].discharged_kwh, expected));
        assert!(close(gapped.records[0].discharged_kwh, expected - 6.0 / 60.0));
        assert_eq!(gapped.gaps, 1);
    }

    #[test]
    fn unsorted_rows_are_sorted_before_differencing() {
        let sorted = run(&table(&[0, 1, 2, 3], &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)])).unwrap();
        let shuffled =
            run(&table(&[2, 0, 3, 1], &[Some(3.0), Some(1.0), Some(4.0), Some(2.0)])).unwrap();
        assert!(close(
            sorted.records[0].discharged_kwh,
            shuffled.records[0].discharged_kwh
        ));
    }

    #[test]
    fn days_follow_local_calendar() {
        // Both fall on 2024-01-11 in Oslo although the first is 2024-01-10 in UTC.
        let frame = frame_of(
            &["2024-01-10T23:30:00Z", "2024-01-11T00:30:00Z"],
            &[Some(1.0), Some(1.0)],
        );
        let outcome = run(&frame).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].day,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn missing_power_cells_contribute_nothing_and_empty_days_are_absent() {
        // Day 1 has samples with no power; day 2 has power.
        let minutes = [0, 60, 24 * 60, 25 * 60];
        let outcome = run(&table(&minutes, &[None, None, Some(2.0), Some(2.0)])).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].day,
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn unparseable_rows_are_dropped() {
        let frame = frame_of(
            &["2024-01-10 00:00:00", "2024-01-10 01:00:00", "garbage"],
            &[Some(0.0), Some(10.0), Some(1000.0)],
        );
        let outcome = run(&frame).unwrap();
        assert_eq!(outcome.dropped_rows, 1);
        assert!(close(outcome.records[0].discharged_kwh, 10.0));
    }

    #[test]
    fn text_power_cells_are_parsed_and_junk_is_missing() {
        let frame = DataFrame::new(vec![
            Column::new(
                "Timestamp".into(),
                ["2024-01-10 00:00:00", "2024-01-10 01:00:00", "2024-01-10 02:00:00"],
            ),
            Column::new(P1.into(), [Some("0"), Some("10.5"), Some("n/a")]),
        ])
        .unwrap();
        let outcome = run(&frame).unwrap();
        assert!(close(outcome.records[0].discharged_kwh, 10.5));
    }

    #[test]
    fn fall_back_hour_is_counted_twice() {
        // 01:30 to 03:00 local on the Oslo fall-back day, with 02:xx recorded twice.
        let frame = frame_of(
            &[
                "2024-10-27 01:30:00",
                "2024-10-27 02:00:00",
                "2024-10-27 02:30:00",
                "2024-10-27 02:00:00",
                "2024-10-27 02:30:00",
                "2024-10-27 03:00:00",
            ],
            &[Some(4.0); 6],
        );
        let outcome = run(&frame).unwrap();
        assert_eq!(outcome.ambiguous_rows, 4);
        assert_eq!(outcome.gaps, 0);
        assert!(close(outcome.dt_median_hours, 0.5));
        assert!(close(outcome.records[0].discharged_kwh, 4.0 * 0.5 * 6.0));
    }

    #[test]
    fn no_power_columns_is_fatal() {
        let frame = DataFrame::new(vec![
            Column::new("Timestamp".into(), ["2024-01-10 00:00:00"]),
            Column::new("Irrelevant".into(), [1.0f64]),
        ])
        .unwrap();
        assert!(matches!(run(&frame), Err(PipelineError::NoPowerColumns(_))));
    }

    #[test]
    fn missing_timestamp_column_is_fatal() {
        let frame = DataFrame::new(vec![Column::new(P1.into(), [1.0f64])]).unwrap();
        match run(&frame) {
            Err(PipelineError::MissingTimestampColumn(col)) => assert_eq!(col, "Timestamp"),
            other => panic!("expected missing timestamp column, got {other:?}"),
        }
    }

    #[test]
    fn all_unparseable_timestamps_is_fatal() {
        let frame = DataFrame::new(vec![
            Column::new("Timestamp".into(), [Some("x"), None]),
            Column::new(P1.into(), [1.0f64, 1.0]),
        ])
        .unwrap();
        assert!(matches!(
            run(&frame),
            Err(PipelineError::UnparseableTimestamps(_))
        ));
    }
}
