//! Timestamp parsing and timezone localisation.
//!
//! Accepted cells, after trimming:
//! - RFC 3339 (`2024-03-01T12:30:00+01:00`, `...Z`)
//! - ISO date and time with `T` or a space, optional seconds and fraction
//! - the same followed by an offset: `Z`, `+01`, `+0100` or `+01:00`,
//!   directly attached or after a space
//! - `YYYY/MM/DD HH:MM[:SS]` and US `MM/DD/YYYY HH:MM[:SS]`
//! - a bare date (`YYYY-MM-DD`, `YYYY/MM/DD`, `MM/DD/YYYY`) at midnight

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Offset-carrying formats tried after RFC 3339. `%#z` takes `+01`,
/// `+0100` and `+01:00` and skips whitespace before the sign.
const AWARE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M%#z",
    "%Y-%m-%dT%H:%M%#z",
];

/// Wall-clock formats without an offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// A parsed timestamp before localisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    /// Carries its own UTC offset.
    Aware(DateTime<FixedOffset>),
    /// Wall-clock time to be interpreted in the target timezone.
    Naive(NaiveDateTime),
}

/// Parses one timestamp cell; `None` if no supported format matches.
pub fn parse_timestamp(cell: &str) -> Option<RawTimestamp> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(RawTimestamp::Aware(dt));
    }
    if let Some(utc) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return parse_naive(utc.trim_end())
            .map(|naive| RawTimestamp::Aware(Utc.from_utc_datetime(&naive).fixed_offset()));
    }
    for fmt in AWARE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(RawTimestamp::Aware(dt));
        }
    }
    parse_naive(s).map(RawTimestamp::Naive)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Moves a single parsed timestamp into `tz`.
///
/// Offset-carrying values are converted. Wall-clock values are read as local
/// time in `tz`: a time skipped by a DST gap yields `None`, and a lone time
/// repeated by a DST fold resolves to its earlier instant. Use
/// [`localize_column`] for whole columns, where row order settles folds.
pub fn localize(raw: RawTimestamp, tz: Tz) -> Option<DateTime<Tz>> {
    match raw {
        RawTimestamp::Aware(dt) => Some(dt.with_timezone(&tz)),
        RawTimestamp::Naive(naive) => tz.from_local_datetime(&naive).earliest(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Fold {
    day: NaiveDate,
    last: NaiveDateTime,
    repeating: bool,
}

/// Walks a column in row order and picks an offset for each wall-clock time
/// that a DST fall-back repeats.
///
/// Times take the earlier (summer) offset until the wall clock steps
/// backwards inside the fold; from then on the rest of that fold takes the
/// later (winter) offset.
#[derive(Debug, Default)]
struct FoldResolver {
    fold: Option<Fold>,
}

impl FoldResolver {
    fn resolve(
        &mut self,
        naive: NaiveDateTime,
        earlier: DateTime<Tz>,
        later: DateTime<Tz>,
    ) -> DateTime<Tz> {
        if self.second_pass(naive) { later } else { earlier }
    }

    fn second_pass(&mut self, naive: NaiveDateTime) -> bool {
        if let Some(fold) = self.fold.as_mut().filter(|f| f.day == naive.date()) {
            if naive < fold.last {
                fold.repeating = true;
            }
            fold.last = naive;
            return fold.repeating;
        }
        self.fold = Some(Fold {
            day: naive.date(),
            last: naive,
            repeating: false,
        });
        false
    }
}

/// A localised timestamp column.
#[derive(Debug, Clone)]
pub struct LocalizedColumn {
    /// One entry per input row; `None` where the row has no usable time.
    pub values: Vec<Option<DateTime<Tz>>>,
    /// Cells that matched no supported format (empty cells included).
    pub unparseable: usize,
    /// Wall-clock cells that fall inside a DST gap.
    pub nonexistent: usize,
    /// Wall-clock cells inside a DST fold, resolved by row order.
    pub ambiguous: usize,
}

impl LocalizedColumn {
    /// Number of rows with a usable timestamp.
    pub fn valid(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Parses and localises every cell of a timestamp column, in row order.
///
/// Wall-clock times repeated by a DST fall-back are told apart by the order
/// the rows were recorded in: the first pass through the repeated hour is
/// the earlier instant, the pass after the clock goes back is the later one.
pub fn localize_column<'a>(
    cells: impl IntoIterator<Item = Option<&'a str>>,
    tz: Tz,
) -> LocalizedColumn {
    let mut unparseable = 0;
    let mut nonexistent = 0;
    let mut ambiguous = 0;
    let mut folds = FoldResolver::default();
    let values = cells
        .into_iter()
        .map(|cell| {
            let Some(raw) = cell.and_then(parse_timestamp) else {
                unparseable += 1;
                return None;
            };
            let naive = match raw {
                RawTimestamp::Aware(dt) => return Some(dt.with_timezone(&tz)),
                RawTimestamp::Naive(naive) => naive,
            };
            match tz.from_local_datetime(&naive) {
                LocalResult::Single(local) => Some(local),
                LocalResult::Ambiguous(earlier, later) => {
                    ambiguous += 1;
                    Some(folds.resolve(naive, earlier, later))
                }
                LocalResult::None => {
                    nonexistent += 1;
                    None
                }
            }
        })
        .collect();
    LocalizedColumn {
        values,
        unparseable,
        nonexistent,
        ambiguous,
    }
}
