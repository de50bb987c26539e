//! Enclosure x day heatmap of discharged energy, written as SVG or PNG.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};
use tracing::debug;

use crate::energy::types::DailyEnclosureRecord;
use crate::error::{PipelineError, Result};

/// Low-to-high colour ramp (dark purple, red, orange, pale yellow).
const RAMP: [(u8, u8, u8); 4] = [(20, 11, 52), (186, 54, 85), (249, 142, 9), (252, 255, 164)];

const MIN_WIDTH: u32 = 800;
const MIN_HEIGHT: u32 = 600;
const CELL_WIDTH: u32 = 40;
const CELL_HEIGHT: u32 = 12;
const MAX_DAY_LABELS: usize = 31;
const MAX_ROW_LABELS: usize = 50;

const FONT_FAMILY: &str = "sans-serif";
static FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Output encodings, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatmapFormat {
    Svg,
    Png,
}

impl HeatmapFormat {
    /// Case-insensitive: `.svg` or `.png`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// Registers the bundled font once per process; text cannot be laid out
/// without it.
fn ensure_font(path: &Path) -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT).is_ok());
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Render {
            path: path.to_path_buf(),
            message: "bundled font could not be loaded".to_string(),
        })
    }
}

fn render_error<E>(path: &Path) -> impl Fn(DrawingAreaErrorKind<E>) -> PipelineError + '_
where
    E: std::error::Error + Send + Sync,
{
    move |e| PipelineError::Render {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Tick positions at the centre of every `step`-th cell, so at most `max`
/// cells carry a label.
fn centred_ticks(cells: usize, max: usize) -> Vec<f64> {
    let step = cells.div_ceil(max.max(1)).max(1);
    (0..cells).step_by(step).map(|i| i as f64 + 0.5).collect()
}

/// Dense pivot: rows are enclosures, columns are days.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapMatrix {
    /// Row labels, sorted.
    pub enclosures: Vec<String>,
    /// Column labels, ascending.
    pub days: Vec<NaiveDate>,
    /// `values[row][col]` in kWh; absent combinations are zero.
    pub values: Vec<Vec<f64>>,
}

impl HeatmapMatrix {
    /// Pivots discharged energy by (enclosure, day).
    pub fn from_records(records: &[DailyEnclosureRecord]) -> Self {
        let enclosures: Vec<String> = records
            .iter()
            .map(|r| r.enclosure_id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let days: Vec<NaiveDate> = records
            .iter()
            .map(|r| r.day)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let row_of: BTreeMap<&str, usize> = enclosures
            .iter()
            .enumerate()
            .map(|(i, e)| (e.as_str(), i))
            .collect();
        let col_of: BTreeMap<NaiveDate, usize> =
            days.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut values = vec![vec![0.0; days.len()]; enclosures.len()];
        for r in records {
            let cell = (row_of.get(r.enclosure_id.as_str()), col_of.get(&r.day));
            if let (Some(&row), Some(&col)) = cell {
                values[row][col] += r.discharged_kwh;
            }
        }

        Self {
            enclosures,
            days,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enclosures.is_empty() || self.days.is_empty()
    }

    /// Cell value, or zero outside the matrix.
    pub fn get(&self, enclosure: &str, day: NaiveDate) -> f64 {
        let row = self.enclosures.iter().position(|e| e == enclosure);
        let col = self.days.iter().position(|d| *d == day);
        match (row, col) {
            (Some(r), Some(c)) => self.values[r][c],
            _ => 0.0,
        }
    }

    /// Largest cell value (zero for an empty matrix).
    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }

    fn size(&self) -> (u32, u32) {
        let n_days = self.days.len().max(1) as u32;
        let n_rows = self.enclosures.len().max(1) as u32;
        (
            MIN_WIDTH.max(200 + CELL_WIDTH * n_days),
            MIN_HEIGHT.max(150 + CELL_HEIGHT * n_rows),
        )
    }

    /// Draws the heatmap and its colour bar on any plotters backend.
    fn draw<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
    ) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
        let n_days = self.days.len().max(1);
        let n_rows = self.enclosures.len().max(1);
        let (width, _) = root.dim_in_pixel();
        let max = self.max_value();

        root.fill(&WHITE)?;
        let (plot_area, legend_area) = root.split_horizontally((width - 90) as i32);

        // Cell i spans [i, i + 1); labels sit on the cell centres.
        let x_axis =
            (0f64..n_days as f64).with_key_points(centred_ticks(n_days, MAX_DAY_LABELS));
        let y_axis =
            (0f64..n_rows as f64).with_key_points(centred_ticks(n_rows, MAX_ROW_LABELS));
        let mut chart = ChartBuilder::on(&plot_area)
            .caption("Daily Discharged Energy by BESS Enclosure", (FONT_FAMILY, 22))
            .margin(10)
            .x_label_area_size(60)
            .y_label_area_size(90)
            .build_cartesian_2d(x_axis, y_axis)?;

        let days = &self.days;
        let enclosures = &self.enclosures;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Day")
            .y_desc("Enclosure")
            .x_label_formatter(&|x| {
                days.get(x.floor() as usize)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            })
            .y_label_formatter(&|y| {
                // Row 0 is drawn at the top.
                n_rows
                    .checked_sub(y.floor() as usize + 1)
                    .and_then(|i| enclosures.get(i))
                    .cloned()
                    .unwrap_or_default()
            })
            .label_style((FONT_FAMILY, 11))
            .draw()?;

        let cells = self.values.iter().enumerate().flat_map(|(row, values)| {
            values.iter().enumerate().map(move |(col, v)| {
                let y = (n_rows - row - 1) as f64;
                let x = col as f64;
                Rectangle::new([(x, y), (x + 1.0, y + 1.0)], ramp(*v, max).filled())
            })
        });
        chart.draw_series(cells)?;

        draw_colorbar(&legend_area, max)?;
        root.present()
    }

    /// Renders the matrix as an SVG document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Render`] if drawing fails.
    pub fn to_svg(&self, path_hint: &Path) -> Result<String> {
        ensure_font(path_hint)?;
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, self.size()).into_drawing_area();
            self.draw(&root).map_err(render_error(path_hint))?;
        }
        Ok(svg)
    }

    fn write_png(&self, path: &Path) -> Result<()> {
        ensure_font(path)?;
        let root = BitMapBackend::new(path, self.size()).into_drawing_area();
        self.draw(&root).map_err(render_error(path))
    }

    /// Writes the heatmap to `path`, creating parent directories. The file
    /// extension picks the encoding (`.svg` or `.png`).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Render`] for other extensions or if drawing
    /// fails, and [`PipelineError::Write`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let format = HeatmapFormat::from_path(path).ok_or_else(|| PipelineError::Render {
            path: path.to_path_buf(),
            message: "heatmap must be a .svg or .png file".to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
        }
        match format {
            HeatmapFormat::Svg => {
                let svg = self.to_svg(path)?;
                fs::write(path, svg).map_err(|e| PipelineError::write(path, e))?;
            }
            HeatmapFormat::Png => self.write_png(path)?,
        }
        debug!(
            path = %path.display(),
            format = ?format,
            enclosures = self.enclosures.len(),
            days = self.days.len(),
            "wrote heatmap"
        );
        Ok(())
    }
}

/// Pivots `records` and writes the heatmap to `path`.
///
/// # Errors
///
/// See [`HeatmapMatrix::save`].
pub fn save_discharged_heatmap(records: &[DailyEnclosureRecord], path: &Path) -> Result<()> {
    HeatmapMatrix::from_records(records).save(path)
}

/// Colour for `value` on a `0..=max` scale.
fn ramp(value: f64, max: f64) -> RGBColor {
    let t = if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let scaled = t * (RAMP.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(RAMP.len() - 2);
    let frac = scaled - i as f64;
    let (a, b) = (RAMP[i], RAMP[i + 1]);
    let lerp = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * frac).round() as u8;
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    max: f64,
) -> std::result::Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (_, h) = area.dim_in_pixel();
    let top = 60;
    let bottom = h.saturating_sub(80).max(top + 1) as i32;
    let top = top as i32;
    let steps = 100;
    let span = (bottom - top) as f64;
    for s in 0..steps {
        let y0 = bottom - (span * f64::from(s + 1) / f64::from(steps)).round() as i32;
        let y1 = bottom - (span * f64::from(s) / f64::from(steps)).round() as i32;
        let color = ramp(f64::from(s) / f64::from(steps - 1) * max, max);
        area.draw(&Rectangle::new([(10, y0), (30, y1)], color.filled()))?;
    }
    let style = (FONT_FAMILY, 11).into_font();
    area.draw(&Text::new(format!("{max:.1}"), (34, top), style.clone()))?;
    area.draw(&Text::new("0.0", (34, bottom - 10), style.clone()))?;
    area.draw(&Text::new("kWh", (10, top - 20), style))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(d: u32, id: &str, discharged: f64) -> DailyEnclosureRecord {
        DailyEnclosureRecord {
            day: NaiveDate::from_ymd_opt(2024, 7, d).unwrap(),
            enclosure_id: id.to_string(),
            charged_kwh: 0.0,
            discharged_kwh: discharged,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn pivot_fills_missing_cells_with_zero() {
        let records = [
            record(1, "1A1BAT1", 5.0),
            record(2, "1A1BAT2", 7.0),
            record(2, "1A1BAT1", 1.5),
        ];
        let m = HeatmapMatrix::from_records(&records);
        assert_eq!(m.enclosures, ["1A1BAT1", "1A1BAT2"]);
        assert_eq!(m.days, [day(1), day(2)]);
        assert_eq!(m.values, vec![vec![5.0, 1.5], vec![0.0, 7.0]]);
        assert_eq!(m.get("1A1BAT2", day(1)), 0.0);
        assert_eq!(m.get("nope", day(1)), 0.0);
        assert_eq!(m.max_value(), 7.0);
    }

    #[test]
    fn ramp_endpoints() {
        let (r, g, b) = RAMP[0];
        assert_eq!(ramp(0.0, 10.0), RGBColor(r, g, b));
        let (r, g, b) = RAMP[RAMP.len() - 1];
        assert_eq!(ramp(10.0, 10.0), RGBColor(r, g, b));
        assert_eq!(ramp(3.0, 0.0), ramp(0.0, 1.0));
    }

    #[test]
    fn svg_is_written_with_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots/nested/heatmap.svg");
        let records = [record(1, "1A1BAT1", 2.0), record(1, "1A1BAT2", 4.0)];
        save_discharged_heatmap(&records, &path).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Daily Discharged Energy by BESS Enclosure"));
        assert!(svg.contains("<rect"));
    }

    #[test]
    fn png_is_written_with_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots/nested/heatmap.png");
        let records = [record(1, "1A1BAT1", 2.0), record(2, "1A1BAT2", 4.0)];
        save_discharged_heatmap(&records, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));
    }

    #[test]
    fn other_extensions_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.jpg");
        let err = save_discharged_heatmap(&[record(1, "1A1BAT1", 1.0)], &path).unwrap_err();
        assert!(matches!(err, PipelineError::Render { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(HeatmapFormat::from_path(Path::new("a.svg")), Some(HeatmapFormat::Svg));
        assert_eq!(HeatmapFormat::from_path(Path::new("a.PNG")), Some(HeatmapFormat::Png));
        assert_eq!(HeatmapFormat::from_path(Path::new("a.jpeg")), None);
        assert_eq!(HeatmapFormat::from_path(Path::new("heatmap")), None);
    }

    #[test]
    fn ticks_sit_on_cell_centres() {
        assert_eq!(centred_ticks(1, 31), vec![0.5]);
        assert_eq!(centred_ticks(3, 31), vec![0.5, 1.5, 2.5]);
        let thinned = centred_ticks(100, 31);
        assert!(thinned.len() <= 31);
        assert_eq!(&thinned[..2], &[0.5, 4.5]);
    }

    #[test]
    fn every_day_and_enclosure_is_labelled() {
        let records = [
            record(1, "1A1BAT1", 1.0),
            record(2, "1A1BAT2", 2.0),
            record(3, "1A1BAT3", 3.0),
        ];
        let svg = HeatmapMatrix::from_records(&records)
            .to_svg(Path::new("labels.svg"))
            .unwrap();
        for label in ["2024-07-01", "2024-07-02", "2024-07-03", "1A1BAT1", "1A1BAT2", "1A1BAT3"] {
            assert!(svg.contains(label), "{label} should be labelled");
        }
    }

    #[test]
    fn single_day_is_labelled() {
        let svg = HeatmapMatrix::from_records(&[record(9, "1A1BAT1", 1.0)])
            .to_svg(Path::new("one.svg"))
            .unwrap();
        assert!(svg.contains("2024-07-09"));
    }

    #[test]
    fn empty_records_still_render() {
        let m = HeatmapMatrix::from_records(&[]);
        assert!(m.is_empty());
        let svg = m.to_svg(Path::new("empty.svg")).unwrap();
        assert!(svg.contains("</svg>"));
    }
}
