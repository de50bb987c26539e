//! Derived reports over the daily enclosure table.

pub mod heatmap;
pub mod outliers;

pub use heatmap::{HeatmapMatrix, save_discharged_heatmap};
pub use outliers::{OutlierMetric, OutlierRow, outliers_table};
