//! Input discovery, file readers and CSV export.

pub mod discovery;
pub mod export;
pub mod reader;
