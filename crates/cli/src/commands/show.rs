//! Saved run table commands

use anyhow::{Context, Result};
use segmenter_lib::{DisplayMode, RunTable};

use super::print_runs;
use crate::output::OutputFormat;

/// Show a run table saved as CSV, optionally switching its display mode
pub fn show_table(path: &str, raw: bool, calendar: bool, format: OutputFormat) -> Result<()> {
    let mut table = RunTable::read_csv_path(path)
        .with_context(|| format!("Failed to read run table from {}", path))?;

    if raw {
        table.set_display_mode(DisplayMode::Raw);
    } else if calendar {
        table.set_display_mode(DisplayMode::Calendar);
    }

    print_runs(&table, format)
}
