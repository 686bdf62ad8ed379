//! CLI command implementations

pub mod check;
pub mod periods;
pub mod runs;
pub mod show;

use anyhow::Result;
use tabled::Tabled;

use crate::output::{format_duration, format_labels, print_info, print_warning, OutputFormat};
use segmenter_lib::RunTable;

/// Row for run tables
#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

/// Print a run table in the requested format
pub(crate) fn print_runs(table: &RunTable, format: OutputFormat) -> Result<()> {
    let records = table.records();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&records)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No runs found");
                return Ok(());
            }

            let rows: Vec<RunRow> = records
                .iter()
                .map(|r| RunRow {
                    labels: format_labels(&r.labels),
                    start: r.start.clone(),
                    end: r.end.clone(),
                    duration: format_duration(r.duration_secs),
                })
                .collect();

            let table_str = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table_str);
            print_info(&format!(
                "Total: {} runs across {} label groups",
                table.len(),
                table.groups().len()
            ));
        }
    }

    Ok(())
}
