//! Coarse-period CLI commands

use anyhow::{Context, Result};
use segmenter_lib::query::PrometheusClientBuilder;
use segmenter_lib::segment::{coarse_periods_by_group, RunSegmenter};
use segmenter_lib::table::{format_timestamp, read_history_csv_path};
use segmenter_lib::{ActivityPoint, CoarsePeriod, DisplayMode, SegmenterConfig};
use std::sync::Arc;
use tabled::Tabled;

use crate::config::{resolve_window, CliConfig};
use crate::output::{format_duration, format_labels, print_info, print_warning, OutputFormat};
use crate::{FilterArgs, WindowArgs};

/// Row for coarse period tables
#[derive(Tabled)]
struct PeriodRow {
    #[tabled(rename = "Labels")]
    labels: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Width")]
    width: String,
}

/// Show coarse windows derived from the Prometheus activity history
pub async fn show_periods(
    settings: &CliConfig,
    prometheus_url: &str,
    filter: &FilterArgs,
    window: &WindowArgs,
    config: SegmenterConfig,
    format: OutputFormat,
) -> Result<()> {
    let label_filter = settings.label_filter(filter)?;
    let (start, end) = resolve_window(window)?;
    let mode = config.display_mode;

    let client = PrometheusClientBuilder::new(prometheus_url)
        .request_timeout(config.query_timeout)
        .build()
        .context("Failed to create Prometheus client")?;
    let segmenter = RunSegmenter::new(Arc::new(client), config)?;

    let history = segmenter
        .query_history(&label_filter, start, end)
        .await
        .context("Failed to query activity history")?;

    print_periods(&history, mode, format)
}

/// Show coarse windows derived from a history CSV
pub fn show_history_periods(path: &str, raw: bool, format: OutputFormat) -> Result<()> {
    let history = read_history_csv_path(path)
        .with_context(|| format!("Failed to read history from {}", path))?;
    let mode = if raw {
        DisplayMode::Raw
    } else {
        DisplayMode::Calendar
    };

    print_periods(&history, mode, format)
}

fn print_periods(history: &[ActivityPoint], mode: DisplayMode, format: OutputFormat) -> Result<()> {
    let periods: Vec<CoarsePeriod> = coarse_periods_by_group(history)
        .into_values()
        .flatten()
        .collect();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&periods)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if periods.is_empty() {
                print_warning("No activity history found");
                return Ok(());
            }

            let rows: Vec<PeriodRow> = periods
                .iter()
                .map(|p| PeriodRow {
                    labels: format_labels(&p.label_key),
                    start: format_timestamp(p.start, mode),
                    end: format_timestamp(p.end, mode),
                    width: format_duration(p.width()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            print_info(&format!(
                "Total: {} windows from {} history points",
                periods.len(),
                history.len()
            ));
        }
    }

    Ok(())
}
