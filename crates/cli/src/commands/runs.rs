//! Run-finding CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use segmenter_lib::query::PrometheusClientBuilder;
use segmenter_lib::segment::{segment_fine_history, Progress, RunSegmenter};
use segmenter_lib::table::read_history_csv_path;
use segmenter_lib::{RunTable, SegmenterConfig};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::print_runs;
use crate::config::{resolve_window, CliConfig};
use crate::output::{format_labels, print_success, OutputFormat};
use crate::{FilterArgs, WindowArgs};

/// Find runs against a Prometheus server
pub async fn find_runs(
    settings: &CliConfig,
    prometheus_url: &str,
    filter: &FilterArgs,
    window: &WindowArgs,
    config: SegmenterConfig,
    output: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let label_filter = settings.label_filter(filter)?;
    let (start, end) = resolve_window(window)?;

    let client = PrometheusClientBuilder::new(prometheus_url)
        .request_timeout(config.query_timeout)
        .build()
        .context("Failed to create Prometheus client")?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            eprintln!(
                "{} {}",
                format!("[{}/{}]", progress.completed, progress.total).dimmed(),
                format_labels(&progress.group)
            );
        }
    });

    let segmenter = RunSegmenter::new(Arc::new(client), config)?.with_progress(Arc::new(tx));
    let result = segmenter.find_runs(&label_filter, start, end).await;

    // Closes the progress channel
    drop(segmenter);
    let _ = printer.await;

    let table = result.context("Run segmentation failed")?;
    finish(&table, output, format)
}

/// Designate runs offline from a fine-grained history CSV
pub fn segment_history_file(
    path: &str,
    config: SegmenterConfig,
    output: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let points = read_history_csv_path(path)
        .with_context(|| format!("Failed to read history from {}", path))?;
    let table = segment_fine_history(&points, &config).context("Run segmentation failed")?;

    finish(&table, output, format)
}

fn finish(table: &RunTable, output: Option<String>, format: OutputFormat) -> Result<()> {
    if let Some(path) = output {
        table
            .write_csv_path(&path)
            .with_context(|| format!("Failed to write run table to {}", path))?;
        print_success(&format!("Wrote {} runs to {}", table.len(), path));
    }

    print_runs(table, format)
}
