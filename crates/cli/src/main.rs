//! Pod Run Segmenter CLI
//!
//! A command-line tool for finding the discrete runs of pods from their CPU
//! activity, inspecting coarse activity windows, and viewing saved run
//! tables.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{check, periods, runs, show};
use segmenter_lib::SegmenterMetrics;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pod Run Segmenter CLI
#[derive(Parser)]
#[command(name = "kseg")]
#[command(author, version, about = "CLI for the Pod Run Segmenter", long_about = None)]
pub struct Cli {
    /// Prometheus server URL (can also be set via KSEG_PROMETHEUS_URL env var)
    #[arg(long, env = "KSEG_PROMETHEUS_URL", global = true)]
    pub prometheus_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print segmenter metrics after the command completes
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find runs of pods matching a label filter
    Runs {
        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Show run boundaries as seconds since the epoch
        #[arg(long)]
        raw: bool,

        /// Write the run table to a CSV file
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Show the coarse activity windows that would be queried
    Periods {
        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Read activity history from a CSV file instead of Prometheus
        #[arg(long)]
        history: Option<String>,

        /// Show window boundaries as seconds since the epoch
        #[arg(long)]
        raw: bool,
    },

    /// Designate runs from a fine-grained history CSV without querying Prometheus
    Segment {
        /// History CSV (label columns, time, optional cpu_usage)
        history: String,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Show run boundaries as seconds since the epoch
        #[arg(long)]
        raw: bool,

        /// Write the run table to a CSV file
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Check that Prometheus is reachable and count matching series
    Check {
        #[command(flatten)]
        filter: FilterArgs,

        /// Counter to look for
        #[arg(long)]
        metric: Option<String>,
    },

    /// Show a saved run table
    Show {
        /// Run table CSV file
        path: String,

        /// Show run boundaries as seconds since the epoch
        #[arg(long, conflicts_with = "calendar")]
        raw: bool,

        /// Show run boundaries as UTC datetimes
        #[arg(long)]
        calendar: bool,
    },
}

/// Label filter flags
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Namespace the pods live in
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Exact pod name
    #[arg(long, conflicts_with = "pod_regex")]
    pub pod: Option<String>,

    /// Pod name regular expression
    #[arg(long)]
    pub pod_regex: Option<String>,

    /// Exact node name
    #[arg(long, conflicts_with = "node_regex")]
    pub node: Option<String>,

    /// Node name regular expression
    #[arg(long)]
    pub node_regex: Option<String>,
}

/// Time window flags
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Window start: a datetime, epoch seconds, or a duration ago (e.g. 7d)
    #[arg(long, default_value = "7d")]
    pub start: String,

    /// Window end: a datetime, epoch seconds, a duration ago, or "now"
    #[arg(long, default_value = "now")]
    pub end: String,
}

/// Segmentation tuning flags
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Fine query resolution (e.g. 10m)
    #[arg(long)]
    pub timestep: Option<String>,

    /// Minimum inactivity that separates runs (e.g. 1h)
    #[arg(long)]
    pub min_break: Option<String>,

    /// Per-query timeout (e.g. 60s)
    #[arg(long)]
    pub timeout: Option<String>,

    /// Label groups segmented concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Counter whose increase marks activity
    #[arg(long)]
    pub metric: Option<String>,
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    // Layered settings: config file, KSEG_* env, then flags
    let settings = config::CliConfig::load()?;

    match cli.command {
        Commands::Runs {
            filter,
            window,
            tuning,
            raw,
            output,
        } => {
            let url = settings.prometheus_url(cli.prometheus_url.as_deref());
            let config = settings.segmenter_config(filter.namespace.as_deref(), &tuning, raw)?;
            runs::find_runs(&settings, &url, &filter, &window, config, output, cli.format).await?;
        }
        Commands::Periods {
            filter,
            window,
            history,
            raw,
        } => match history {
            Some(path) => periods::show_history_periods(&path, raw, cli.format)?,
            None => {
                let url = settings.prometheus_url(cli.prometheus_url.as_deref());
                let config =
                    settings.segmenter_config(filter.namespace.as_deref(), &TuningArgs::default(), raw)?;
                periods::show_periods(&settings, &url, &filter, &window, config, cli.format).await?;
            }
        },
        Commands::Segment {
            history,
            tuning,
            raw,
            output,
        } => {
            let config = settings.segmenter_config(None, &tuning, raw)?;
            runs::segment_history_file(&history, config, output, cli.format)?;
        }
        Commands::Check { filter, metric } => {
            let url = settings.prometheus_url(cli.prometheus_url.as_deref());
            let tuning = TuningArgs {
                metric,
                ..Default::default()
            };
            let config = settings.segmenter_config(filter.namespace.as_deref(), &tuning, false)?;
            check::check_connection(&settings, &url, &filter, config, cli.format).await?;
        }
        Commands::Show { path, raw, calendar } => {
            show::show_table(&path, raw, calendar, cli.format)?;
        }
    }

    if cli.metrics {
        eprintln!("{}", SegmenterMetrics::new().render());
    }

    Ok(())
}
