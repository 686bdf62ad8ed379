//! Run table persistence
//!
//! Run tables are stored as CSV with one column per label, then `start` and
//! `end`. Calendar timestamps are written as `YYYY-MM-DD HH:MM:SS` (UTC);
//! raw mode writes seconds since the epoch. Readers accept any of the
//! supported calendar formats as well as raw seconds.

use crate::error::{SegmenterError, SegmenterResult};
use crate::models::{ActivityPoint, DisplayMode, LabelKey, Run};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Format used when writing calendar timestamps
pub const CALENDAR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Calendar formats accepted when reading
const ACCEPTED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%m/%d/%Y, %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

const START_COLUMN: &str = "start";
const END_COLUMN: &str = "end";
const TIME_COLUMN: &str = "time";
const VALUE_COLUMN: &str = "cpu_usage";

/// Sorted collection of runs with a presentation mode
#[derive(Debug, Clone, PartialEq)]
pub struct RunTable {
    runs: Vec<Run>,
    display_mode: DisplayMode,
}

/// One run with its boundaries formatted for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub labels: LabelKey,
    pub start: String,
    pub end: String,
    pub duration_secs: f64,
}

impl RunTable {
    /// Build a table, sorting runs by label group then start
    pub fn new(mut runs: Vec<Run>, display_mode: DisplayMode) -> Self {
        runs.sort_by(|a, b| {
            a.label_key
                .cmp(&b.label_key)
                .then_with(|| a.start.total_cmp(&b.start))
        });
        Self { runs, display_mode }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    /// Distinct label groups in table order
    pub fn groups(&self) -> Vec<&LabelKey> {
        let mut groups: Vec<&LabelKey> = Vec::new();
        for run in &self.runs {
            if groups.last() != Some(&&run.label_key) {
                groups.push(&run.label_key);
            }
        }
        groups
    }

    /// Sorted union of label names across all runs
    pub fn label_columns(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.runs.iter().flat_map(|r| r.label_key.names()).collect();
        names.into_iter().map(String::from).collect()
    }

    /// Runs with boundaries formatted per the display mode
    pub fn records(&self) -> Vec<RunRecord> {
        self.runs
            .iter()
            .map(|run| RunRecord {
                labels: run.label_key.clone(),
                start: format_timestamp(run.start, self.display_mode),
                end: format_timestamp(run.end, self.display_mode),
                duration_secs: run.duration_secs(),
            })
            .collect()
    }

    /// Write the table as CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> SegmenterResult<()> {
        let columns = self.label_columns();
        let mut csv_writer = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
        header.push(START_COLUMN);
        header.push(END_COLUMN);
        csv_writer.write_record(&header)?;

        for run in &self.runs {
            let mut record: Vec<String> = columns
                .iter()
                .map(|name| run.label_key.get(name).unwrap_or_default().to_string())
                .collect();
            record.push(format_timestamp(run.start, self.display_mode));
            record.push(format_timestamp(run.end, self.display_mode));
            csv_writer.write_record(&record)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> SegmenterResult<()> {
        let file = File::create(path)?;
        self.write_csv(file)
    }

    /// Read a table written by [`RunTable::write_csv`] or a compatible tool
    ///
    /// The display mode is `Raw` when every boundary is numeric.
    pub fn read_csv<R: Read>(reader: R) -> SegmenterResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let start_idx = column_index(&headers, START_COLUMN)?;
        let end_idx = column_index(&headers, END_COLUMN)?;
        let label_columns: Vec<(usize, &str)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != start_idx && *i != end_idx)
            .collect();

        let mut runs = Vec::new();
        let mut all_numeric = true;

        for result in csv_reader.records() {
            let record = result?;
            let labels = record_labels(&record, &label_columns);

            let start_raw = record.get(start_idx).unwrap_or_default();
            let end_raw = record.get(end_idx).unwrap_or_default();
            all_numeric &= is_numeric(start_raw) && is_numeric(end_raw);

            runs.push(Run::new(
                labels,
                parse_timestamp(START_COLUMN, start_raw)?,
                parse_timestamp(END_COLUMN, end_raw)?,
            ));
        }

        let mode = if all_numeric && !runs.is_empty() {
            DisplayMode::Raw
        } else {
            DisplayMode::Calendar
        };

        Ok(Self::new(runs, mode))
    }

    pub fn read_csv_path(path: impl AsRef<Path>) -> SegmenterResult<Self> {
        let file = File::open(path)?;
        Self::read_csv(file)
    }
}

/// Read an activity history table: label columns, `time`, optional `cpu_usage`
///
/// Rows whose usage is not positive are dropped.
pub fn read_history_csv<R: Read>(reader: R) -> SegmenterResult<Vec<ActivityPoint>> {
    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let time_idx = column_index(&headers, TIME_COLUMN)?;
    let value_idx = headers.iter().position(|h| h == VALUE_COLUMN);
    let label_columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != time_idx && Some(*i) != value_idx)
        .collect();

    let mut points = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let timestamp = parse_timestamp(TIME_COLUMN, record.get(time_idx).unwrap_or_default())?;

        let value = match value_idx.and_then(|i| record.get(i)) {
            Some(raw) if !raw.trim().is_empty() => {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| {
                        SegmenterError::Table(format!("invalid {} value {:?}", VALUE_COLUMN, raw))
                    })?
            }
            _ => 1.0,
        };
        if value <= 0.0 {
            continue;
        }

        points.push(ActivityPoint::new(
            record_labels(&record, &label_columns),
            timestamp,
            value,
        ));
    }

    Ok(points)
}

pub fn read_history_csv_path(path: impl AsRef<Path>) -> SegmenterResult<Vec<ActivityPoint>> {
    let file = File::open(path)?;
    read_history_csv(file)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> SegmenterResult<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| SegmenterError::Table(format!("missing {:?} column", name)))
}

fn record_labels(record: &csv::StringRecord, columns: &[(usize, &str)]) -> LabelKey {
    LabelKey::from_pairs(columns.iter().filter_map(|(i, name)| {
        record
            .get(*i)
            .filter(|v| !v.is_empty())
            .map(|v| (name.to_string(), v.to_string()))
    }))
}

fn is_numeric(raw: &str) -> bool {
    raw.trim().parse::<f64>().is_ok()
}

/// Format a timestamp for presentation
///
/// Calendar output is UTC and drops sub-second precision.
pub fn format_timestamp(timestamp: f64, mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Raw => format!("{}", timestamp),
        DisplayMode::Calendar => match DateTime::<Utc>::from_timestamp(timestamp.trunc() as i64, 0) {
            Some(dt) => dt.format(CALENDAR_FORMAT).to_string(),
            None => format!("{}", timestamp),
        },
    }
}

/// Parse raw seconds or any accepted calendar format into epoch seconds
///
/// Calendar values are read as UTC with sub-second precision truncated.
pub fn parse_timestamp(column: &str, raw: &str) -> SegmenterResult<f64> {
    let value = raw.trim();
    let invalid = || SegmenterError::InvalidTimestamp {
        column: column.to_string(),
        value: raw.to_string(),
    };

    if value.is_empty() {
        return Err(invalid());
    }

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() {
            return Ok(seconds);
        }
        return Err(invalid());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp() as f64);
    }

    let whole = strip_fraction(value.trim_end_matches('Z'));
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(whole, fmt).ok())
        .map(|dt| dt.and_utc().timestamp() as f64)
        .ok_or_else(invalid)
}

/// Drop a trailing `.ffffff` from the seconds field
fn strip_fraction(value: &str) -> &str {
    match (value.rfind('.'), value.rfind(':')) {
        (Some(dot), Some(colon)) if dot > colon => &value[..dot],
        _ => value,
    }
}
