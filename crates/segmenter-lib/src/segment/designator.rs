//! Run boundary designation
//!
//! Partitions a sorted sequence of activity timestamps into runs separated
//! by inactivity gaps of at least `min_break_seconds`. Each timestamp is the
//! end of an aggregation window of `aggregate_period_seconds`, so run starts
//! are pulled back by one aggregation period.

use crate::error::{SegmenterError, SegmenterResult};
use serde::{Deserialize, Serialize};

/// Parameters for run designation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Minimum inactivity that separates two runs
    pub min_break_seconds: f64,
    /// Width of the window each sample represents
    pub aggregate_period_seconds: f64,
}

impl RunParams {
    pub fn new(min_break_seconds: f64, aggregate_period_seconds: f64) -> Self {
        Self {
            min_break_seconds,
            aggregate_period_seconds,
        }
    }
}

/// A designated run as a `(start, end)` interval in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

/// Partition ascending timestamps into runs
///
/// Requires at least two timestamps. A gap counts as a break when
/// `t - (prev - aggregate_period) >= min_break`.
pub fn designate_runs(times: &[f64], params: RunParams) -> SegmenterResult<Vec<Interval>> {
    if times.len() < 2 {
        return Err(SegmenterError::InsufficientPoints { count: times.len() });
    }

    let agg = params.aggregate_period_seconds;
    let last = times[times.len() - 1];

    let mut runs: Vec<Interval> = Vec::new();
    let mut run_start = times[0];
    let mut prev_time = times[0];

    for &t in &times[1..] {
        let inactive_period = t - (prev_time - agg);
        if inactive_period >= params.min_break_seconds {
            runs.push(Interval {
                start: run_start - agg,
                end: prev_time,
            });
            run_start = t;
        }
        prev_time = t;
    }

    // A boundary on the final sample can already have closed at `last`
    if runs.last().map_or(true, |r| r.end != last) {
        runs.push(Interval {
            start: run_start - agg,
            end: last,
        });
    }

    Ok(runs)
}
