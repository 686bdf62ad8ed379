//! Run segmentation pipeline
//!
//! Converts a sparse activity history into discrete runs in four stages:
//! - coarse windows padded around active days
//! - fine-grained activity queried inside each window
//! - run boundaries designated from inactivity gaps
//! - orchestration across independent label groups

mod coarse;
mod designator;
mod fine;
mod orchestrator;
mod progress;

pub use coarse::{
    coarse_periods_by_group, find_coarse_periods, group_timestamps, MERGE_THRESHOLD_SECS, PAD_SECS,
};
pub use designator::{designate_runs, Interval, RunParams};
pub use fine::{FineActivity, FinePeriodQuerier};
pub use orchestrator::{
    segment_fine_history, segment_group, GroupOutcome, GroupState, RunSegmenter,
};
pub use progress::{Progress, ProgressFn, ProgressReporter};
