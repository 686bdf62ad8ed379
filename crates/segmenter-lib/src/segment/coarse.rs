//! Coarse period detection
//!
//! Turns a daily activity history into padded windows that bound the
//! follow-up fine-grained queries. Timestamps closer than three pads are
//! merged into one window.

use crate::models::{ActivityPoint, CoarsePeriod, LabelKey};
use std::collections::BTreeMap;

/// Padding applied on each side of a coarse window (one day)
pub const PAD_SECS: f64 = 86_400.0;

/// Gaps of at least this many seconds split two coarse windows
pub const MERGE_THRESHOLD_SECS: f64 = 3.0 * PAD_SECS;

/// Find padded windows covering every timestamp of one label group
///
/// Timestamps need not be sorted; duplicates collapse to a single point.
/// An empty input yields no windows.
pub fn find_coarse_periods(label_key: &LabelKey, timestamps: &[f64]) -> Vec<CoarsePeriod> {
    let mut times: Vec<f64> = timestamps.iter().copied().filter(|t| t.is_finite()).collect();
    times.sort_by(f64::total_cmp);
    times.dedup();

    let (first, rest) = match times.split_first() {
        Some(split) => split,
        None => return Vec::new(),
    };

    let mut periods = Vec::new();
    let mut window_start = first - PAD_SECS;
    let mut previous = *first;

    for &current in rest {
        if current - previous >= MERGE_THRESHOLD_SECS {
            periods.push(CoarsePeriod {
                label_key: label_key.clone(),
                start: window_start,
                end: previous + PAD_SECS,
            });
            window_start = current - PAD_SECS;
        }
        previous = current;
    }

    periods.push(CoarsePeriod {
        label_key: label_key.clone(),
        start: window_start,
        end: previous + PAD_SECS,
    });

    periods
}

/// Split activity points into label groups and find each group's windows
pub fn coarse_periods_by_group(points: &[ActivityPoint]) -> BTreeMap<LabelKey, Vec<CoarsePeriod>> {
    group_timestamps(points)
        .into_iter()
        .map(|(key, times)| {
            let periods = find_coarse_periods(&key, &times);
            (key, periods)
        })
        .collect()
}

/// Collect timestamps per label group
pub fn group_timestamps(points: &[ActivityPoint]) -> BTreeMap<LabelKey, Vec<f64>> {
    let mut groups: BTreeMap<LabelKey, Vec<f64>> = BTreeMap::new();
    for point in points {
        groups
            .entry(point.label_key.clone())
            .or_default()
            .push(point.timestamp);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str) -> LabelKey {
        LabelKey::new().with("pod", name)
    }

    fn spans(periods: &[CoarsePeriod]) -> Vec<(f64, f64)> {
        periods.iter().map(|p| (p.start, p.end)).collect()
    }

    #[test]
    fn test_empty_group_has_no_windows() {
        assert!(find_coarse_periods(&pod("a"), &[]).is_empty());
    }

    #[test]
    fn test_single_timestamp_window_is_two_pads_wide() {
        let periods = find_coarse_periods(&pod("a"), &[1_000.0]);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].width(), 2.0 * PAD_SECS);
        assert_eq!(periods[0].start, 1_000.0 - PAD_SECS);
    }

    #[test]
    fn test_days_five_apart_split() {
        let periods = find_coarse_periods(&pod("a"), &[0.0, 5.0 * PAD_SECS]);
        assert_eq!(
            spans(&periods),
            vec![
                (-PAD_SECS, PAD_SECS),
                (5.0 * PAD_SECS - PAD_SECS, 5.0 * PAD_SECS + PAD_SECS)
            ]
        );
    }

    #[test]
    fn test_nearby_days_merge() {
        let times = [0.0, PAD_SECS, 2.0 * PAD_SECS, 2.5 * PAD_SECS];
        let periods = find_coarse_periods(&pod("a"), &times);
        assert_eq!(spans(&periods), vec![(-PAD_SECS, 3.5 * PAD_SECS)]);
    }

    #[test]
    fn test_gap_of_exactly_three_pads_splits() {
        let periods = find_coarse_periods(&pod("a"), &[0.0, MERGE_THRESHOLD_SECS]);
        assert_eq!(periods.len(), 2);
    }

    #[test]
    fn test_unsorted_and_duplicate_input() {
        let times = [10.0 * PAD_SECS, 0.0, 0.0, PAD_SECS, 10.0 * PAD_SECS];
        let periods = find_coarse_periods(&pod("a"), &times);
        assert_eq!(
            spans(&periods),
            vec![(-PAD_SECS, 2.0 * PAD_SECS), (9.0 * PAD_SECS, 11.0 * PAD_SECS)]
        );
    }

    #[test]
    fn test_every_timestamp_covered_by_exactly_one_window() {
        let times: Vec<f64> = [0.0, 1.0, 2.0, 7.0, 8.0, 20.0, 22.5, 40.0]
            .iter()
            .map(|d| d * PAD_SECS)
            .collect();
        let periods = find_coarse_periods(&pod("a"), &times);

        for t in &times {
            let covering = periods.iter().filter(|p| p.contains(*t)).count();
            assert_eq!(covering, 1, "timestamp {} covered {} times", t, covering);
        }

        for pair in periods.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn test_groups_are_independent() {
        let points = vec![
            ActivityPoint::new(pod("a"), 0.0, 1.0),
            ActivityPoint::new(pod("b"), 0.0, 1.0),
            ActivityPoint::new(pod("b"), 10.0 * PAD_SECS, 1.0),
        ];
        let groups = coarse_periods_by_group(&points);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&pod("a")].len(), 1);
        assert_eq!(groups[&pod("b")].len(), 2);
        assert!(groups[&pod("b")].iter().all(|p| p.label_key == pod("b")));
    }
}
