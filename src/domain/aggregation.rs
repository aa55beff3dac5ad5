// Bucket aggregation - time-weighted aggregates of a step function over fixed buckets
use super::classification::Category;
use super::history::Window;
use super::segment::Segment;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// One fixed-width slice of the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub aggregate: Option<f64>,
    pub category: Option<Category>,
}

/// Mode-specific accumulation of segment values weighted by overlap time.
pub trait Aggregation {
    type Value;
    type Accumulator: Default;

    fn accumulate(&self, acc: &mut Self::Accumulator, value: &Self::Value, overlap_ms: f64);

    /// Turn the accumulated weight into the bucket aggregate. `bucket_ms` is
    /// always positive.
    fn finalize(&self, acc: Self::Accumulator, bucket_ms: f64) -> Option<f64>;
}

/// Time-weighted mean of numeric values. Missing values carry no weight, and a
/// bucket with no weighted time has no aggregate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWeightedMean;

#[derive(Debug, Default)]
pub struct MeanAccumulator {
    mean: f64,
    weight_ms: f64,
}

impl Aggregation for TimeWeightedMean {
    type Value = Option<f64>;
    type Accumulator = MeanAccumulator;

    fn accumulate(&self, acc: &mut MeanAccumulator, value: &Option<f64>, overlap_ms: f64) {
        let Some(v) = value else {
            return;
        };
        // running form keeps a constant input exact: the first step scales by 1.0
        acc.weight_ms += overlap_ms;
        acc.mean += (v - acc.mean) * (overlap_ms / acc.weight_ms);
    }

    fn finalize(&self, acc: MeanAccumulator, _bucket_ms: f64) -> Option<f64> {
        (acc.weight_ms > 0.0).then_some(acc.mean)
    }
}

/// Percentage of the bucket spent in a qualifying state. Time without data
/// counts as not qualifying, so the result is always defined.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifyingFraction {
    ok_states: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct UpAccumulator {
    up_ms: f64,
}

impl QualifyingFraction {
    pub fn new<I, S>(ok_states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ok_states: ok_states.into_iter().map(Into::into).collect(),
        }
    }

    pub fn qualifies(&self, state: &str) -> bool {
        self.ok_states.contains(state)
    }
}

impl Aggregation for QualifyingFraction {
    type Value = String;
    type Accumulator = UpAccumulator;

    fn accumulate(&self, acc: &mut UpAccumulator, value: &String, overlap_ms: f64) {
        if self.qualifies(value) {
            acc.up_ms += overlap_ms;
        }
    }

    fn finalize(&self, acc: UpAccumulator, bucket_ms: f64) -> Option<f64> {
        Some(acc.up_ms * 100.0 / bucket_ms)
    }
}

/// Length of the intersection of two spans, zero when disjoint.
pub fn overlap_ms(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Split the window into `bucket_count` equal buckets and aggregate each one
/// against the segments with `strategy`. Categories are left unresolved.
pub fn aggregate_buckets<A: Aggregation>(
    segments: &[Segment<A::Value>],
    window: &Window,
    bucket_count: usize,
    strategy: &A,
) -> Vec<Bucket> {
    if bucket_count == 0 || window.is_empty() {
        return Vec::new();
    }

    let total_ms = window.duration_ms();
    let bucket_ms = total_ms / bucket_count as f64;
    let spans: Vec<(f64, f64)> = segments
        .iter()
        .map(|s| (window.offset_ms(s.start), window.offset_ms(s.end)))
        .collect();

    (0..bucket_count)
        .map(|index| {
            let last = index + 1 == bucket_count;
            let b_start = index as f64 * bucket_ms;
            let b_end = if last { total_ms } else { (index + 1) as f64 * bucket_ms };

            let mut acc = A::Accumulator::default();
            for (segment, &(s_start, s_end)) in segments.iter().zip(&spans) {
                let overlap = overlap_ms(s_start, s_end, b_start, b_end);
                if overlap <= 0.0 {
                    continue;
                }
                strategy.accumulate(&mut acc, &segment.value, overlap);
            }

            Bucket {
                index,
                start: window.instant_at(b_start),
                end: if last { window.end } else { window.instant_at(b_end) },
                aggregate: strategy.finalize(acc, b_end - b_start),
                category: None,
            }
        })
        .collect()
}

/// Aggregate over the whole window treated as a single bucket.
pub fn summarize<A: Aggregation>(
    segments: &[Segment<A::Value>],
    window: &Window,
    strategy: &A,
) -> Option<f64> {
    aggregate_buckets(segments, window, 1, strategy)
        .first()
        .and_then(|b| b.aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::{build_segments, numeric_points, raw_points};
    use crate::domain::history::HistoryRecord;
    use chrono::{Duration, TimeZone};

    fn window() -> Window {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Window::ending_at(end, Duration::minutes(100))
    }

    fn at(window: &Window, minutes: i64) -> DateTime<Utc> {
        window.start + Duration::minutes(minutes)
    }

    fn aggregates(buckets: &[Bucket]) -> Vec<Option<f64>> {
        buckets.iter().map(|b| b.aggregate).collect()
    }

    #[test]
    fn test_step_on_bucket_boundary() {
        let w = window();
        let records = vec![HistoryRecord::new(at(&w, 50), "10"), HistoryRecord::new(at(&w, 0), "0")];
        let segments = build_segments(numeric_points(&records), &w, None);
        let buckets = aggregate_buckets(&segments, &w, 10, &TimeWeightedMean);

        assert_eq!(buckets.len(), 10);
        for bucket in &buckets[..5] {
            assert_eq!(bucket.aggregate, Some(0.0));
        }
        for bucket in &buckets[5..] {
            assert_eq!(bucket.aggregate, Some(10.0));
        }
        assert_eq!(buckets[0].start, w.start);
        assert_eq!(buckets[5].start, at(&w, 50));
        assert_eq!(buckets[9].end, w.end);
    }

    #[test]
    fn test_constant_value_is_exact_in_every_bucket() {
        let w = window();
        let segments = vec![Segment::new(w.start, w.end, Some(0.1))];

        // 7 buckets do not divide the window evenly
        for bucket in aggregate_buckets(&segments, &w, 7, &TimeWeightedMean) {
            assert_eq!(bucket.aggregate, Some(0.1));
        }
    }

    #[test]
    fn test_live_value_fills_every_bucket() {
        let w = window();
        let numeric = build_segments(numeric_points(&[]), &w, Some(42.0));
        let buckets = aggregate_buckets(&numeric, &w, 50, &TimeWeightedMean);
        assert!(buckets.iter().all(|b| b.aggregate == Some(42.0)));

        let raw = build_segments(raw_points(&[]), &w, "42".to_string());
        let buckets = aggregate_buckets(&raw, &w, 50, &QualifyingFraction::new(["42"]));
        assert!(buckets.iter().all(|b| b.aggregate == Some(100.0)));
    }

    #[test]
    fn test_missing_values_carry_no_weight() {
        let w = window();
        let segments = vec![
            Segment::new(w.start, at(&w, 5), Some(4.0)),
            Segment::new(at(&w, 5), at(&w, 15), None),
            Segment::new(at(&w, 15), w.end, Some(8.0)),
        ];
        let buckets = aggregate_buckets(&segments, &w, 10, &TimeWeightedMean);

        // [0,10): only the 5 minutes at 4.0 count, not the 5 missing minutes
        assert_eq!(buckets[0].aggregate, Some(4.0));
        // [10,20): 5 missing minutes then 5 minutes at 8.0
        assert_eq!(buckets[1].aggregate, Some(8.0));
    }

    #[test]
    fn test_weighted_mean_of_mixed_bucket() {
        let w = window();
        let segments = vec![
            Segment::new(w.start, at(&w, 3), Some(10.0)),
            Segment::new(at(&w, 3), w.end, Some(20.0)),
        ];
        let buckets = aggregate_buckets(&segments, &w, 10, &TimeWeightedMean);

        let first = buckets[0].aggregate.unwrap();
        assert!((first - 17.0).abs() < 1e-9, "got {first}");
    }

    #[test]
    fn test_unparsable_history_has_no_aggregates() {
        let w = window();
        let records = vec![
            HistoryRecord::new(at(&w, 0), "unavailable"),
            HistoryRecord::new(at(&w, 40), "unavailable"),
        ];
        let segments = build_segments(numeric_points(&records), &w, None);
        let buckets = aggregate_buckets(&segments, &w, 10, &TimeWeightedMean);

        assert!(buckets.iter().all(|b| b.aggregate.is_none()));
        assert_eq!(summarize(&segments, &w, &TimeWeightedMean), None);
    }

    #[test]
    fn test_uptime_on_bucket_boundaries() {
        let w = window();
        let records = vec![
            HistoryRecord::new(at(&w, 0), "off"),
            HistoryRecord::new(at(&w, 20), "on"),
            HistoryRecord::new(at(&w, 70), "off"),
        ];
        let segments = build_segments(raw_points(&records), &w, "off".to_string());
        let buckets = aggregate_buckets(&segments, &w, 10, &QualifyingFraction::new(["on"]));

        assert_eq!(
            aggregates(&buckets),
            vec![
                Some(0.0),
                Some(0.0),
                Some(100.0),
                Some(100.0),
                Some(100.0),
                Some(100.0),
                Some(100.0),
                Some(0.0),
                Some(0.0),
                Some(0.0),
            ]
        );
        assert_eq!(summarize(&segments, &w, &QualifyingFraction::new(["on"])), Some(50.0));
    }

    #[test]
    fn test_uptime_straddling_bucket_is_proportional() {
        let w = window();
        let records = vec![
            HistoryRecord::new(at(&w, 0), "off"),
            HistoryRecord::new(at(&w, 27), "on"),
            HistoryRecord::new(at(&w, 75), "off"),
        ];
        let segments = build_segments(raw_points(&records), &w, "off".to_string());
        let buckets = aggregate_buckets(&segments, &w, 10, &QualifyingFraction::new(["on"]));

        assert_eq!(buckets[1].aggregate, Some(0.0));
        assert_eq!(buckets[2].aggregate, Some(30.0));
        assert_eq!(buckets[3].aggregate, Some(100.0));
        assert_eq!(buckets[7].aggregate, Some(50.0));
        assert_eq!(buckets[8].aggregate, Some(0.0));
    }

    #[test]
    fn test_uptime_without_qualifying_data_is_zero_not_missing() {
        let w = window();
        let segments = build_segments(raw_points(&[]), &w, "unavailable".to_string());
        let buckets = aggregate_buckets(&segments, &w, 5, &QualifyingFraction::new(["on"]));

        assert!(buckets.iter().all(|b| b.aggregate == Some(0.0)));
    }

    #[test]
    fn test_overlap_partitions_each_segment() {
        let w = window();
        let segments = vec![
            Segment::new(w.start, at(&w, 13), Some(1.0)),
            Segment::new(at(&w, 13), at(&w, 61), Some(2.0)),
            Segment::new(at(&w, 61), w.end, Some(3.0)),
        ];

        for bucket_count in [1, 7, 10, 50] {
            let buckets = aggregate_buckets(&segments, &w, bucket_count, &TimeWeightedMean);
            for s in &segments {
                let (s_start, s_end) = (w.offset_ms(s.start), w.offset_ms(s.end));
                let total: f64 = buckets
                    .iter()
                    .map(|b| overlap_ms(s_start, s_end, w.offset_ms(b.start), w.offset_ms(b.end)))
                    .sum();
                let expected = s_end.min(w.duration_ms()) - s_start.max(0.0);
                assert!((total - expected).abs() < 1e-2, "{bucket_count} buckets: {total} != {expected}");
            }
        }
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let w = window();
        let records = vec![
            HistoryRecord::new(at(&w, 3), "1.7"),
            HistoryRecord::new(at(&w, 41), "8.25"),
            HistoryRecord::new(at(&w, 17), "unknown"),
            HistoryRecord::new(at(&w, 88), "-2.5"),
        ];
        let run = || {
            let segments = build_segments(numeric_points(&records), &w, None);
            aggregate_buckets(&segments, &w, 13, &TimeWeightedMean)
        };
        let first: Vec<Option<u64>> = run().iter().map(|b| b.aggregate.map(f64::to_bits)).collect();
        let second: Vec<Option<u64>> = run().iter().map(|b| b.aggregate.map(f64::to_bits)).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_degenerate_inputs_yield_no_buckets() {
        let w = window();
        let segments = vec![Segment::new(w.start, w.end, Some(1.0))];

        assert!(aggregate_buckets(&segments, &w, 0, &TimeWeightedMean).is_empty());
        assert!(aggregate_buckets(&segments, &Window::new(w.end, w.end), 10, &TimeWeightedMean).is_empty());
        assert_eq!(summarize(&segments, &Window::new(w.end, w.end), &TimeWeightedMean), None);
    }
}
