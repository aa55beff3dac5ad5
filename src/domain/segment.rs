// Segment builder - turns sparse state changes into a step function over the window
use super::history::{parse_numeric_state, HistoryRecord, Window};
use chrono::{DateTime, Utc};

/// A span over which the entity value is constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<V> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: V,
}

impl<V> Segment<V> {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, value: V) -> Self {
        Self { start, end, value }
    }
}

/// Records with their state parsed as a number; unparsable states become `None`.
pub fn numeric_points(records: &[HistoryRecord]) -> Vec<(DateTime<Utc>, Option<f64>)> {
    records
        .iter()
        .map(|r| (r.timestamp, parse_numeric_state(&r.raw_state)))
        .collect()
}

/// Records with their raw state kept for classification downstream.
pub fn raw_points(records: &[HistoryRecord]) -> Vec<(DateTime<Utc>, String)> {
    records
        .iter()
        .map(|r| (r.timestamp, r.raw_state.clone()))
        .collect()
}

/// Build the ordered, gap-free segment list tiling `[window.start, window.end)`.
///
/// Points at or before the window start only establish the carried-in value.
/// The first known value is also used for the span before the first in-window
/// change. Points at or after the window end are ignored. With no usable points
/// the whole window takes `live_value`. An empty window yields no segments.
pub fn build_segments<V: Clone>(
    mut points: Vec<(DateTime<Utc>, V)>,
    window: &Window,
    live_value: V,
) -> Vec<Segment<V>> {
    if window.is_empty() {
        return Vec::new();
    }

    points.retain(|(t, _)| *t < window.end);
    // sort_by_key is stable, so duplicate timestamps keep arrival order
    points.sort_by_key(|(t, _)| *t);

    let Some((_, first)) = points.first() else {
        return vec![Segment::new(window.start, window.end, live_value)];
    };

    let mut segments = Vec::new();
    let mut current = first.clone();
    let mut cursor = window.start;

    for (timestamp, value) in points {
        if timestamp <= cursor {
            current = value;
            continue;
        }
        segments.push(Segment::new(cursor, timestamp, current));
        current = value;
        cursor = timestamp;
    }

    if cursor < window.end {
        segments.push(Segment::new(cursor, window.end, current));
    }

    segments
}
