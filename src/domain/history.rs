// History domain models - raw state-change records and the visualized window
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// One state change reported by the host. Order is not guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub raw_state: String,
}

impl HistoryRecord {
    pub fn new(timestamp: DateTime<Utc>, raw_state: impl Into<String>) -> Self {
        Self {
            timestamp,
            raw_state: raw_state.into(),
        }
    }
}

/// History for one entity as returned by a single fetch.
#[derive(Debug, Clone, Default)]
pub struct EntityHistory {
    pub records: Vec<HistoryRecord>,
    pub unit: Option<String>,
}

/// Current state of an entity, independent of history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveState {
    pub state: String,
    pub unit: Option<String>,
}

/// Time span being visualized, ending at the refresh instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `span` ending at `end`. Empty when the start would fall
    /// outside the representable range.
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        Self {
            start: end.checked_sub_signed(span).unwrap_or(end),
            end,
        }
    }

    /// Span in milliseconds; zero for an empty or inverted window.
    pub fn duration_ms(&self) -> f64 {
        millis_between(self.start, self.end).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Offset of `t` from the window start, in milliseconds.
    pub fn offset_ms(&self, t: DateTime<Utc>) -> f64 {
        millis_between(self.start, t)
    }

    /// Instant at `offset_ms` past the window start, at microsecond resolution.
    pub fn instant_at(&self, offset_ms: f64) -> DateTime<Utc> {
        self.start + Duration::microseconds((offset_ms * 1000.0).round() as i64)
    }
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .num_microseconds()
        .map(|us| us as f64 / 1000.0)
        .unwrap_or_else(|| (to - from).num_milliseconds() as f64)
}

/// Parse a numeric entity state. Non-finite and non-numeric states
/// ("unavailable", "unknown", "") map to `None`.
pub fn parse_numeric_state(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
