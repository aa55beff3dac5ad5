// Widget pipeline - records, window and widget settings in; buckets, runs and summary out
use super::aggregation::{aggregate_buckets, summarize, Bucket, QualifyingFraction, TimeWeightedMean};
use super::classification::{NumericScale, ScaleRange, ThresholdPolicy};
use super::history::{parse_numeric_state, EntityHistory, Window};
use super::runs::{coalesce, divider_offsets, Run};
use super::segment::{build_segments, numeric_points, raw_points};
use super::sparkline::sparkline_path;
use chrono::Duration;
use serde::Serialize;

pub const DEFAULT_BUCKET_COUNT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetMode {
    /// Sparkline of the time-weighted mean.
    Numeric { scale: NumericScale, plot_width: f64 },
    /// Status strip of the share of time spent in a qualifying state.
    Uptime {
        fraction: QualifyingFraction,
        thresholds: ThresholdPolicy,
    },
}

impl WidgetMode {
    pub fn name(&self) -> &'static str {
        match self {
            WidgetMode::Numeric { .. } => "numeric",
            WidgetMode::Uptime { .. } => "uptime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WidgetSpec {
    pub id: String,
    pub entity: String,
    pub span: Duration,
    pub bucket_count: usize,
    pub refresh_interval: std::time::Duration,
    pub mode: WidgetMode,
}

impl WidgetSpec {
    pub fn window_ending_at(&self, end: chrono::DateTime<chrono::Utc>) -> Window {
        Window::ending_at(end, self.span)
    }
}

/// Everything one refresh produces for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetSnapshot {
    pub window: Window,
    pub buckets: Vec<Bucket>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runs: Vec<Run>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dividers: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<ScaleRange>,
    pub summary: Option<f64>,
    pub unit: Option<String>,
    pub live_state: Option<String>,
    pub record_count: usize,
}

/// Run the full engine for one widget. Pure: identical inputs give identical output.
pub fn compute(
    history: &EntityHistory,
    window: &Window,
    live_state: Option<&str>,
    spec: &WidgetSpec,
) -> WidgetSnapshot {
    let mut snapshot = WidgetSnapshot {
        window: *window,
        buckets: Vec::new(),
        runs: Vec::new(),
        dividers: Vec::new(),
        path: None,
        range: None,
        summary: None,
        unit: history.unit.clone(),
        live_state: live_state.map(str::to_string),
        record_count: history.records.len(),
    };

    match &spec.mode {
        WidgetMode::Numeric { scale, plot_width } => {
            let live_value = live_state.and_then(parse_numeric_state);
            let segments = build_segments(numeric_points(&history.records), window, live_value);
            let mut buckets = aggregate_buckets(&segments, window, spec.bucket_count, &TimeWeightedMean);

            snapshot.range = Some(scale.classify(&mut buckets));
            snapshot.path = Some(sparkline_path(&buckets, *plot_width));
            snapshot.summary = summarize(&segments, window, &TimeWeightedMean);
            snapshot.buckets = buckets;
        }
        WidgetMode::Uptime { fraction, thresholds } => {
            let live_value = live_state.unwrap_or_default().to_string();
            let segments = build_segments(raw_points(&history.records), window, live_value);
            let mut buckets = aggregate_buckets(&segments, window, spec.bucket_count, fraction);
            thresholds.classify(&mut buckets);

            snapshot.runs = coalesce(&buckets);
            snapshot.dividers = divider_offsets(&snapshot.runs);
            snapshot.summary = summarize(&segments, window, fraction);
            snapshot.buckets = buckets;
        }
    }

    snapshot
}
