// Classification - maps bucket aggregates to plot coordinates or status colors
use super::aggregation::Bucket;
use serde::Serialize;

pub const DEFAULT_ABOVE_COLOR: &str = "#4caf50";
pub const DEFAULT_BELOW_COLOR: &str = "#f44336";
const FALLBACK_SPLIT_PCT: f64 = 50.0;

/// Display category resolved from a bucket aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Category {
    /// Normalized y coordinate on the sparkline plot.
    PlotY(f64),
    /// Status color for the uptime strip.
    Color(String),
}

impl Category {
    pub fn plot_y(&self) -> Option<f64> {
        match self {
            Category::PlotY(y) => Some(*y),
            Category::Color(_) => None,
        }
    }
}

/// Value range a numeric scale maps onto the plot height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericScale {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub plot_height: f64,
}

impl NumericScale {
    pub fn new(min: Option<f64>, max: Option<f64>, plot_height: f64) -> Self {
        Self { min, max, plot_height }
    }

    /// Range over the non-missing aggregates, with configured bounds taking
    /// precedence. Defaults to `[0, 1]` without data and widens a flat range by
    /// one unit each way.
    pub fn range(&self, buckets: &[Bucket]) -> ScaleRange {
        let observed = buckets.iter().filter_map(|b| b.aggregate).fold(None, |acc, v| {
            Some(match acc {
                None => (v, v),
                Some((lo, hi)) => (f64::min(lo, v), f64::max(hi, v)),
            })
        });
        let (auto_min, auto_max) = observed.unwrap_or((0.0, 1.0));
        let min = self.min.unwrap_or(auto_min);
        let max = self.max.unwrap_or(auto_max);

        if max <= min {
            // a configured bound on one side can also invert the range
            return ScaleRange {
                min: min - 1.0,
                max: min + 1.0,
            };
        }
        ScaleRange { min, max }
    }

    pub fn plot_y(&self, aggregate: f64, range: ScaleRange) -> f64 {
        self.plot_height - ((aggregate - range.min) / (range.max - range.min)) * self.plot_height
    }

    /// Resolve every bucket with an aggregate to its plot y. Buckets without
    /// one stay uncategorized and render as a gap.
    pub fn classify(&self, buckets: &mut [Bucket]) -> ScaleRange {
        let range = self.range(buckets);
        for bucket in buckets.iter_mut() {
            bucket.category = bucket
                .aggregate
                .map(|v| Category::PlotY(self.plot_y(v, range)));
        }
        range
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdStep {
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPolicy {
    steps: Vec<ThresholdStep>,
    above: String,
    below: String,
}

impl ThresholdPolicy {
    pub fn new(mut steps: Vec<ThresholdStep>, above: String, below: String) -> Self {
        steps.sort_by(|a, b| a.value.total_cmp(&b.value));
        Self { steps, above, below }
    }

    pub fn steps(&self) -> &[ThresholdStep] {
        &self.steps
    }

    /// Color for a percentage: the first step at or above it, the highest step
    /// when the percentage exceeds every step, or the 50% split without steps.
    pub fn color_for(&self, pct: f64) -> &str {
        if self.steps.is_empty() {
            return if pct >= FALLBACK_SPLIT_PCT { self.above.as_str() } else { self.below.as_str() };
        }
        self.steps
            .iter()
            .find(|s| s.value >= pct)
            .or_else(|| self.steps.last())
            .map(|s| s.color.as_str())
            .unwrap_or(&self.below)
    }

    pub fn classify(&self, buckets: &mut [Bucket]) {
        for bucket in buckets.iter_mut() {
            let pct = bucket.aggregate.unwrap_or(0.0);
            bucket.category = Some(Category::Color(self.color_for(pct).to_string()));
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(
            Vec::new(),
            DEFAULT_ABOVE_COLOR.to_string(),
            DEFAULT_BELOW_COLOR.to_string(),
        )
    }
}
