// Sparkline path - SVG path data for numeric buckets
use super::aggregation::Bucket;
use std::fmt::Write;

/// Build the `d` attribute for the sparkline. Buckets are placed at their
/// centers across `plot_width`; a bucket without a plot y breaks the line, so
/// the next point opens a new subpath. No plotted buckets gives an empty string.
pub fn sparkline_path(buckets: &[Bucket], plot_width: f64) -> String {
    if buckets.is_empty() {
        return String::new();
    }

    let step = plot_width / buckets.len() as f64;
    let mut path = String::new();
    let mut pen_down = false;

    for bucket in buckets {
        let Some(y) = bucket.category.as_ref().and_then(|c| c.plot_y()) else {
            pen_down = false;
            continue;
        };
        let x = (bucket.index as f64 + 0.5) * step;
        let command = if pen_down { 'L' } else { 'M' };
        if !path.is_empty() {
            path.push(' ');
        }
        // writing to a String cannot fail
        let _ = write!(path, "{command}{x:.2},{y:.2}");
        pen_down = true;
    }

    path
}
