// Run coalescing - consecutive buckets sharing a category collapse into one run
use super::aggregation::Bucket;
use super::classification::Category;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    pub category: Category,
    pub bucket_count: usize,
}

/// Collapse buckets into runs in index order. Uncategorized buckets are
/// skipped; in uptime mode every bucket carries a color.
pub fn coalesce(buckets: &[Bucket]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();

    for category in buckets.iter().filter_map(|b| b.category.as_ref()) {
        match runs.last_mut() {
            Some(run) if run.category == *category => run.bucket_count += 1,
            _ => runs.push(Run {
                category: category.clone(),
                bucket_count: 1,
            }),
        }
    }

    runs
}

/// Bucket indices where a run boundary falls, i.e. where dividers are drawn.
pub fn divider_offsets(runs: &[Run]) -> Vec<usize> {
    runs.iter()
        .scan(0, |offset, run| {
            *offset += run.bucket_count;
            Some(*offset)
        })
        .take(runs.len().saturating_sub(1))
        .collect()
}

/// Per-bucket category sequence a run list stands for.
pub fn expand(runs: &[Run]) -> Vec<Category> {
    runs.iter()
        .flat_map(|run| std::iter::repeat_n(run.category.clone(), run.bucket_count))
        .collect()
}
