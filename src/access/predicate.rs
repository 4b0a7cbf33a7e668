//! Predicate Compiler
//!
//! Turns optional user filters into a `QueryPlan`: the partitions to visit, the
//! smallest WHERE-equivalent clause that expresses the filters, and a fixed column
//! projection. Each node receives the clause plus an ownership guard so replica
//! rows it holds for other partitions never leak into reads.
//!
//! The top-percentile filter needs a global statistic, so it runs in two passes:
//! a score-only scan of every partition to find the threshold, then the main scan
//! with `score >= threshold` added.

use crate::algorithms::sort::merge_sort_by_key;
use crate::directory::partitioner::PartitionDirectory;
use crate::directory::types::PartitionKey;
use crate::error::{AccessError, Result};
use crate::storage::types::{NodePredicate, Projection};

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Optional filters accepted by reads. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub partition: Option<String>,
    pub id_from: Option<i64>,
    pub id_to: Option<i64>,
    pub score_min: Option<f64>,
    pub score_max: Option<f64>,
    pub presence_min: Option<f64>,
    pub presence_max: Option<f64>,
    /// Case-insensitive substring of the display name.
    pub name_contains: Option<String>,
    /// Keep only records in the top N percent by score, `0 < N <= 100`.
    pub top_percentile: Option<f64>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn id_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.id_from = from;
        self.id_to = to;
        self
    }

    pub fn score_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.score_min = min;
        self.score_max = max;
        self
    }

    pub fn presence_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.presence_min = min;
        self.presence_max = max;
        self
    }

    pub fn name_contains(mut self, keyword: &str) -> Self {
        self.name_contains = Some(keyword.to_string());
        self
    }

    pub fn top_percentile(mut self, percentile: f64) -> Self {
        self.top_percentile = Some(percentile);
        self
    }
}

/// Per-call execution plan. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub targets: Vec<PartitionKey>,
    pub predicate: NodePredicate,
    pub projection: Projection,
    pub top_percentile: Option<f64>,
}

impl QueryPlan {
    /// Clause sent to one node: the shared clause plus its ownership guard.
    pub fn predicate_for(&self, partition: &PartitionKey) -> NodePredicate {
        self.predicate.owned_by(partition)
    }

    /// First pass of a percentile filter: every score, on every partition, no
    /// other filters.
    pub fn threshold_pass(directory: &PartitionDirectory) -> QueryPlan {
        QueryPlan {
            targets: directory.all_partitions(),
            predicate: NodePredicate::default(),
            projection: Projection::scores(),
            top_percentile: None,
        }
    }

    /// Second pass of a percentile filter.
    pub fn with_threshold(mut self, threshold: f64) -> QueryPlan {
        self.predicate.score_at_least = Some(threshold);
        self.top_percentile = None;
        self
    }
}

/// Compiles `filters` against the directory. Fails before any node is
/// contacted on an unknown partition or a malformed filter value.
pub fn compile(filters: &FilterSet, directory: &PartitionDirectory) -> Result<QueryPlan> {
    let targets = match filters.partition.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => vec![directory.resolve(raw)?],
        _ => directory.all_partitions(),
    };

    for (field, value) in [
        ("score_min", filters.score_min),
        ("score_max", filters.score_max),
        ("presence_min", filters.presence_min),
        ("presence_max", filters.presence_max),
    ] {
        if let Some(v) = value
            && !v.is_finite()
        {
            return Err(AccessError::InvalidFilter(format!("{} is not a number", field)));
        }
    }

    if let Some(p) = filters.top_percentile
        && !(p.is_finite() && p > 0.0 && p <= 100.0)
    {
        return Err(AccessError::InvalidFilter(format!(
            "top_percentile {} outside (0, 100]",
            p
        )));
    }

    let name_contains = filters
        .name_contains
        .as_deref()
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string);

    let predicate = NodePredicate {
        owner: None,
        id_from: filters.id_from,
        id_to: filters.id_to,
        score_min: filters.score_min,
        score_max: filters.score_max,
        presence_min: filters.presence_min,
        presence_max: filters.presence_max,
        name_contains,
        score_at_least: None,
    };

    Ok(QueryPlan {
        targets,
        predicate,
        projection: Projection::records(),
        top_percentile: filters.top_percentile,
    })
}

/// Score at the top-`percentile` cutoff of `scores`.
///
/// Scores are ordered descending and the cutoff index is
/// `max(0, floor(percentile / 100 * count) - 1)`. Returns `None` for no scores.
pub fn cutoff_threshold(scores: &[f64], percentile: f64) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }

    let descending = merge_sort_by_key(scores, |s| Reverse(*s));
    let raw_index = (percentile / 100.0 * descending.len() as f64).floor() as i64 - 1;
    let index = (raw_index.max(0) as usize).min(descending.len() - 1);

    descending.get(index).copied()
}
