//! Record Service
//!
//! The operation surface callers use. Composes the predicate compiler, the
//! scatter-gather executor, the write coordinator and the local sort/search
//! algorithms over one shared `PartitionDirectory`.
//!
//! Only caller mistakes come back as `Err`: an unknown partition, an invalid record
//! or an invalid filter. Node-level failures are logged here and become `false`
//! for writes, or an entry in `RecordSet::failures` for reads.

use super::connection::Connector;
use super::predicate::{FilterSet, QueryPlan, compile, cutoff_threshold};
use super::replication::WriteCoordinator;
use super::scatter::{NodeFailure, ScatterGather};
use crate::algorithms::search::binary_search_by_id;
use crate::algorithms::sort;
use crate::directory::partitioner::PartitionDirectory;
use crate::directory::types::PartitionKey;
use crate::error::{AccessError, Result};
use crate::storage::types::{NodePredicate, ProjectedRow, Projection, Record};

use std::sync::Arc;

/// Rows gathered by a read, plus the partitions that could not contribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub failures: Vec<NodeFailure>,
}

impl RecordSet {
    /// False when at least one targeted partition is missing from `records`.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Everything one partition's store holds: its own rows plus the replicas it
/// keeps for other partitions, told apart by each row's `partition` column.
#[derive(Debug)]
pub struct Fragment {
    pub partition: PartitionKey,
    pub store: String,
    pub records: Result<Vec<Record>>,
}

impl Fragment {
    /// Rows this partition owns. Zero when the node did not answer.
    pub fn owned(&self) -> usize {
        self.rows().filter(|r| r.partition == self.partition).count()
    }

    /// Rows held as replicas of other partitions.
    pub fn replicas(&self) -> usize {
        self.rows().filter(|r| r.partition != self.partition).count()
    }

    fn rows(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().flatten()
    }
}

#[derive(Clone)]
pub struct RecordService {
    directory: Arc<PartitionDirectory>,
    executor: ScatterGather,
    writer: WriteCoordinator,
}

impl RecordService {
    pub fn new(directory: Arc<PartitionDirectory>, connector: Arc<dyn Connector>) -> Self {
        let executor = ScatterGather::new(directory.clone(), connector);
        let writer = WriteCoordinator::new(executor.clone());
        Self {
            directory,
            executor,
            writer,
        }
    }

    pub fn directory(&self) -> &Arc<PartitionDirectory> {
        &self.directory
    }

    pub fn writer(&self) -> &WriteCoordinator {
        &self.writer
    }

    // ============================================================
    // WRITES
    // ============================================================

    /// Inserts a new record on its owning partition.
    ///
    /// Returns `Ok(false)` when the identifier is already taken there or the
    /// owning node failed; replication to other partitions runs in the background.
    pub async fn add_record(
        &self,
        id: i64,
        name: &str,
        partition: &str,
        score: f64,
        presence: f64,
    ) -> Result<bool> {
        let partition = self.directory.resolve(partition)?;
        let record = Record {
            id,
            name: name.to_string(),
            partition,
            score,
            presence,
        };

        match self.writer.insert(record).await {
            Ok(_) => Ok(true),
            Err(e) => contain_write("insert", id, e),
        }
    }

    pub async fn update_record(
        &self,
        id: i64,
        partition: &str,
        score: f64,
        presence: f64,
    ) -> Result<bool> {
        let partition = self.directory.resolve(partition)?;

        match self.writer.update(id, &partition, score, presence).await {
            Ok(updated) => Ok(updated),
            Err(e) => contain_write("update", id, e),
        }
    }

    pub async fn delete_record(&self, id: i64, partition: &str) -> Result<bool> {
        let partition = self.directory.resolve(partition)?;

        match self.writer.delete(id, &partition).await {
            Ok(deleted) => Ok(deleted),
            Err(e) => contain_write("delete", id, e),
        }
    }

    // ============================================================
    // READS
    // ============================================================

    /// Every record of every reachable partition, each exactly once.
    pub async fn fetch_all(&self) -> RecordSet {
        let plan = QueryPlan {
            targets: self.directory.all_partitions(),
            predicate: NodePredicate::default(),
            projection: Projection::records(),
            top_percentile: None,
        };
        self.execute(plan).await
    }

    /// Name keyword plus score range, optionally restricted to one partition.
    pub async fn search(
        &self,
        keyword: Option<&str>,
        min_score: Option<f64>,
        max_score: Option<f64>,
        partition: Option<&str>,
    ) -> Result<RecordSet> {
        let mut filters = FilterSet::new().score_range(min_score, max_score);
        if let Some(keyword) = keyword {
            filters = filters.name_contains(keyword);
        }
        if let Some(partition) = partition {
            filters = filters.partition(partition);
        }
        self.filter(&filters).await
    }

    pub async fn filter(&self, filters: &FilterSet) -> Result<RecordSet> {
        let plan = compile(filters, &self.directory)?;

        match plan.top_percentile {
            Some(percentile) => Ok(self.execute_top_percentile(plan, percentile).await),
            None => Ok(self.execute(plan).await),
        }
    }

    /// Every row each partition's store physically holds, replicas included,
    /// ordered by partition name. Unlike the other reads there is no ownership
    /// guard here.
    pub async fn fetch_fragments(&self) -> Vec<Fragment> {
        let targets = self.directory.all_partitions();
        let projection = Projection::records();

        let outcomes = self
            .executor
            .scatter_each(&targets, move |partition, conn| {
                let predicate = NodePredicate::default();
                let projection = projection.clone();
                async move {
                    let rows = conn.scan(&predicate, &projection).await?;
                    into_records(&partition, rows)
                }
            })
            .await;

        let mut fragments: Vec<Fragment> = outcomes
            .into_iter()
            .map(|outcome| Fragment {
                store: self
                    .directory
                    .descriptor(&outcome.partition)
                    .map(|d| d.store.clone())
                    .unwrap_or_default(),
                partition: outcome.partition,
                records: outcome.result,
            })
            .collect();
        fragments.sort_by(|a, b| a.partition.cmp(&b.partition));
        fragments
    }

    // ============================================================
    // LOCAL ORDERING
    // ============================================================

    /// Ascending by score, stable.
    pub fn sort_by_score(&self, records: &[Record]) -> Vec<Record> {
        sort::sort_by_score(records)
    }

    /// Binary search over a sequence already sorted by id.
    pub fn find_by_id(&self, sorted: &[Record], id: i64) -> Option<Record> {
        binary_search_by_id(sorted, id).cloned()
    }

    /// Descending by `score + presence`, stable.
    pub fn rank_by_total(&self, records: &[Record]) -> Vec<Record> {
        sort::rank_by_total(records)
    }

    // ============================================================
    // EXECUTION
    // ============================================================

    async fn execute(&self, plan: QueryPlan) -> RecordSet {
        tracing::debug!(
            "Scatter SELECT {} WHERE {} to {} partitions",
            plan.projection,
            plan.predicate,
            plan.targets.len()
        );

        let plan = Arc::new(plan);
        let shared = plan.clone();
        let gathered = self
            .executor
            .scatter(&plan.targets, move |partition, conn| {
                let predicate = shared.predicate_for(&partition);
                let projection = shared.projection.clone();
                async move {
                    let rows = conn.scan(&predicate, &projection).await?;
                    into_records(&partition, rows)
                }
            })
            .await;

        RecordSet {
            records: gathered.rows,
            failures: gathered.failures,
        }
    }

    /// Threshold pass over every partition's scores, then the filtered scan with
    /// `score >= threshold`.
    async fn execute_top_percentile(&self, plan: QueryPlan, percentile: f64) -> RecordSet {
        let threshold_plan = Arc::new(QueryPlan::threshold_pass(&self.directory));
        let shared = threshold_plan.clone();
        let gathered = self
            .executor
            .scatter(&threshold_plan.targets, move |partition, conn| {
                let predicate = shared.predicate_for(&partition);
                let projection = shared.projection.clone();
                async move {
                    let rows = conn.scan(&predicate, &projection).await?;
                    Ok(rows.into_iter().filter_map(|row| row.score).collect::<Vec<f64>>())
                }
            })
            .await;

        let Some(threshold) = cutoff_threshold(&gathered.rows, percentile) else {
            tracing::info!("No scores gathered; top {}% is empty", percentile);
            return RecordSet {
                records: Vec::new(),
                failures: gathered.failures,
            };
        };
        tracing::info!(
            "Top {}% threshold over {} scores: {}",
            percentile,
            gathered.rows.len(),
            threshold
        );

        let mut result = self.execute(plan.with_threshold(threshold)).await;
        for failure in gathered.failures {
            if !result.failures.iter().any(|f| f.partition == failure.partition) {
                result.failures.push(failure);
            }
        }
        result
    }
}

/// Converts scanned rows back into full records. A row missing a column is a
/// malformed reply and fails the whole node.
fn into_records(partition: &PartitionKey, rows: Vec<ProjectedRow>) -> Result<Vec<Record>> {
    rows.into_iter()
        .map(|row| {
            row.into_record().ok_or_else(|| AccessError::QueryExecution {
                partition: partition.to_string(),
                reason: "row is missing projected columns".to_string(),
            })
        })
        .collect()
}

fn contain_write(op: &str, id: i64, error: AccessError) -> Result<bool> {
    match error {
        e if e.is_caller_error() => Err(e),
        e @ AccessError::DuplicateKey { .. } => {
            tracing::warn!("Rejected {} of record {}: {}", op, id, e);
            Ok(false)
        }
        e => {
            tracing::error!("Failed {} of record {}: {}", op, id, e);
            Ok(false)
        }
    }
}
