//! Write & Replication Coordinator
//!
//! Authoritative writes go to the owning partition only. After a successful
//! insert, a background round pushes an idempotent upsert of the same record to
//! every other partition.
//!
//! ## Guarantees (and their absence)
//! - The caller's result reflects the owning node alone; replication never blocks it.
//! - Replica failures are logged per node and never escalated or retried.
//! - A failed replication round does not roll back the authoritative write.
//! - Update and delete are not replicated; replicas of older values remain as they are.

use super::connection::{Connection, with_connection};
use super::scatter::{NodeFailure, ScatterGather};
use crate::directory::types::PartitionKey;
use crate::error::{AccessError, Result};
use crate::storage::types::{Record, check_value};

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Summary of one replication round.
#[derive(Debug)]
pub struct ReplicationReport {
    pub op_id: String,
    pub record_id: i64,
    pub replicated: Vec<PartitionKey>,
    pub failures: Vec<NodeFailure>,
}

/// Returned by a successful insert.
#[derive(Debug)]
pub struct InsertReceipt {
    /// Background replication round, if replication is enabled and there is at
    /// least one other partition. Dropping the handle does not cancel it.
    pub replication: Option<JoinHandle<ReplicationReport>>,
}

#[derive(Clone)]
pub struct WriteCoordinator {
    executor: ScatterGather,
}

impl WriteCoordinator {
    pub fn new(executor: ScatterGather) -> Self {
        Self { executor }
    }

    /// Inserts `record` on its owning partition, then starts replication.
    pub async fn insert(&self, record: Record) -> Result<InsertReceipt> {
        record.validate().map_err(AccessError::InvalidRecord)?;

        let owner = record.partition.clone();
        let authoritative = record.clone();
        self.on_owner(&owner, move |conn| async move { conn.insert(&authoritative).await })
            .await?;

        tracing::info!("Inserted record {} on partition {}", record.id, owner);

        let directory = self.executor.directory();
        let replication = if directory.replication_enabled() && directory.len() > 1 {
            Some(self.spawn_replication(record))
        } else {
            None
        };

        Ok(InsertReceipt { replication })
    }

    /// Sets score and presence on the owning partition. `Ok(false)` if no such record.
    pub async fn update(
        &self,
        id: i64,
        partition: &PartitionKey,
        score: f64,
        presence: f64,
    ) -> Result<bool> {
        check_value("score", score).map_err(AccessError::InvalidRecord)?;
        check_value("presence", presence).map_err(AccessError::InvalidRecord)?;

        let owner = partition.clone();
        let updated = self
            .on_owner(partition, move |conn| async move {
                conn.update(id, &owner, score, presence).await
            })
            .await?;

        tracing::info!("Update of record {} on {}: affected={}", id, partition, updated);
        Ok(updated)
    }

    /// Removes the record from the owning partition. `Ok(false)` if no such record.
    pub async fn delete(&self, id: i64, partition: &PartitionKey) -> Result<bool> {
        let owner = partition.clone();
        let deleted = self
            .on_owner(partition, move |conn| async move { conn.delete(id, &owner).await })
            .await?;

        tracing::info!("Delete of record {} on {}: affected={}", id, partition, deleted);
        Ok(deleted)
    }

    /// Upserts `record` on every partition except its owner and waits for all of them.
    pub async fn replicate(&self, record: &Record, op_id: String) -> ReplicationReport {
        let targets = self.executor.directory().others(&record.partition);
        let copy = record.clone();
        let op = op_id.clone();

        let outcomes = self
            .executor
            .scatter_each(&targets, move |_, conn| {
                let copy = copy.clone();
                let op = op.clone();
                async move {
                    conn.upsert(&copy, Some(op)).await?;
                    Ok(Vec::<()>::new())
                }
            })
            .await;

        let mut replicated = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(_) => replicated.push(outcome.partition),
                Err(error) => failures.push(NodeFailure {
                    partition: outcome.partition,
                    error,
                }),
            }
        }

        if failures.is_empty() {
            tracing::info!(
                "Replicated record {} to {} partitions (op {})",
                record.id,
                replicated.len(),
                op_id
            );
        } else {
            tracing::warn!(
                "Replication of record {} incomplete: {} ok, {} failed (op {})",
                record.id,
                replicated.len(),
                failures.len(),
                op_id
            );
        }

        ReplicationReport {
            op_id,
            record_id: record.id,
            replicated,
            failures,
        }
    }

    fn spawn_replication(&self, record: Record) -> JoinHandle<ReplicationReport> {
        let coordinator = self.clone();
        let op_id = Uuid::new_v4().to_string();
        tracing::debug!("Starting replication of record {} (op {})", record.id, op_id);

        tokio::spawn(async move { coordinator.replicate(&record, op_id).await })
    }

    /// Runs `f` on a fresh connection to `partition`, bounded by the node timeout.
    async fn on_owner<T, F, Fut>(&self, partition: &PartitionKey, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let directory = self.executor.directory();
        let descriptor = directory.descriptor(partition)?;
        let timeout = directory.node_timeout();

        let work = with_connection(
            self.executor.connector().as_ref(),
            partition,
            descriptor,
            f,
        );
        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(AccessError::Timeout {
                partition: partition.to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
