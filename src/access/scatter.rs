//! Scatter-Gather Executor
//!
//! Runs one unit of work per target partition, all in parallel, and waits for every
//! unit before returning.
//!
//! ## Responsibilities
//! - **Fan-out**: Each unit opens its own connection (scoped), runs the per-node
//!   query and releases the connection before it completes.
//! - **Bounding**: Each unit is wrapped in the per-node timeout, so one silent node
//!   cannot hold up the join.
//! - **Collection**: Outcomes come back through the `JoinSet` to a single collector
//!   loop. No buffer is shared between units.
//! - **Containment**: A failed node is logged and left out of the merge. The call
//!   itself never fails; the failure list says how complete the result is.

use super::connection::{Connection, Connector, with_connection};
use crate::directory::partitioner::PartitionDirectory;
use crate::directory::types::PartitionKey;
use crate::error::{AccessError, Result};

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A partition left out of a gathered result, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub partition: PartitionKey,
    pub error: AccessError,
}

/// Result of one unit of work.
#[derive(Debug)]
pub struct NodeOutcome<T> {
    pub partition: PartitionKey,
    pub result: Result<Vec<T>>,
}

/// Rows merged by concatenation, plus which nodes answered.
#[derive(Debug)]
pub struct GatherResult<T> {
    pub rows: Vec<T>,
    pub responded: Vec<PartitionKey>,
    pub failures: Vec<NodeFailure>,
}

impl<T> GatherResult<T> {
    /// Concatenates successful outcomes in the order given.
    pub fn merge(outcomes: Vec<NodeOutcome<T>>) -> Self {
        let mut rows = Vec::new();
        let mut responded = Vec::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(mut node_rows) => {
                    rows.append(&mut node_rows);
                    responded.push(outcome.partition);
                }
                Err(error) => failures.push(NodeFailure {
                    partition: outcome.partition,
                    error,
                }),
            }
        }

        Self {
            rows,
            responded,
            failures,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct ScatterGather {
    directory: Arc<PartitionDirectory>,
    connector: Arc<dyn Connector>,
}

impl ScatterGather {
    pub fn new(directory: Arc<PartitionDirectory>, connector: Arc<dyn Connector>) -> Self {
        Self {
            directory,
            connector,
        }
    }

    pub fn directory(&self) -> &Arc<PartitionDirectory> {
        &self.directory
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Runs `query` against every target and merges the rows by concatenation.
    pub async fn scatter<T, F, Fut>(&self, targets: &[PartitionKey], query: F) -> GatherResult<T>
    where
        T: Send + 'static,
        F: Fn(PartitionKey, Arc<dyn Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let gathered = GatherResult::merge(self.scatter_each(targets, query).await);

        tracing::debug!(
            "Gathered {} rows from {}/{} partitions",
            gathered.rows.len(),
            gathered.responded.len(),
            targets.len()
        );
        gathered
    }

    /// Runs `query` against every target and returns each node's outcome
    /// separately, in completion order.
    pub async fn scatter_each<T, F, Fut>(
        &self,
        targets: &[PartitionKey],
        query: F,
    ) -> Vec<NodeOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(PartitionKey, Arc<dyn Connection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let query = Arc::new(query);
        let timeout = self.directory.node_timeout();
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut units = JoinSet::new();

        for partition in targets {
            let descriptor = match self.directory.descriptor(partition) {
                Ok(descriptor) => descriptor.clone(),
                Err(error) => {
                    outcomes.push(NodeOutcome {
                        partition: partition.clone(),
                        result: Err(error),
                    });
                    continue;
                }
            };
            let connector = self.connector.clone();
            let query = query.clone();
            let partition = partition.clone();

            units.spawn(async move {
                let work = with_connection(connector.as_ref(), &partition, &descriptor, |conn| {
                    query(partition.clone(), conn)
                });
                let result = match tokio::time::timeout(timeout, work).await {
                    Ok(result) => result,
                    Err(_) => Err(AccessError::Timeout {
                        partition: partition.to_string(),
                        after_ms: timeout.as_millis() as u64,
                    }),
                };
                NodeOutcome { partition, result }
            });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Partition unit aborted: {}", e),
            }
        }

        // A unit that panicked never reported back; account for it explicitly.
        for partition in targets {
            if !outcomes.iter().any(|o| &o.partition == partition) {
                outcomes.push(NodeOutcome {
                    partition: partition.clone(),
                    result: Err(AccessError::QueryExecution {
                        partition: partition.to_string(),
                        reason: "unit aborted before completing".to_string(),
                    }),
                });
            }
        }

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                tracing::warn!("Partition {} left out of result: {}", outcome.partition, e);
            }
        }

        outcomes
    }
}
