//! Connection Manager
//!
//! One connection per operation, acquired and released around a single unit of
//! work. There is no pool and no retry: a failed connect is reported as
//! `NodeUnreachable` and the caller decides whether to skip the node or fail.

use crate::directory::types::{NodeDescriptor, PartitionKey};
use crate::error::{AccessError, Result};
use crate::storage::protocol::{StoreCall, StoreReply};
use crate::storage::types::{NodePredicate, ProjectedRow, Projection, Record};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// An open connection to one partition's store.
///
/// Implementors provide the raw `call`; the typed operations are built on it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Partition this connection was opened for.
    fn partition(&self) -> &PartitionKey;

    async fn call(&self, call: StoreCall) -> Result<StoreReply>;

    /// Gives the connection back. Must be idempotent.
    fn release(&self);

    async fn scan(
        &self,
        predicate: &NodePredicate,
        projection: &Projection,
    ) -> Result<Vec<ProjectedRow>> {
        let reply = self
            .call(StoreCall::Scan {
                predicate: predicate.clone(),
                projection: projection.clone(),
            })
            .await?;
        match reply {
            StoreReply::Rows(rows) => Ok(rows),
            other => Err(unexpected(self.partition(), &other)),
        }
    }

    async fn insert(&self, record: &Record) -> Result<()> {
        self.call(StoreCall::Insert {
            record: record.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn upsert(&self, record: &Record, op_id: Option<String>) -> Result<()> {
        self.call(StoreCall::Upsert {
            record: record.clone(),
            op_id,
        })
        .await
        .map(|_| ())
    }

    async fn update(&self, id: i64, owner: &PartitionKey, score: f64, presence: f64) -> Result<bool> {
        let reply = self
            .call(StoreCall::Update {
                id,
                owner: owner.clone(),
                score,
                presence,
            })
            .await?;
        affected(self.partition(), reply)
    }

    async fn delete(&self, id: i64, owner: &PartitionKey) -> Result<bool> {
        let reply = self
            .call(StoreCall::Delete {
                id,
                owner: owner.clone(),
            })
            .await?;
        affected(self.partition(), reply)
    }
}

/// Opens connections to partition stores.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        partition: &PartitionKey,
        descriptor: &NodeDescriptor,
    ) -> Result<Box<dyn Connection>>;
}

fn affected(partition: &PartitionKey, reply: StoreReply) -> Result<bool> {
    match reply {
        StoreReply::Affected(hit) => Ok(hit),
        other => Err(unexpected(partition, &other)),
    }
}

fn unexpected(partition: &PartitionKey, reply: &StoreReply) -> AccessError {
    AccessError::QueryExecution {
        partition: partition.to_string(),
        reason: format!("unexpected reply {:?}", reply),
    }
}

/// Releases the wrapped connection when dropped, which covers normal return,
/// error return, panics and cancelled futures alike.
struct ConnectionGuard {
    conn: Arc<dyn Connection>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.conn.release();
        tracing::trace!("Released connection to {}", self.conn.partition());
    }
}

/// Opens a connection, runs `f` with it and releases it on every exit path.
pub async fn with_connection<T, F, Fut>(
    connector: &dyn Connector,
    partition: &PartitionKey,
    descriptor: &NodeDescriptor,
    f: F,
) -> Result<T>
where
    F: FnOnce(Arc<dyn Connection>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let conn: Arc<dyn Connection> = Arc::from(connector.connect(partition, descriptor).await?);
    let guard = ConnectionGuard { conn: conn.clone() };
    tracing::trace!("Opened connection to {} ({})", partition, descriptor.store);

    let result = f(conn).await;
    drop(guard);
    result
}
