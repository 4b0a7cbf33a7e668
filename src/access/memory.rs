//! In-process connector.
//!
//! Connects straight to the stores of a `StoreHost` living in the same process.
//! Used for embedded runs and tests; individual stores can be marked unreachable,
//! stalled or failing to exercise the partition-failure paths.

use super::connection::{Connection, Connector};
use crate::directory::types::{NodeDescriptor, PartitionKey};
use crate::error::{AccessError, Result};
use crate::storage::memory::{StoreError, StoreHost};
use crate::storage::protocol::{StoreCall, StoreReply};

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct MemoryConnector {
    host: Arc<StoreHost>,
    unreachable: DashSet<String>,
    stalled: DashSet<String>,
    failing: DashSet<String>,
    open: Arc<AtomicUsize>,
    opened_total: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(host: Arc<StoreHost>) -> Arc<Self> {
        Arc::new(Self {
            host,
            unreachable: DashSet::new(),
            stalled: DashSet::new(),
            failing: DashSet::new(),
            open: Arc::new(AtomicUsize::new(0)),
            opened_total: AtomicUsize::new(0),
        })
    }

    pub fn host(&self) -> &Arc<StoreHost> {
        &self.host
    }

    /// Connects to `store` fail with `NodeUnreachable`.
    pub fn set_unreachable(&self, store: &str, down: bool) {
        toggle(&self.unreachable, store, down);
    }

    /// Connects to `store` never complete.
    pub fn set_stalled(&self, store: &str, stalled: bool) {
        toggle(&self.stalled, store, stalled);
    }

    /// Calls on `store` fail with `QueryExecution`.
    pub fn set_failing(&self, store: &str, failing: bool) {
        toggle(&self.failing, store, failing);
    }

    /// Connections opened and not yet released.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn connections_opened(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

fn toggle(set: &DashSet<String>, store: &str, on: bool) {
    if on {
        set.insert(store.to_string());
    } else {
        set.remove(store);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        partition: &PartitionKey,
        descriptor: &NodeDescriptor,
    ) -> Result<Box<dyn Connection>> {
        let unreachable = |reason: String| AccessError::NodeUnreachable {
            partition: partition.to_string(),
            reason,
        };

        if self.unreachable.contains(&descriptor.store) {
            return Err(unreachable("connection refused".to_string()));
        }
        if self.stalled.contains(&descriptor.store) {
            std::future::pending::<()>().await;
        }
        self.host
            .authorize(&descriptor.user, &descriptor.password)
            .map_err(|e| unreachable(e.to_string()))?;
        self.host
            .store(&descriptor.store)
            .map_err(|e| unreachable(e.to_string()))?;

        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryConnection {
            partition: partition.clone(),
            store: descriptor.store.clone(),
            host: self.host.clone(),
            failing: self.failing.contains(&descriptor.store),
            open: self.open.clone(),
            released: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    partition: PartitionKey,
    store: String,
    host: Arc<StoreHost>,
    failing: bool,
    open: Arc<AtomicUsize>,
    released: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    async fn call(&self, call: StoreCall) -> Result<StoreReply> {
        if self.failing {
            return Err(AccessError::QueryExecution {
                partition: self.partition.to_string(),
                reason: format!("{} rejected by store {}", call.op(), self.store),
            });
        }
        self.host
            .execute(&self.store, call)
            .map_err(|e| store_error(&self.partition, e))
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

/// Maps a store-side failure onto the access taxonomy.
pub(crate) fn store_error(partition: &PartitionKey, error: StoreError) -> AccessError {
    match error {
        StoreError::DuplicateKey(id) => AccessError::DuplicateKey {
            partition: partition.to_string(),
            id,
        },
        StoreError::UnknownStore(_) | StoreError::Unauthorized(_) => {
            AccessError::NodeUnreachable {
                partition: partition.to_string(),
                reason: error.to_string(),
            }
        }
        StoreError::BadRequest(reason) => AccessError::QueryExecution {
            partition: partition.to_string(),
            reason,
        },
    }
}
