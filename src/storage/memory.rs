use super::protocol::{StoreCall, StoreReply};
use super::types::{NodePredicate, ProjectedRow, Projection, Record};
use crate::directory::types::PartitionKey;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("duplicate identifier {0}")]
    DuplicateKey(i64),
    #[error("unknown store {0}")]
    UnknownStore(String),
    #[error("access denied for user {0}")]
    Unauthorized(String),
    #[error("malformed request: {0}")]
    BadRequest(String),
}

/// One node's local table, keyed by record id.
///
/// Holds the node's own fragment plus any replica copies pushed to it; the
/// `partition` column tells the two apart.
pub struct LocalStore {
    name: String,
    rows: DashMap<i64, Record>,
}

impl LocalStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a new row; fails if the id is already present.
    pub fn insert(&self, record: Record) -> Result<(), StoreError> {
        match self.rows.entry(record.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Insert-or-replace. Returns true if an existing row was replaced.
    pub fn upsert(&self, record: Record) -> bool {
        let id = record.id;
        let incoming_owner = record.partition.clone();
        match self.rows.insert(id, record) {
            Some(previous) => {
                if previous.partition != incoming_owner {
                    tracing::warn!(
                        "Store {}: id {} owned by {} overwritten by copy from {}",
                        self.name,
                        id,
                        previous.partition,
                        incoming_owner
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Sets score and presence on the row `(id, owner)`.
    pub fn update(&self, id: i64, owner: &PartitionKey, score: f64, presence: f64) -> bool {
        match self.rows.get_mut(&id) {
            Some(mut row) if &row.partition == owner => {
                row.score = score;
                row.presence = presence;
                true
            }
            _ => false,
        }
    }

    /// Removes the row `(id, owner)`.
    pub fn delete(&self, id: i64, owner: &PartitionKey) -> bool {
        self.rows
            .remove_if(&id, |_, row| &row.partition == owner)
            .is_some()
    }

    /// Returns matching rows in id order.
    pub fn scan(&self, predicate: &NodePredicate, projection: &Projection) -> Vec<ProjectedRow> {
        let mut matched: Vec<Record> = self
            .rows
            .iter()
            .filter(|entry| predicate.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|record| record.id);

        matched
            .iter()
            .map(|record| ProjectedRow::project(record, projection))
            .collect()
    }

    pub fn get(&self, id: i64) -> Option<Record> {
        self.rows.get(&id).map(|row| row.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A process hosting several named stores behind one set of credentials.
pub struct StoreHost {
    stores: DashMap<String, Arc<LocalStore>>,
    user: String,
    password: String,
}

impl StoreHost {
    pub fn new(user: &str, password: &str) -> Arc<Self> {
        Arc::new(Self {
            stores: DashMap::new(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Creates the store if it does not exist yet.
    pub fn provision(&self, name: &str) -> Arc<LocalStore> {
        self.stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LocalStore::new(name)))
            .clone()
    }

    pub fn store(&self, name: &str) -> Result<Arc<LocalStore>, StoreError> {
        self.stores
            .get(name)
            .map(|store| store.value().clone())
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn authorize(&self, user: &str, password: &str) -> Result<(), StoreError> {
        if user == self.user && password == self.password {
            Ok(())
        } else {
            Err(StoreError::Unauthorized(user.to_string()))
        }
    }

    /// Runs one call against the named store.
    pub fn execute(&self, store: &str, call: StoreCall) -> Result<StoreReply, StoreError> {
        let target = self.store(store)?;

        match call {
            StoreCall::Ping => Ok(StoreReply::Ack),
            StoreCall::Insert { record } => {
                let id = record.id;
                target.insert(record)?;
                tracing::debug!("Store {}: inserted id {}", store, id);
                Ok(StoreReply::Ack)
            }
            StoreCall::Upsert { record, op_id } => {
                let id = record.id;
                let replaced = target.upsert(record);
                tracing::debug!(
                    "Store {}: upserted id {} (replaced={}, op={})",
                    store,
                    id,
                    replaced,
                    op_id.as_deref().unwrap_or("-")
                );
                Ok(StoreReply::Ack)
            }
            StoreCall::Update {
                id,
                owner,
                score,
                presence,
            } => Ok(StoreReply::Affected(
                target.update(id, &owner, score, presence),
            )),
            StoreCall::Delete { id, owner } => Ok(StoreReply::Affected(target.delete(id, &owner))),
            StoreCall::Scan {
                predicate,
                projection,
            } => {
                tracing::debug!(
                    "Store {}: SELECT {} WHERE {}",
                    store,
                    projection,
                    predicate
                );
                Ok(StoreReply::Rows(target.scan(&predicate, &projection)))
            }
        }
    }
}
