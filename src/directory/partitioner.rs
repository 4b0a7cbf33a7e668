use super::config::ClusterConfig;
use super::types::{NodeDescriptor, PartitionKey};
use crate::error::{AccessError, ConfigError, Result};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Read-only routing table, built once from `ClusterConfig` and shared by `Arc`.
pub struct PartitionDirectory {
    entries: BTreeMap<PartitionKey, NodeDescriptor>,
    replication_enabled: bool,
    node_timeout: Duration,
}

impl PartitionDirectory {
    pub fn from_config(config: &ClusterConfig) -> std::result::Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let entries = config
            .partitions
            .iter()
            .map(|(name, descriptor)| (PartitionKey::normalized(name), descriptor.clone()))
            .collect();

        Ok(Arc::new(Self {
            entries,
            replication_enabled: config.replication_enabled,
            node_timeout: Duration::from_millis(config.node_timeout_ms),
        }))
    }

    /// Validates a raw partition name (case-insensitive).
    pub fn resolve(&self, raw: &str) -> Result<PartitionKey> {
        let key = PartitionKey::normalized(raw);
        if self.entries.contains_key(&key) {
            Ok(key)
        } else {
            Err(AccessError::UnknownPartition(raw.to_string()))
        }
    }

    pub fn descriptor(&self, key: &PartitionKey) -> Result<&NodeDescriptor> {
        self.entries
            .get(key)
            .ok_or_else(|| AccessError::UnknownPartition(key.to_string()))
    }

    /// Every configured partition, in sorted order.
    pub fn all_partitions(&self) -> Vec<PartitionKey> {
        self.entries.keys().cloned().collect()
    }

    /// Every partition except `owner`; the replication targets for its writes.
    pub fn others(&self, owner: &PartitionKey) -> Vec<PartitionKey> {
        self.entries
            .keys()
            .filter(|key| *key != owner)
            .cloned()
            .collect()
    }

    pub fn replication_enabled(&self) -> bool {
        self.replication_enabled
    }

    pub fn node_timeout(&self) -> Duration {
        self.node_timeout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
