//! Cluster configuration.
//!
//! Loaded with precedence: env vars (`FRAGSTORE_`) > config file. When the file does
//! not exist the built-in default is written to it first, so a fresh checkout is
//! self-initializing.
//!
//! # Example config file (fragstore.toml)
//! ```toml
//! replication_enabled = true
//! node_timeout_ms = 2000
//! binding = "direct"
//!
//! [partitions.CSE]
//! host = "http://127.0.0.1:7100"
//! user = "root"
//! password = "admin"
//! store = "db_cse"
//! ```

use super::types::{NodeDescriptor, PartitionKey};
use crate::error::ConfigError;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "fragstore.toml";

/// Host used by the built-in default for every partition.
pub const DEFAULT_NODE_HOST: &str = "http://127.0.0.1:7100";

/// Default per-node timeout for connect and request steps.
pub const DEFAULT_NODE_TIMEOUT_MS: u64 = 2_000;

/// How the access layer talks to the stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// One REST call per node, addressed through each descriptor's host.
    #[default]
    Direct,
    /// Named remote procedures on a single coordinator host.
    Procedure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Push an idempotent copy of every insert to the non-owning partitions.
    #[serde(default = "default_replication_enabled")]
    pub replication_enabled: bool,
    /// Upper bound for every per-node network step.
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
    #[serde(default)]
    pub binding: Binding,
    /// Coordinator host for `Binding::Procedure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_host: Option<String>,
    pub partitions: BTreeMap<String, NodeDescriptor>,
}

fn default_replication_enabled() -> bool {
    true
}

fn default_node_timeout_ms() -> u64 {
    DEFAULT_NODE_TIMEOUT_MS
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let mut partitions = BTreeMap::new();
        partitions.insert(
            "CSE".to_string(),
            NodeDescriptor::new(DEFAULT_NODE_HOST, "root", "admin", "db_cse"),
        );
        partitions.insert(
            "AIML".to_string(),
            NodeDescriptor::new(DEFAULT_NODE_HOST, "root", "admin", "db_aiml"),
        );

        Self {
            replication_enabled: default_replication_enabled(),
            node_timeout_ms: DEFAULT_NODE_TIMEOUT_MS,
            binding: Binding::Direct,
            procedure_host: None,
            partitions,
        }
    }
}

impl ClusterConfig {
    /// Loads the config at `path`, writing the built-in default there first if the
    /// file is missing.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            Self::default().write(path)?;
            tracing::info!("No configuration found, wrote default to {}", path.display());
        }
        Self::load(path)
    }

    /// Loads the config at `path` layered with `FRAGSTORE_` env overrides.
    ///
    /// Nested keys use a double underscore: `FRAGSTORE_NODE_TIMEOUT_MS=500`,
    /// `FRAGSTORE_PARTITIONS__CSE__HOST=http://10.0.0.5:7100`.
    ///
    /// Env keys arrive lower-cased, so partition entries are folded onto their
    /// upper-cased name before extraction.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut layered: Dict = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FRAGSTORE_").split("__"))
            .extract()?;
        fold_partition_keys(&mut layered);

        let config: ClusterConfig = Figment::from(Serialized::defaults(layered)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one partition must be configured".to_string(),
            ));
        }
        if self.node_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "node_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.binding == Binding::Procedure && self.procedure_host.is_none() {
            return Err(ConfigError::Invalid(
                "procedure binding requires procedure_host".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (name, descriptor) in &self.partitions {
            let key = PartitionKey::normalized(name);
            if key.as_str().is_empty() {
                return Err(ConfigError::Invalid("empty partition name".to_string()));
            }
            if !seen.insert(key.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "partition {} is configured more than once",
                    key
                )));
            }
            if descriptor.store.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "partition {} has no store name",
                    key
                )));
            }
        }
        Ok(())
    }
}

/// Merges `partitions` entries whose keys differ only in case. Entries already
/// spelled in upper case form the base and the others overlay them field by field.
fn fold_partition_keys(layered: &mut Dict) {
    let Some(Value::Dict(_, partitions)) = layered.get_mut("partitions") else {
        return;
    };

    let mut entries: Vec<(String, Value)> = std::mem::take(partitions).into_iter().collect();
    entries.sort_by_key(|(key, _)| PartitionKey::normalized(key).as_str() != key.as_str());

    for (key, value) in entries {
        let normalized = PartitionKey::normalized(&key).as_str().to_string();
        match partitions.get_mut(&normalized) {
            Some(existing) => overlay(existing, value),
            None => {
                partitions.insert(normalized, value);
            }
        }
    }
}

fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Dict(_, base), Value::Dict(_, top)) => {
            for (key, value) in top {
                match base.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, top) => *base = top,
    }
}
