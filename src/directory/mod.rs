//! Partition Directory Module
//!
//! Static routing table from partition key to the node that owns it.
//!
//! ## Core Concepts
//! - **Partition keys**: A small, fixed set of names. Raw strings are validated once,
//!   here, and turned into `PartitionKey` values; nothing downstream routes on raw text.
//! - **Descriptors**: Each partition maps to a `NodeDescriptor` (host, credentials, store).
//! - **Configuration**: `ClusterConfig` is read from a TOML file (plus env overrides).
//!   A missing file is created from the built-in default on first run.

pub mod config;
pub mod partitioner;
pub mod types;
