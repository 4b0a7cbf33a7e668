//! Fragmented Record Store Library
//!
//! An access layer over one logical table of records split by partition key across
//! independently owned store nodes. It serves the binary (`main.rs`) and can be
//! embedded directly.
//!
//! ## Architecture Modules
//!
//! - **`directory`**: The static routing table. Validates partition keys and maps each
//!   one to the node descriptor of its owning store; loads `ClusterConfig`.
//! - **`storage`**: The store side. In-memory `LocalStore`s behind a `StoreHost`,
//!   served over HTTP with a direct binding and a procedure binding.
//! - **`access`**: Connections, parallel scatter-gather reads, owner-only writes with
//!   background replication, the predicate compiler and the `RecordService` surface.
//! - **`algorithms`**: Stable merge sort and binary search over gathered rows.
//! - **`api`**: The JSON gateway in front of `RecordService`.
//! - **`error`**: `AccessError` and `ConfigError`.

pub mod access;
pub mod algorithms;
pub mod api;
pub mod directory;
pub mod error;
pub mod storage;
