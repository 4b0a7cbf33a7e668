//! Error taxonomy for the access layer.
//!
//! Partition-local failures (`NodeUnreachable`, `QueryExecution`, `Timeout`) are
//! contained by the scatter-gather and replication paths; they only reach a caller
//! as a `false` write result or as an entry in a read's failure report.
//! `UnknownPartition`, `InvalidRecord` and `InvalidFilter` are always surfaced.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AccessError {
    /// Partition key is not one of the configured partitions.
    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    /// Connection to a node could not be established.
    #[error("node {partition} unreachable: {reason}")]
    NodeUnreachable { partition: String, reason: String },

    /// Insert conflicted with an existing identifier on the owning node.
    #[error("duplicate identifier {id} on partition {partition}")]
    DuplicateKey { partition: String, id: i64 },

    /// The node accepted the connection but failed to run the request.
    #[error("query failed on {partition}: {reason}")]
    QueryExecution { partition: String, reason: String },

    /// The node did not answer within the configured per-node timeout.
    #[error("node {partition} timed out after {after_ms}ms")]
    Timeout { partition: String, after_ms: u64 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl AccessError {
    /// True for errors that must reach the caller instead of being contained
    /// at the partition boundary.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AccessError::UnknownPartition(_)
                | AccessError::InvalidRecord(_)
                | AccessError::InvalidFilter(_)
        )
    }
}

/// Configuration could not be read, written or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Invalid(String),

    #[error("failed to read configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("failed to serialize default configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AccessError>;
