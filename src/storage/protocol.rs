//! Store Host Network Protocol
//!
//! Defines the endpoints and messages a store host speaks. The same `StoreCall`
//! travels over two bindings:
//!
//! - **Direct**: `POST /stores/{store}/{op}` with the call's arguments as the body.
//! - **Procedure**: `POST /procedures/{name}` with `{ store, args }` as the body,
//!   all partitions behind one coordinator host.

use super::memory::StoreError;
use super::types::{NodePredicate, ProjectedRow, Projection, Record};
use crate::directory::types::PartitionKey;

use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Per-store operation endpoint (direct binding). Path params: store, op.
pub const ENDPOINT_STORE_OP: &str = "/stores/:store/:op";
/// Remote procedure endpoint (procedure binding). Path param: procedure name.
pub const ENDPOINT_PROCEDURE: &str = "/procedures/:name";

/// Header carrying the store user.
pub const HEADER_USER: &str = "x-fragstore-user";
/// Header carrying the store password.
pub const HEADER_PASSWORD: &str = "x-fragstore-password";

// --- Messages ---

/// One request against one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum StoreCall {
    /// Connection handshake; checks credentials and store existence.
    Ping,
    Insert {
        record: Record,
    },
    /// Idempotent insert-or-replace, used for replica copies.
    Upsert {
        record: Record,
        #[serde(default)]
        op_id: Option<String>,
    },
    Update {
        id: i64,
        owner: PartitionKey,
        score: f64,
        presence: f64,
    },
    Delete {
        id: i64,
        owner: PartitionKey,
    },
    Scan {
        predicate: NodePredicate,
        projection: Projection,
    },
}

impl StoreCall {
    /// Path segment used by the direct binding.
    pub fn op(&self) -> &'static str {
        match self {
            StoreCall::Ping => "ping",
            StoreCall::Insert { .. } => "insert",
            StoreCall::Upsert { .. } => "upsert",
            StoreCall::Update { .. } => "update",
            StoreCall::Delete { .. } => "delete",
            StoreCall::Scan { .. } => "scan",
        }
    }

    /// Procedure name used by the procedure binding.
    pub fn procedure_name(&self) -> &'static str {
        match self {
            StoreCall::Ping => "ping",
            StoreCall::Insert { .. } => "insert_record",
            StoreCall::Upsert { .. } => "upsert_record",
            StoreCall::Update { .. } => "update_record",
            StoreCall::Delete { .. } => "delete_record",
            StoreCall::Scan { .. } => "scan_records",
        }
    }

    /// The call's arguments as a standalone JSON body (`null` for `Ping`).
    pub fn args(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("args")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuilds a call from a direct-binding op name and body.
    pub fn from_op(op: &str, args: serde_json::Value) -> Result<Self, StoreError> {
        let mut tagged = serde_json::json!({ "op": op });
        if !args.is_null() {
            tagged["args"] = args;
        }
        serde_json::from_value(tagged)
            .map_err(|e| StoreError::BadRequest(format!("{}: {}", op, e)))
    }

    /// Rebuilds a call from a procedure name and its arguments.
    pub fn from_procedure(name: &str, args: serde_json::Value) -> Result<Self, StoreError> {
        let op = match name {
            "ping" => "ping",
            "insert_record" => "insert",
            "upsert_record" => "upsert",
            "update_record" => "update",
            "delete_record" => "delete",
            "scan_records" => "scan",
            other => {
                return Err(StoreError::BadRequest(format!(
                    "unknown procedure {}",
                    other
                )));
            }
        };
        Self::from_op(op, args)
    }
}

/// Successful result of a `StoreCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoreReply {
    Ack,
    /// Whether an update/delete touched a row.
    Affected(bool),
    Rows(Vec<ProjectedRow>),
}

/// Body of a procedure-binding request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcedureCall {
    pub store: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Envelope returned by both bindings.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreResponse {
    /// Present on success.
    pub reply: Option<StoreReply>,
    /// Present on failure; the status code carries the error class.
    pub error: Option<String>,
}
