//! Gateway Data Types
//!
//! Request and response bodies for the record gateway. Reads always report how
//! complete they are, so "no rows" and "no reachable partition" look different.

use crate::access::scatter::NodeFailure;
use crate::access::service::{Fragment, RecordSet};
use crate::storage::types::Record;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AddRecordRequest {
    pub id: i64,
    pub name: String,
    pub partition: String,
    pub score: f64,
    pub presence: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub score: f64,
    pub presence: f64,
}

/// Query string of `GET /records/search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub partition: Option<String>,
}

/// Outcome of an insert, update or delete.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: i64,
    pub partition: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailureItem {
    pub partition: String,
    pub error: String,
}

impl From<NodeFailure> for FailureItem {
    fn from(failure: NodeFailure) -> Self {
        Self {
            partition: failure.partition.to_string(),
            error: failure.error.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub complete: bool,
    pub count: usize,
    pub records: Vec<Record>,
    pub failures: Vec<FailureItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecordsResponse {
    pub fn rejected(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

impl From<RecordSet> for RecordsResponse {
    fn from(set: RecordSet) -> Self {
        Self {
            complete: set.is_complete(),
            count: set.records.len(),
            records: set.records,
            failures: set.failures.into_iter().map(FailureItem::from).collect(),
            error: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupResponse {
    pub id: i64,
    pub found: bool,
    pub record: Option<Record>,
    /// False if a partition was unreachable, in which case "not found" is not final.
    pub complete: bool,
    pub failures: Vec<FailureItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FragmentItem {
    pub partition: String,
    pub store: String,
    pub reachable: bool,
    pub count: usize,
    /// Rows owned by this partition; the rest of `count` are replicas.
    pub owned: usize,
    pub replicas: usize,
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Fragment> for FragmentItem {
    fn from(fragment: Fragment) -> Self {
        let partition = fragment.partition.to_string();
        let (owned, replicas) = (fragment.owned(), fragment.replicas());
        match fragment.records {
            Ok(records) => Self {
                partition,
                store: fragment.store,
                reachable: true,
                count: records.len(),
                owned,
                replicas,
                records,
                error: None,
            },
            Err(e) => Self {
                partition,
                store: fragment.store,
                reachable: false,
                count: 0,
                owned: 0,
                replicas: 0,
                records: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FragmentsResponse {
    pub fragments: Vec<FragmentItem>,
}
