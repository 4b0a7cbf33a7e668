use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated partition name.
///
/// Keys are upper-cased on construction so `cse`, `Cse` and `CSE` route identically.
/// Outside this crate a key can only be obtained from `PartitionDirectory::resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub(crate) fn normalized(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to reach the store that holds one partition.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Base URL of the store host, e.g. `http://127.0.0.1:7100`.
    pub host: String,
    pub user: String,
    pub password: String,
    /// Name of the store on that host.
    pub store: String,
}

impl NodeDescriptor {
    pub fn new(host: &str, user: &str, password: &str, store: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            store: store.to_string(),
        }
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("store", &self.store)
            .finish()
    }
}
