//! HTTP connector for remote store hosts.
//!
//! Speaks either binding of the store protocol:
//! - **Direct**: each partition's calls go to its own descriptor host.
//! - **Procedure**: every call is a named procedure on one coordinator host.
//!
//! Connecting performs an authenticated `ping`, so an unreachable host, a bad
//! credential or a missing store all surface as `NodeUnreachable` up front.

use super::connection::{Connection, Connector};
use crate::directory::config::{Binding, ClusterConfig};
use crate::directory::types::{NodeDescriptor, PartitionKey};
use crate::error::{AccessError, ConfigError, Result};
use crate::storage::protocol::{
    HEADER_PASSWORD, HEADER_USER, ProcedureCall, StoreCall, StoreReply, StoreResponse,
};

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct HttpConnector {
    http_client: reqwest::Client,
    binding: Binding,
    procedure_host: Option<String>,
    timeout: Duration,
}

impl HttpConnector {
    pub fn direct(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            http_client: reqwest::Client::new(),
            binding: Binding::Direct,
            procedure_host: None,
            timeout,
        })
    }

    pub fn procedure(coordinator_host: &str, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            http_client: reqwest::Client::new(),
            binding: Binding::Procedure,
            procedure_host: Some(coordinator_host.trim_end_matches('/').to_string()),
            timeout,
        })
    }

    pub fn from_config(config: &ClusterConfig) -> std::result::Result<Arc<Self>, ConfigError> {
        let timeout = Duration::from_millis(config.node_timeout_ms);
        match config.binding {
            Binding::Direct => Ok(Self::direct(timeout)),
            Binding::Procedure => {
                let host = config.procedure_host.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("procedure binding requires procedure_host".to_string())
                })?;
                Ok(Self::procedure(host, timeout))
            }
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        partition: &PartitionKey,
        descriptor: &NodeDescriptor,
    ) -> Result<Box<dyn Connection>> {
        let base = match self.binding {
            Binding::Direct => descriptor.host.trim_end_matches('/').to_string(),
            Binding::Procedure => self.procedure_host.clone().unwrap_or_default(),
        };

        let conn = HttpConnection {
            http_client: self.http_client.clone(),
            binding: self.binding,
            base,
            partition: partition.clone(),
            descriptor: descriptor.clone(),
            timeout: self.timeout,
            released: AtomicBool::new(false),
        };

        match conn.call(StoreCall::Ping).await {
            Ok(_) => Ok(Box::new(conn)),
            Err(e @ AccessError::Timeout { .. }) => Err(e),
            Err(e) => Err(AccessError::NodeUnreachable {
                partition: partition.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

struct HttpConnection {
    http_client: reqwest::Client,
    binding: Binding,
    base: String,
    partition: PartitionKey,
    descriptor: NodeDescriptor,
    timeout: Duration,
    released: AtomicBool,
}

impl HttpConnection {
    fn query_error(&self, reason: String) -> AccessError {
        AccessError::QueryExecution {
            partition: self.partition.to_string(),
            reason,
        }
    }

    fn request(&self, call: &StoreCall) -> Result<(String, serde_json::Value)> {
        let args = call.args().map_err(|e| self.query_error(e.to_string()))?;
        match self.binding {
            Binding::Direct => Ok((
                format!("{}/stores/{}/{}", self.base, self.descriptor.store, call.op()),
                args,
            )),
            Binding::Procedure => {
                let body = serde_json::to_value(ProcedureCall {
                    store: self.descriptor.store.clone(),
                    args,
                })
                .map_err(|e| self.query_error(e.to_string()))?;
                Ok((
                    format!("{}/procedures/{}", self.base, call.procedure_name()),
                    body,
                ))
            }
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    async fn call(&self, call: StoreCall) -> Result<StoreReply> {
        let inserted_id = match &call {
            StoreCall::Insert { record } => Some(record.id),
            _ => None,
        };
        let (url, body) = self.request(&call)?;

        let response = self
            .http_client
            .post(url)
            .header(HEADER_USER, &self.descriptor.user)
            .header(HEADER_PASSWORD, &self.descriptor.password)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AccessError::Timeout {
                        partition: self.partition.to_string(),
                        after_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AccessError::NodeUnreachable {
                        partition: self.partition.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let envelope: Option<StoreResponse> = response.json().await.ok();
        let detail = envelope
            .as_ref()
            .and_then(|body| body.error.clone())
            .unwrap_or_else(|| status.to_string());

        match status {
            StatusCode::OK => envelope
                .and_then(|body| body.reply)
                .ok_or_else(|| self.query_error("empty reply".to_string())),
            StatusCode::CONFLICT => Err(AccessError::DuplicateKey {
                partition: self.partition.to_string(),
                id: inserted_id.unwrap_or_default(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Err(AccessError::NodeUnreachable {
                partition: self.partition.to_string(),
                reason: detail,
            }),
            _ => Err(self.query_error(detail)),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            tracing::trace!("Closing HTTP connection to {}", self.base);
        }
    }
}
