//! End-to-end tests over real HTTP.
//!
//! Store hosts run on ephemeral ports with `axum::serve`; the access layer talks to
//! them through `HttpConnector` using both bindings.

use fragstore::access::http::HttpConnector;
use fragstore::access::service::RecordService;
use fragstore::directory::config::{Binding, ClusterConfig};
use fragstore::directory::partitioner::PartitionDirectory;
use fragstore::directory::types::NodeDescriptor;
use fragstore::error::AccessError;
use fragstore::storage::handlers::store_router;
use fragstore::storage::memory::StoreHost;
use std::sync::Arc;

async fn spawn_host(stores: &[&str]) -> (Arc<StoreHost>, String) {
    let host = StoreHost::new("root", "admin");
    for store in stores {
        host.provision(store);
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = store_router(host.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (host, format!("http://{}", addr))
}

/// An address nothing listens on.
async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn config(partitions: &[(&str, &str, &str)]) -> ClusterConfig {
    let mut config = ClusterConfig::default();
    config.partitions.clear();
    config.node_timeout_ms = 1_000;
    for (name, host, store) in partitions {
        config.partitions.insert(
            name.to_string(),
            NodeDescriptor::new(host, "root", "admin", store),
        );
    }
    config
}

fn service(config: &ClusterConfig) -> RecordService {
    let directory = PartitionDirectory::from_config(config).unwrap();
    let connector = HttpConnector::from_config(config).unwrap();
    RecordService::new(directory, connector)
}

#[tokio::test]
async fn test_direct_binding_round_trip() {
    let (cse_host, cse_url) = spawn_host(&["db_cse"]).await;
    let (aiml_host, aiml_url) = spawn_host(&["db_aiml"]).await;
    let config = config(&[("CSE", cse_url.as_str(), "db_cse"), ("AIML", aiml_url.as_str(), "db_aiml")]);
    let service = service(&config);

    assert!(service.add_record(101, "Asha", "cse", 88.5, 92.0).await.unwrap());
    assert!(service.add_record(202, "Ravi", "AIML", 64.0, 71.0).await.unwrap());
    assert!(!service.add_record(101, "Asha", "CSE", 88.5, 92.0).await.unwrap());

    let all = service.fetch_all().await;
    assert!(all.is_complete());
    let mut ids: Vec<i64> = all.records.iter().map(|r| r.id).collect();
    ids.sort();
    assert_eq!(ids, vec![101, 202]);

    let found = service.search(Some("RAV"), None, None, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found.records[0].id, 202);

    assert!(service.update_record(202, "aiml", 90.0, 91.0).await.unwrap());
    assert_eq!(aiml_host.store("db_aiml").unwrap().get(202).unwrap().score, 90.0);

    assert!(service.delete_record(101, "CSE").await.unwrap());
    assert!(!service.delete_record(101, "CSE").await.unwrap());
    assert!(cse_host.store("db_cse").unwrap().get(101).is_none());
}

#[tokio::test]
async fn test_replication_over_http() {
    let (_, cse_url) = spawn_host(&["db_cse"]).await;
    let (aiml_host, aiml_url) = spawn_host(&["db_aiml"]).await;
    let config = config(&[("CSE", cse_url.as_str(), "db_cse"), ("AIML", aiml_url.as_str(), "db_aiml")]);
    let service = service(&config);
    let key = service.directory().resolve("CSE").unwrap();

    let record = fragstore::storage::types::Record {
        id: 7,
        name: "Mira".to_string(),
        partition: key,
        score: 77.0,
        presence: 66.0,
    };
    let receipt = service.writer().insert(record.clone()).await.unwrap();
    let report = receipt.replication.unwrap().await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(aiml_host.store("db_aiml").unwrap().get(7).unwrap(), record);

    let again = service.writer().replicate(&record, report.op_id).await;
    assert!(again.failures.is_empty());
    assert_eq!(aiml_host.store("db_aiml").unwrap().len(), 1);

    assert_eq!(service.fetch_all().await.len(), 1);
}

#[tokio::test]
async fn test_unreachable_host_yields_partial_result() {
    let (_, cse_url) = spawn_host(&["db_cse"]).await;
    let dead = dead_address().await;
    let mut config = config(&[("CSE", cse_url.as_str(), "db_cse"), ("AIML", dead.as_str(), "db_aiml")]);
    config.replication_enabled = false;
    let service = service(&config);

    assert!(service.add_record(1, "Asha", "CSE", 50.0, 50.0).await.unwrap());
    assert!(!service.add_record(2, "Ravi", "AIML", 50.0, 50.0).await.unwrap());

    let all = service.fetch_all().await;
    assert_eq!(all.len(), 1);
    assert!(!all.is_complete());
    assert!(matches!(
        all.failures[0].error,
        AccessError::NodeUnreachable { .. }
    ));
}

#[tokio::test]
async fn test_bad_credentials_are_unreachable() {
    let (_, url) = spawn_host(&["db_cse"]).await;
    let mut config = config(&[("CSE", url.as_str(), "db_cse")]);
    if let Some(descriptor) = config.partitions.get_mut("CSE") {
        descriptor.password = "wrong".to_string();
    }
    let service = service(&config);

    assert!(!service.add_record(1, "Asha", "CSE", 50.0, 50.0).await.unwrap());
    let all = service.fetch_all().await;
    assert!(matches!(
        all.failures[0].error,
        AccessError::NodeUnreachable { .. }
    ));
}

#[tokio::test]
async fn test_procedure_binding_round_trip() {
    let (host, url) = spawn_host(&["db_cse", "db_aiml"]).await;
    let mut config = config(&[
        ("CSE", "http://unused.invalid", "db_cse"),
        ("AIML", "http://unused.invalid", "db_aiml"),
    ]);
    config.binding = Binding::Procedure;
    config.procedure_host = Some(url);
    config.replication_enabled = false;
    let service = service(&config);

    assert!(service.add_record(1, "Asha", "CSE", 95.0, 80.0).await.unwrap());
    assert!(service.add_record(2, "Ravi", "AIML", 40.0, 60.0).await.unwrap());
    assert!(!service.add_record(2, "Ravi", "AIML", 40.0, 60.0).await.unwrap());

    assert_eq!(host.store("db_cse").unwrap().len(), 1);
    assert_eq!(host.store("db_aiml").unwrap().len(), 1);

    let top = service
        .filter(&fragstore::access::predicate::FilterSet::new().top_percentile(50.0))
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top.records[0].id, 1);

    let fragments = service.fetch_fragments().await;
    assert_eq!(fragments.len(), 2);
    assert!(fragments.iter().all(|f| f.records.is_ok()));
}
