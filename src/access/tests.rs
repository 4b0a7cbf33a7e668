//! Access Layer Tests
//!
//! Runs the full service against an in-process `StoreHost` with three partitions.
//!
//! ## Test Scopes
//! - **Scatter-gather**: Union of node results, partial results, timeouts, panics.
//! - **Connections**: Every opened connection is released, on success and failure.
//! - **Writes**: Duplicate ids, owner-only update/delete, containment of node errors.
//! - **Replication**: Background copies, idempotence, replicas hidden from reads
//!   but listed in fragments.
//! - **Filters**: Predicate compilation, search, and the two-pass top percentile.

#[cfg(test)]
mod tests {
    use crate::access::connection::Connection;
    use crate::access::memory::MemoryConnector;
    use crate::access::predicate::{FilterSet, compile, cutoff_threshold};
    use crate::access::scatter::ScatterGather;
    use crate::access::service::RecordService;
    use crate::algorithms::sort::sort_by_id;
    use crate::directory::config::ClusterConfig;
    use crate::directory::partitioner::PartitionDirectory;
    use crate::directory::types::{NodeDescriptor, PartitionKey};
    use crate::error::AccessError;
    use crate::storage::memory::StoreHost;
    use crate::storage::types::{NodePredicate, Projection, Record};

    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct Cluster {
        host: Arc<StoreHost>,
        connector: Arc<MemoryConnector>,
        service: RecordService,
    }

    impl Cluster {
        fn new(replication: bool) -> Self {
            let host = StoreHost::new("root", "pw");
            let mut config = ClusterConfig::default();
            config.partitions.clear();
            config.replication_enabled = replication;
            config.node_timeout_ms = 200;

            for (name, store) in [("A", "db_a"), ("B", "db_b"), ("C", "db_c")] {
                host.provision(store);
                config.partitions.insert(
                    name.to_string(),
                    NodeDescriptor::new("http://in-process", "root", "pw", store),
                );
            }

            let directory = PartitionDirectory::from_config(&config).unwrap();
            let connector = MemoryConnector::new(host.clone());
            let service = RecordService::new(directory, connector.clone());

            Self {
                host,
                connector,
                service,
            }
        }

        /// Writes straight into a store, bypassing the service.
        fn seed(&self, store: &str, record: Record) {
            self.host.store(store).unwrap().insert(record).unwrap();
        }

        fn store_len(&self, store: &str) -> usize {
            self.host.store(store).unwrap().len()
        }
    }

    fn key(name: &str) -> PartitionKey {
        PartitionKey::normalized(name)
    }

    fn record(id: i64, name: &str, partition: &str, score: f64, presence: f64) -> Record {
        Record {
            id,
            name: name.to_string(),
            partition: key(partition),
            score,
            presence,
        }
    }

    fn sorted_ids(records: &[Record]) -> Vec<i64> {
        let mut ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        ids.sort();
        ids
    }

    fn seed_three(cluster: &Cluster) {
        cluster.seed("db_a", record(1, "Asha Rao", "A", 88.0, 90.0));
        cluster.seed("db_a", record(2, "Bilal", "A", 61.0, 70.0));
        cluster.seed("db_b", record(3, "Ravi", "B", 72.0, 55.0));
        cluster.seed("db_c", record(4, "asha k", "C", 40.0, 99.0));
    }

    // ============================================================
    // SCATTER-GATHER
    // ============================================================

    #[tokio::test]
    async fn test_fetch_all_is_union_of_partitions() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);

        let result = cluster.service.fetch_all().await;

        assert!(result.is_complete());
        assert_eq!(sorted_ids(&result.records), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_left_out() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        cluster.connector.set_unreachable("db_b", true);

        let result = cluster.service.fetch_all().await;

        assert_eq!(sorted_ids(&result.records), vec![1, 2, 4]);
        assert!(!result.is_complete());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].partition, key("B"));
        assert!(matches!(
            result.failures[0].error,
            AccessError::NodeUnreachable { .. }
        ));
    }

    #[tokio::test]
    async fn test_all_nodes_down_is_distinguishable_from_empty() {
        let cluster = Cluster::new(false);
        for store in ["db_a", "db_b", "db_c"] {
            cluster.connector.set_unreachable(store, true);
        }

        let down = cluster.service.fetch_all().await;
        assert!(down.is_empty());
        assert_eq!(down.failures.len(), 3);

        let empty = Cluster::new(false).service.fetch_all().await;
        assert!(empty.is_empty());
        assert!(empty.is_complete());
    }

    #[tokio::test]
    async fn test_stalled_node_bounded_by_timeout() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        cluster.connector.set_stalled("db_c", true);

        let started = Instant::now();
        let result = cluster.service.fetch_all().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(sorted_ids(&result.records), vec![1, 2, 3]);
        assert!(matches!(
            result.failures[0].error,
            AccessError::Timeout { after_ms: 200, .. }
        ));
    }

    #[tokio::test]
    async fn test_stalled_nodes_time_out_concurrently() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        for store in ["db_a", "db_b", "db_c"] {
            cluster.connector.set_stalled(store, true);
        }

        let started = Instant::now();
        let result = cluster.service.fetch_all().await;
        let elapsed = started.elapsed();

        // One 200ms window for all three, not three back to back.
        assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);
        assert!(result.is_empty());
        assert_eq!(result.failures.len(), 3);
        assert!(result.failures.iter().all(|f| matches!(
            f.error,
            AccessError::Timeout { after_ms: 200, .. }
        )));
        assert_eq!(cluster.connector.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_slow_units_overlap() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        let executor = ScatterGather::new(
            cluster.service.directory().clone(),
            cluster.connector.clone(),
        );
        let targets = cluster.service.directory().all_partitions();

        let started = Instant::now();
        let gathered = executor
            .scatter(&targets, |_, conn: Arc<dyn Connection>| async move {
                tokio::time::sleep(Duration::from_millis(120)).await;
                conn.scan(&NodePredicate::default(), &Projection::records())
                    .await
            })
            .await;
        let elapsed = started.elapsed();

        assert_eq!(gathered.rows.len(), 4);
        assert!(gathered.failures.is_empty());
        assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_failing_node_reports_query_execution() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        cluster.connector.set_failing("db_a", true);

        let result = cluster.service.fetch_all().await;

        assert_eq!(sorted_ids(&result.records), vec![3, 4]);
        assert!(matches!(
            result.failures[0].error,
            AccessError::QueryExecution { .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_unit_counts_as_failure() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        let executor = ScatterGather::new(
            cluster.service.directory().clone(),
            cluster.connector.clone(),
        );
        let targets = cluster.service.directory().all_partitions();

        let gathered = executor
            .scatter(&targets, |partition, conn: Arc<dyn Connection>| async move {
                if partition.as_str() == "B" {
                    panic!("unit for B blew up");
                }
                conn.scan(&NodePredicate::default(), &Projection::records())
                    .await
            })
            .await;

        assert_eq!(gathered.rows.len(), 3);
        assert_eq!(gathered.failures.len(), 1);
        assert_eq!(gathered.failures[0].partition, key("B"));
        assert_eq!(cluster.connector.open_connections(), 0);
    }

    // ============================================================
    // CONNECTIONS
    // ============================================================

    #[tokio::test]
    async fn test_connections_released_on_every_path() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);

        cluster.service.fetch_all().await;
        assert_eq!(cluster.connector.connections_opened(), 3);
        assert_eq!(cluster.connector.open_connections(), 0);

        cluster.connector.set_failing("db_b", true);
        cluster.service.fetch_all().await;
        assert!(
            !cluster
                .service
                .add_record(9, "Zed", "B", 10.0, 10.0)
                .await
                .unwrap()
        );
        assert_eq!(cluster.connector.connections_opened(), 7);
        assert_eq!(cluster.connector.open_connections(), 0);
    }

    // ============================================================
    // WRITES
    // ============================================================

    #[tokio::test]
    async fn test_insert_then_duplicate_is_rejected() {
        let cluster = Cluster::new(true);

        assert!(
            cluster
                .service
                .add_record(101, "Asha", "A", 88.5, 92.0)
                .await
                .unwrap()
        );
        let all = cluster.service.fetch_all().await;
        assert_eq!(all.records.iter().filter(|r| r.id == 101).count(), 1);

        assert!(
            !cluster
                .service
                .add_record(101, "Asha again", "a", 10.0, 10.0)
                .await
                .unwrap()
        );
        let after = cluster.service.fetch_all().await;
        assert_eq!(after.len(), all.len());
        assert_eq!(cluster.host.store("db_a").unwrap().get(101).unwrap().name, "Asha");
    }

    #[tokio::test]
    async fn test_delete_missing_record_changes_nothing() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);

        assert!(!cluster.service.delete_record(999, "C").await.unwrap());

        assert_eq!(cluster.store_len("db_a"), 2);
        assert_eq!(cluster.store_len("db_b"), 1);
        assert_eq!(cluster.store_len("db_c"), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_on_owner() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);

        assert!(cluster.service.update_record(3, "b", 95.0, 96.0).await.unwrap());
        let updated = cluster.host.store("db_b").unwrap().get(3).unwrap();
        assert_eq!((updated.score, updated.presence), (95.0, 96.0));

        assert!(!cluster.service.update_record(3, "A", 1.0, 1.0).await.unwrap());
        assert!(cluster.service.delete_record(3, "B").await.unwrap());
        assert_eq!(cluster.store_len("db_b"), 0);
    }

    #[tokio::test]
    async fn test_caller_errors_are_surfaced() {
        let cluster = Cluster::new(false);

        let unknown = cluster.service.add_record(1, "X", "ECE", 1.0, 1.0).await;
        assert!(matches!(unknown, Err(AccessError::UnknownPartition(_))));

        let score = cluster.service.add_record(1, "X", "A", 100.5, 1.0).await;
        assert!(matches!(score, Err(AccessError::InvalidRecord(_))));

        let name = cluster.service.add_record(1, "  ", "A", 1.0, 1.0).await;
        assert!(matches!(name, Err(AccessError::InvalidRecord(_))));

        let presence = cluster.service.update_record(1, "A", 1.0, -3.0).await;
        assert!(matches!(presence, Err(AccessError::InvalidRecord(_))));

        let delete = cluster.service.delete_record(1, "nowhere").await;
        assert!(matches!(delete, Err(AccessError::UnknownPartition(_))));

        assert_eq!(cluster.connector.connections_opened(), 0);
    }

    #[tokio::test]
    async fn test_owner_failures_become_false() {
        let cluster = Cluster::new(false);
        cluster.connector.set_unreachable("db_a", true);
        cluster.connector.set_stalled("db_b", true);

        let started = Instant::now();
        assert!(!cluster.service.add_record(1, "X", "A", 1.0, 1.0).await.unwrap());
        assert!(!cluster.service.add_record(2, "Y", "B", 1.0, 1.0).await.unwrap());
        assert!(!cluster.service.update_record(2, "B", 1.0, 1.0).await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    // ============================================================
    // REPLICATION
    // ============================================================

    #[tokio::test]
    async fn test_insert_replicates_to_other_partitions() {
        let cluster = Cluster::new(true);
        let asha = record(101, "Asha", "A", 88.5, 92.0);

        let receipt = cluster.service.writer().insert(asha.clone()).await.unwrap();
        let report = receipt.replication.unwrap().await.unwrap();

        assert_eq!(report.record_id, 101);
        assert!(report.failures.is_empty());
        assert_eq!(report.replicated.len(), 2);
        for store in ["db_b", "db_c"] {
            assert_eq!(cluster.host.store(store).unwrap().get(101).unwrap(), asha);
        }

        // Replicas stay out of reads.
        let all = cluster.service.fetch_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all.records[0].partition, key("A"));
    }

    #[tokio::test]
    async fn test_replication_is_idempotent() {
        let cluster = Cluster::new(true);
        let asha = record(101, "Asha", "A", 88.5, 92.0);

        let receipt = cluster.service.writer().insert(asha.clone()).await.unwrap();
        let first = receipt.replication.unwrap().await.unwrap();
        let second = cluster.service.writer().replicate(&asha, first.op_id.clone()).await;

        assert!(second.failures.is_empty());
        for store in ["db_a", "db_b", "db_c"] {
            assert_eq!(cluster.store_len(store), 1);
            assert_eq!(cluster.host.store(store).unwrap().get(101).unwrap(), asha);
        }
    }

    #[tokio::test]
    async fn test_replica_failure_does_not_fail_insert() {
        let cluster = Cluster::new(true);
        cluster.connector.set_unreachable("db_c", true);

        let receipt = cluster
            .service
            .writer()
            .insert(record(7, "Ravi", "A", 70.0, 80.0))
            .await
            .unwrap();
        let report = receipt.replication.unwrap().await.unwrap();

        assert_eq!(report.replicated, vec![key("B")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].partition, key("C"));
        assert_eq!(cluster.store_len("db_a"), 1);
        assert_eq!(cluster.store_len("db_c"), 0);
    }

    #[tokio::test]
    async fn test_replication_disabled() {
        let cluster = Cluster::new(false);

        let receipt = cluster
            .service
            .writer()
            .insert(record(7, "Ravi", "A", 70.0, 80.0))
            .await
            .unwrap();

        assert!(receipt.replication.is_none());
        assert_eq!(cluster.store_len("db_b"), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_leave_replicas_alone() {
        let cluster = Cluster::new(true);
        let receipt = cluster
            .service
            .writer()
            .insert(record(101, "Asha", "A", 88.5, 92.0))
            .await
            .unwrap();
        receipt.replication.unwrap().await.unwrap();

        // B holds a replica of 101 but does not own it.
        assert!(!cluster.service.update_record(101, "B", 1.0, 1.0).await.unwrap());
        assert!(!cluster.service.delete_record(101, "B").await.unwrap());
        assert_eq!(cluster.host.store("db_b").unwrap().get(101).unwrap().score, 88.5);

        assert!(cluster.service.update_record(101, "A", 50.0, 60.0).await.unwrap());
        assert_eq!(cluster.host.store("db_b").unwrap().get(101).unwrap().score, 88.5);
        let all = cluster.service.fetch_all().await;
        assert_eq!(all.records[0].score, 50.0);

        assert!(cluster.service.delete_record(101, "A").await.unwrap());
        assert!(cluster.service.fetch_all().await.is_empty());
        assert_eq!(cluster.store_len("db_c"), 1);
    }

    // ============================================================
    // FILTERS AND SEARCH
    // ============================================================

    #[tokio::test]
    async fn test_compile_builds_guarded_predicates() {
        let cluster = Cluster::new(false);
        let directory = cluster.service.directory();

        let filters = FilterSet::new()
            .partition("b")
            .score_range(Some(50.0), None)
            .name_contains("  ");
        let plan = compile(&filters, directory).unwrap();

        assert_eq!(plan.targets, vec![key("B")]);
        assert_eq!(plan.predicate.score_min, Some(50.0));
        assert_eq!(plan.predicate.name_contains, None);
        assert_eq!(plan.predicate_for(&key("B")).owner, Some(key("B")));

        let all = compile(&FilterSet::new().partition(""), directory).unwrap();
        assert_eq!(all.targets.len(), 3);
        assert!(all.predicate.is_empty());
    }

    #[tokio::test]
    async fn test_compile_rejects_bad_filters() {
        let cluster = Cluster::new(false);
        let directory = cluster.service.directory();

        for percentile in [0.0, -5.0, 100.5, f64::NAN] {
            let err = compile(&FilterSet::new().top_percentile(percentile), directory).unwrap_err();
            assert!(matches!(err, AccessError::InvalidFilter(_)));
        }

        let nan = FilterSet::new().score_range(Some(f64::NAN), None);
        assert!(matches!(
            compile(&nan, directory),
            Err(AccessError::InvalidFilter(_))
        ));

        let unknown = FilterSet::new().partition("ECE");
        assert!(matches!(
            compile(&unknown, directory),
            Err(AccessError::UnknownPartition(_))
        ));
    }

    #[tokio::test]
    async fn test_search_keyword_range_and_partition() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);

        let keyword = cluster.service.search(Some("ASHA"), None, None, None).await.unwrap();
        assert_eq!(sorted_ids(&keyword.records), vec![1, 4]);

        let ranged = cluster
            .service
            .search(Some("asha"), Some(50.0), None, None)
            .await
            .unwrap();
        assert_eq!(sorted_ids(&ranged.records), vec![1]);

        let scoped = cluster.service.search(None, None, Some(80.0), Some("a")).await.unwrap();
        assert_eq!(sorted_ids(&scoped.records), vec![2]);

        let bad = cluster.service.search(None, None, None, Some("Z")).await;
        assert!(matches!(bad, Err(AccessError::UnknownPartition(_))));
    }

    #[tokio::test]
    async fn test_filter_id_and_presence_ranges() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);

        let filters = FilterSet::new()
            .id_range(Some(2), Some(4))
            .presence_range(Some(60.0), None);
        let result = cluster.service.filter(&filters).await.unwrap();

        assert_eq!(sorted_ids(&result.records), vec![2, 4]);
    }

    #[test]
    fn test_cutoff_threshold() {
        let scores = [70.0, 90.0, 50.0, 80.0, 60.0];

        assert_eq!(cutoff_threshold(&scores, 20.0), Some(90.0));
        assert_eq!(cutoff_threshold(&scores, 40.0), Some(80.0));
        assert_eq!(cutoff_threshold(&scores, 100.0), Some(50.0));
        // floor(0.05) - 1 clamps to the first element.
        assert_eq!(cutoff_threshold(&scores, 1.0), Some(90.0));
        assert_eq!(cutoff_threshold(&[], 50.0), None);
    }

    #[tokio::test]
    async fn test_top_percentile_across_partitions() {
        let cluster = Cluster::new(false);
        cluster.seed("db_a", record(1, "s90", "A", 90.0, 1.0));
        cluster.seed("db_b", record(2, "s80", "B", 80.0, 1.0));
        cluster.seed("db_c", record(3, "s70", "C", 70.0, 1.0));
        cluster.seed("db_a", record(4, "s60", "A", 60.0, 1.0));
        cluster.seed("db_b", record(5, "s50", "B", 50.0, 1.0));

        let top = cluster
            .service
            .filter(&FilterSet::new().top_percentile(20.0))
            .await
            .unwrap();

        assert!(top.is_complete());
        assert_eq!(top.len(), 1);
        assert_eq!(top.records[0].score, 90.0);
    }

    #[tokio::test]
    async fn test_top_percentile_with_node_down() {
        let cluster = Cluster::new(false);
        cluster.seed("db_a", record(1, "s90", "A", 90.0, 1.0));
        cluster.seed("db_b", record(2, "s80", "B", 80.0, 1.0));
        cluster.seed("db_c", record(3, "s70", "C", 70.0, 1.0));
        cluster.seed("db_a", record(4, "s60", "A", 60.0, 1.0));
        cluster.seed("db_b", record(5, "s50", "B", 50.0, 1.0));
        cluster.connector.set_unreachable("db_c", true);

        let top = cluster
            .service
            .filter(&FilterSet::new().top_percentile(50.0))
            .await
            .unwrap();

        assert_eq!(sorted_ids(&top.records), vec![1, 2]);
        assert_eq!(top.failures.len(), 1);
        assert_eq!(top.failures[0].partition, key("C"));
    }

    #[tokio::test]
    async fn test_top_percentile_without_scores_is_empty() {
        let cluster = Cluster::new(false);

        let top = cluster
            .service
            .filter(&FilterSet::new().top_percentile(50.0))
            .await
            .unwrap();

        assert!(top.is_empty());
        assert!(top.is_complete());
        // Only the threshold pass ran.
        assert_eq!(cluster.connector.connections_opened(), 3);
    }

    // ============================================================
    // LOCAL ORDERING AND FRAGMENTS
    // ============================================================

    #[tokio::test]
    async fn test_sort_find_and_rank_over_gathered_rows() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        let all = cluster.service.fetch_all().await;

        let by_score: Vec<i64> = cluster
            .service
            .sort_by_score(&all.records)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(by_score, vec![4, 2, 3, 1]);

        let by_id = sort_by_id(&all.records);
        assert_eq!(cluster.service.find_by_id(&by_id, 3).unwrap().name, "Ravi");
        assert!(cluster.service.find_by_id(&by_id, 42).is_none());

        let ranked: Vec<i64> = cluster
            .service
            .rank_by_total(&all.records)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ranked, vec![1, 4, 2, 3]);
    }

    #[tokio::test]
    async fn test_fetch_fragments_reports_each_partition() {
        let cluster = Cluster::new(false);
        seed_three(&cluster);
        cluster.connector.set_unreachable("db_c", true);

        let fragments = cluster.service.fetch_fragments().await;

        let names: Vec<&str> = fragments.iter().map(|f| f.partition.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(fragments[0].store, "db_a");
        assert_eq!(fragments[0].records.as_ref().unwrap().len(), 2);
        assert_eq!(fragments[1].records.as_ref().unwrap().len(), 1);
        assert!(matches!(
            fragments[2].records,
            Err(AccessError::NodeUnreachable { .. })
        ));
        assert_eq!((fragments[2].owned(), fragments[2].replicas()), (0, 0));
    }

    #[tokio::test]
    async fn test_fetch_fragments_shows_replicas_held() {
        let cluster = Cluster::new(true);
        let asha = record(101, "Asha", "A", 88.5, 92.0);
        let receipt = cluster.service.writer().insert(asha.clone()).await.unwrap();
        receipt.replication.unwrap().await.unwrap();
        cluster.seed("db_b", record(3, "Ravi", "B", 72.0, 55.0));

        let fragments = cluster.service.fetch_fragments().await;

        let counts: Vec<(usize, usize)> = fragments
            .iter()
            .map(|f| (f.owned(), f.replicas()))
            .collect();
        assert_eq!(counts, vec![(1, 0), (1, 1), (0, 1)]);

        let held_by_b = fragments[1].records.as_ref().unwrap();
        assert_eq!(sorted_ids(held_by_b), vec![3, 101]);
        let replica = held_by_b.iter().find(|r| r.id == 101).unwrap();
        assert_eq!(replica, &asha);
        assert_eq!(replica.partition, key("A"));

        // Reads still count the replicated row once.
        assert_eq!(cluster.service.fetch_all().await.len(), 2);
    }
}
