#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use schemalens::repository::SchemaError;
    use schemalens::worker::{RefreshWorker, WorkerState};

    use super::common::{clients_fixture, shared, wait_ready, wait_until, Fixture, MemoryRepository};

    #[tokio::test]
    async fn test_new_worker_is_idle() {
        let worker = RefreshWorker::spawn();
        assert!(!worker.is_ready());
        assert!(worker.cache().is_none());
        assert_eq!(worker.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_topology_available_before_ready() {
        let repo = shared(MemoryRepository::new(clients_fixture()).gated());
        let worker = RefreshWorker::spawn();

        worker.bind(repo.clone()).await.unwrap();

        // Secondary refresh is parked at the gate.
        wait_until(|| repo.column_calls.load(Ordering::SeqCst) == 1).await;
        assert!(!worker.is_ready());
        assert_eq!(worker.state(), WorkerState::RefreshingSecondary);

        let cache = worker.cache().unwrap();
        assert_eq!(cache.default_schema(), "public");
        assert_eq!(cache.current_database(), Some("appdb"));
        assert_eq!(cache.schemas().collect::<Vec<_>>(), vec!["public", "extra"]);
        assert_eq!(
            cache.tables("extra").collect::<Vec<_>>(),
            vec!["clients", "client_custom_info"]
        );
        assert!(cache.columns_of("clients").is_none());

        repo.release(1);
        wait_ready(&worker).await;
        assert_eq!(worker.state(), WorkerState::Ready);

        let columns = cache.columns_of("clients").unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].identity.schema, "public");
    }

    #[tokio::test]
    async fn test_ready_cache_has_columns_and_foreign_keys() {
        let repo = shared(MemoryRepository::new(clients_fixture()));
        let worker = RefreshWorker::spawn();

        worker.bind(repo).await.unwrap();
        wait_ready(&worker).await;

        let cache = worker.cache().unwrap();
        let extra = cache.columns_of("extra.clients").unwrap();
        assert_eq!(
            extra.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["id", "extra_data_field"]
        );

        let fks = cache.foreign_keys_of("extra", "client_custom_info");
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].referenced_table(), ("public", "clients"));
        assert!(cache.foreign_keys_of("public", "client_types").is_empty());
    }

    #[tokio::test]
    async fn test_requests_coalesce_while_running() {
        let repo = shared(MemoryRepository::new(clients_fixture()).gated());
        let worker = RefreshWorker::spawn();

        worker.bind(repo.clone()).await.unwrap();
        wait_until(|| repo.column_calls.load(Ordering::SeqCst) == 1).await;

        // One fills the slot, the rest collapse into it.
        for _ in 0..5 {
            worker.request_secondary_refresh();
        }
        assert!(!worker.is_ready());

        repo.release(10);
        wait_ready(&worker).await;

        let stats = worker.stats();
        assert_eq!(stats.requested, 6);
        assert_eq!(stats.completed_runs, 2);
        assert!(stats.completed_runs <= stats.requested);
    }

    #[tokio::test]
    async fn test_request_after_ready_clears_readiness() {
        let repo = shared(MemoryRepository::new(clients_fixture()).gated());
        let worker = RefreshWorker::spawn();

        worker.bind(repo.clone()).await.unwrap();
        repo.release(1);
        wait_ready(&worker).await;

        worker.request_secondary_refresh();
        assert!(!worker.is_ready());

        repo.release(1);
        wait_ready(&worker).await;
        assert_eq!(worker.stats().completed_runs, 2);
    }

    #[tokio::test]
    async fn test_failed_bind_keeps_previous_cache() {
        let repo = shared(MemoryRepository::new(clients_fixture()));
        let worker = RefreshWorker::spawn();
        worker.bind(repo).await.unwrap();
        wait_ready(&worker).await;
        let before = worker.cache().unwrap();

        let broken = shared(MemoryRepository::new(Fixture::new("other")));
        broken.fail_topology.store(true, Ordering::SeqCst);
        let err = worker.bind(broken).await.unwrap_err();

        assert!(matches!(err, SchemaError::ConnectionFailed(_)));
        assert!(!err.is_not_implemented());

        let after = worker.cache().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.generation(), 1);
        assert!(worker.is_ready());
    }

    #[tokio::test]
    async fn test_rebind_installs_new_generation() {
        let repo = shared(MemoryRepository::new(clients_fixture()));
        let worker = RefreshWorker::spawn();
        worker.bind(repo).await.unwrap();
        wait_ready(&worker).await;

        let next = shared(
            MemoryRepository::new(Fixture::new("main").table("main", "orders", &[("id", "int", "PRI")]))
                .gated(),
        );
        worker.bind(next.clone()).await.unwrap();

        // The new snapshot is published before its detail arrives.
        assert!(!worker.is_ready());
        let cache = worker.cache().unwrap();
        assert_eq!(cache.generation(), 2);
        assert_eq!(cache.schemas().collect::<Vec<_>>(), vec!["main"]);
        assert!(!cache.has_table("public", "clients"));

        next.release(1);
        wait_ready(&worker).await;
        assert_eq!(cache.columns_of("orders").unwrap()[0].name(), "id");
    }

    #[tokio::test]
    async fn test_rebind_during_refresh_discards_stale_detail() {
        let first = shared(MemoryRepository::new(clients_fixture()).gated());
        let worker = RefreshWorker::spawn();
        worker.bind(first.clone()).await.unwrap();
        wait_until(|| first.column_calls.load(Ordering::SeqCst) == 1).await;

        // Rebind while the first binding's columns are still in flight; the
        // new binding's own column query fails.
        let second = MemoryRepository::new(
            Fixture::new("main").table("main", "orders", &[("id", "int", "PRI")]),
        );
        second.fail_columns.store(true, Ordering::SeqCst);
        worker.bind(shared(second)).await.unwrap();

        first.release(1);
        wait_ready(&worker).await;

        let cache = worker.cache().unwrap();
        assert_eq!(cache.generation(), 2);
        assert!(cache.columns_of("public.clients").is_none());
        assert!(cache.columns_of("orders").is_none());
        assert!(cache.column_snapshot().is_empty());
        assert!(cache.foreign_keys_of("public", "clients").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_binds_install_latest_generation() {
        let worker = Arc::new(RefreshWorker::spawn());

        let binds: Vec<_> = (0..8)
            .map(|_| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    worker
                        .bind(shared(MemoryRepository::new(clients_fixture())))
                        .await
                })
            })
            .collect();
        for bind in binds {
            bind.await.unwrap().unwrap();
        }

        assert_eq!(worker.cache().unwrap().generation(), 8);
        wait_ready(&worker).await;
    }

    #[tokio::test]
    async fn test_secondary_failure_keeps_previous_detail() {
        let repo = shared(MemoryRepository::new(clients_fixture()));
        let worker = RefreshWorker::spawn();
        worker.bind(repo.clone()).await.unwrap();
        wait_ready(&worker).await;

        repo.fail_columns.store(true, Ordering::SeqCst);
        worker.request_secondary_refresh();
        wait_ready(&worker).await;

        let cache = worker.cache().unwrap();
        assert_eq!(cache.columns_of("client_types").unwrap().len(), 2);
        assert_eq!(worker.stats().completed_runs, 2);
    }

    #[tokio::test]
    async fn test_secondary_failure_still_becomes_ready() {
        let repo = MemoryRepository::new(clients_fixture());
        repo.fail_columns.store(true, Ordering::SeqCst);
        let repo = shared(repo);
        let worker = RefreshWorker::spawn();

        worker.bind(repo).await.unwrap();
        wait_ready(&worker).await;

        let cache = worker.cache().unwrap();
        assert!(cache.columns_of("clients").is_none());
        // Foreign keys are refreshed independently of columns.
        assert_eq!(cache.foreign_keys_of("public", "clients").len(), 1);
    }

    #[tokio::test]
    async fn test_per_schema_column_fallback() {
        let repo = shared(MemoryRepository::new(clients_fixture()).without_database_columns());
        let worker = RefreshWorker::spawn();

        worker.bind(repo.clone()).await.unwrap();
        wait_ready(&worker).await;

        assert_eq!(repo.column_calls.load(Ordering::SeqCst), 0);
        assert_eq!(repo.schema_column_calls.load(Ordering::SeqCst), 2);
        let cache = worker.cache().unwrap();
        assert!(cache.columns_of("extra.client_custom_info").is_some());
        assert!(cache.columns_of("public.clients").is_some());
    }

    #[tokio::test]
    async fn test_foreign_keys_not_implemented() {
        let repo = shared(MemoryRepository::new(clients_fixture()).without_foreign_keys());
        let worker = RefreshWorker::spawn();

        worker.bind(repo).await.unwrap();
        wait_ready(&worker).await;

        let cache = worker.cache().unwrap();
        assert!(cache.columns_of("clients").is_some());
        assert_eq!(cache.foreign_key_snapshot().relation_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_terminal() {
        let repo = shared(MemoryRepository::new(clients_fixture()));
        let worker = RefreshWorker::spawn();
        worker.bind(repo.clone()).await.unwrap();
        wait_ready(&worker).await;

        worker.stop();
        tokio::time::timeout(Duration::from_secs(5), worker.join())
            .await
            .unwrap();
        assert_eq!(worker.state(), WorkerState::Stopped);

        let err = worker.bind(repo).await.unwrap_err();
        assert!(matches!(err, SchemaError::WorkerStopped));

        // Requests after exit are dropped, not queued.
        worker.request_secondary_refresh();
        assert_eq!(worker.stats().completed_runs, 1);

        // Second stop is a no-op.
        worker.stop();
    }

    #[tokio::test]
    async fn test_workers_are_independent() {
        let a = RefreshWorker::spawn();
        let b = RefreshWorker::spawn();

        a.bind(shared(MemoryRepository::new(clients_fixture())))
            .await
            .unwrap();
        wait_ready(&a).await;

        assert!(b.cache().is_none());
        assert!(!b.is_ready());
    }
}
