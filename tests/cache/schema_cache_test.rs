#[path = "../common/mod.rs"]
mod common;

#[cfg(test)]
mod tests {
    use schemalens::cache::{QualifiedTable, SchemaCache};
    use schemalens::repository::{ColumnDescriptor, ColumnIdentity};
    use schemalens::worker::RefreshWorker;

    use super::common::{clients_fixture, shared, wait_ready, Fixture, MemoryRepository};

    async fn ready_cache(fixture: Fixture) -> (RefreshWorker, std::sync::Arc<SchemaCache>) {
        let worker = RefreshWorker::spawn();
        worker
            .bind(shared(MemoryRepository::new(fixture)))
            .await
            .unwrap();
        wait_ready(&worker).await;
        let cache = worker.cache().unwrap();
        (worker, cache)
    }

    fn names(columns: &[ColumnDescriptor]) -> Vec<&str> {
        columns.iter().map(|c| c.name()).collect()
    }

    #[tokio::test]
    async fn test_same_table_name_in_two_schemas() {
        let (_worker, cache) = ready_cache(clients_fixture()).await;

        let extra = cache.columns_of("extra.clients").unwrap();
        assert!(names(&extra).contains(&"extra_data_field"));

        let public = cache.columns_of("public.clients").unwrap();
        assert!(!names(&public).contains(&"extra_data_field"));
        assert_eq!(names(&public), vec!["id", "name", "type_id"]);

        assert_eq!(
            cache.columns_in("extra", "clients").unwrap(),
            extra,
        );
    }

    #[tokio::test]
    async fn test_bare_name_prefers_default_schema() {
        let (_worker, cache) = ready_cache(clients_fixture()).await;

        let columns = cache.columns_of("clients").unwrap();
        assert_eq!(columns[0].identity.schema, "public");

        // Only in `extra`, so the bare name still resolves.
        let info = cache.columns_of("client_custom_info").unwrap();
        assert_eq!(info[0].identity.schema, "extra");

        assert!(cache.columns_of("missing").is_none());
        assert!(cache.columns_of("nope.clients").is_none());
    }

    #[tokio::test]
    async fn test_single_column_lookup() {
        let (_worker, cache) = ready_cache(clients_fixture()).await;

        let column = cache.column("extra.clients", "extra_data_field").unwrap();
        assert_eq!(
            column.identity,
            ColumnIdentity::new("extra", "clients", "extra_data_field")
        );
        assert!(cache.column("clients", "extra_data_field").is_none());
        assert!(cache.column("clients", "id").is_some());
    }

    #[tokio::test]
    async fn test_foreign_keys_of_missing_is_empty() {
        let (_worker, cache) = ready_cache(clients_fixture()).await;

        assert!(cache.foreign_keys_of("public", "client_types").is_empty());
        assert!(cache.foreign_keys_of("nowhere", "nothing").is_empty());

        let fks = cache.foreign_keys_of("public", "clients");
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].pairs()[0].local.name, "type_id");
        assert_eq!(fks[0].referenced_table(), ("public", "client_types"));
    }

    #[tokio::test]
    async fn test_topology_enumeration() {
        let (_worker, cache) = ready_cache(clients_fixture()).await;

        let all: Vec<String> = cache.all_tables().map(|t| t.to_string()).collect();
        insta::assert_debug_snapshot!(all, @r###"
        [
            "public.clients",
            "public.client_types",
            "extra.clients",
            "extra.client_custom_info",
        ]
        "###);

        assert!(cache.has_table("extra", "clients"));
        assert!(!cache.has_table("extra", "client_types"));
        assert!(cache.databases().is_empty());
        assert_eq!(
            QualifiedTable::parse("extra.clients").unwrap().to_string(),
            "extra.clients"
        );
    }

    #[tokio::test]
    async fn test_one_line_rendering() {
        let (_worker, cache) = ready_cache(clients_fixture()).await;

        let rendered: Vec<String> = cache
            .columns_of("public.clients")
            .unwrap()
            .iter()
            .map(|c| format!("{}: {}", c.identity, c.one_line()))
            .collect();
        insta::assert_snapshot!(rendered.join("\n"), @r###"
        public.clients.id: `int` PRI
        public.clients.name: `varchar(255)`
        public.clients.type_id: `int` MUL
        "###);
    }
}
