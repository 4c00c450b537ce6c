#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use rusqlite::Connection;
    use schemalens::repository::{
        ColumnIdentity, ExecResult, SchemaError, SchemaRepository, SqliteRepository,
    };

    const MAIN_DDL: &str = "
        CREATE TABLE client_types (
            id INTEGER PRIMARY KEY,
            label TEXT
        );
        CREATE TABLE clients (
            id INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL DEFAULT 'anon',
            type_id INTEGER REFERENCES client_types
        );
        CREATE TABLE regions (
            country TEXT,
            code TEXT,
            PRIMARY KEY (country, code)
        );
        CREATE TABLE offices (
            id INTEGER PRIMARY KEY,
            country TEXT,
            code TEXT,
            FOREIGN KEY (country, code) REFERENCES regions (country, code)
        );
        INSERT INTO client_types (id, label) VALUES (1, 'retail'), (2, 'wholesale');
    ";

    const EXTRA_DDL: &str = "
        CREATE TABLE extra.clients (
            id INTEGER PRIMARY KEY,
            extra_data_field TEXT
        );
        CREATE TABLE extra.client_custom_info (
            client_id INTEGER REFERENCES clients (id),
            info TEXT
        );
    ";

    fn repo() -> SqliteRepository {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MAIN_DDL).unwrap();
        conn.execute("ATTACH DATABASE ':memory:' AS extra", []).unwrap();
        conn.execute_batch(EXTRA_DDL).unwrap();
        SqliteRepository::from_connection(conn)
    }

    #[tokio::test]
    async fn test_topology() {
        let repo = repo();

        assert_eq!(repo.current_database().await.unwrap(), ":memory:");
        assert_eq!(repo.current_schema().await.unwrap(), "main");
        assert_eq!(repo.schemas().await.unwrap(), vec!["main", "extra"]);

        let tables = repo.schema_tables().await.unwrap();
        assert_eq!(
            tables["main"],
            vec!["client_types", "clients", "regions", "offices"]
        );
        assert_eq!(tables["extra"], vec!["clients", "client_custom_info"]);
    }

    #[tokio::test]
    async fn test_columns() {
        let repo = repo();
        let columns = repo.describe_columns_by_schema("main").await.unwrap();

        let clients: Vec<_> = columns
            .iter()
            .filter(|c| c.identity.table == "clients")
            .collect();
        assert_eq!(clients.len(), 3);

        let id = clients[0];
        assert_eq!(id.key, "PRI");
        assert_eq!(id.extra, "auto_increment");
        assert_eq!(id.one_line(), "`INTEGER` PRI auto_increment");

        let name = clients[1];
        assert_eq!(name.nullable, "NO");
        assert_eq!(name.default.as_deref(), Some("'anon'"));
        assert_eq!(name.one_line(), "`VARCHAR(255)`");

        // Composite keys do not alias the rowid.
        let regions: Vec<_> = columns
            .iter()
            .filter(|c| c.identity.table == "regions")
            .collect();
        assert!(regions.iter().all(|c| c.key == "PRI" && c.extra.is_empty()));
    }

    #[tokio::test]
    async fn test_database_columns_cover_attached_schemas() {
        let repo = repo();
        let columns = repo.describe_database_columns().await.unwrap();

        assert!(columns
            .iter()
            .any(|c| c.identity == ColumnIdentity::new("extra", "clients", "extra_data_field")));
        assert!(!columns
            .iter()
            .any(|c| c.identity == ColumnIdentity::new("main", "clients", "extra_data_field")));
    }

    #[tokio::test]
    async fn test_foreign_keys() {
        let repo = repo();
        let relations = repo.describe_foreign_keys_by_schema("main").await.unwrap();
        assert_eq!(relations.len(), 2);

        // `REFERENCES client_types` without a column list targets its key.
        let implicit = &relations[0];
        assert_eq!(implicit.local_table(), ("main", "clients"));
        assert_eq!(
            implicit.pairs()[0].referenced,
            ColumnIdentity::new("main", "client_types", "id")
        );

        let composite = &relations[1];
        assert_eq!(composite.local_table(), ("main", "offices"));
        let pairs: Vec<_> = composite
            .pairs()
            .iter()
            .map(|p| (p.local.name.as_str(), p.referenced.name.as_str()))
            .collect();
        assert_eq!(pairs, vec![("country", "country"), ("code", "code")]);
    }

    #[tokio::test]
    async fn test_foreign_keys_in_attached_schema() {
        let repo = repo();
        let relations = repo.describe_foreign_keys_by_schema("extra").await.unwrap();

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].referenced_table(), ("extra", "clients"));
    }

    #[tokio::test]
    async fn test_dangling_reference_is_skipped() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE clients (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE orders (id INTEGER PRIMARY KEY, client_id INTEGER REFERENCES clients (id));
             CREATE TABLE legacy (x INTEGER REFERENCES dropped_table);
             CREATE TABLE notes (
                 stale INTEGER REFERENCES dropped_table,
                 client INTEGER REFERENCES clients
             );",
        )
        .unwrap();
        let repo = SqliteRepository::from_connection(conn);

        let relations = repo.describe_foreign_keys_by_schema("main").await.unwrap();
        let tables: Vec<_> = relations
            .iter()
            .map(|r| (r.local_table(), r.referenced_table()))
            .collect();
        assert_eq!(
            tables,
            vec![
                (("main", "orders"), ("main", "clients")),
                (("main", "notes"), ("main", "clients")),
            ]
        );
        assert_eq!(
            relations[1].pairs()[0].referenced,
            ColumnIdentity::new("main", "clients", "id")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_introspection() {
        let repo = Arc::new(repo());

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.describe_database_columns().await })
            })
            .collect();
        for task in tasks {
            let columns = task.await.unwrap().unwrap();
            assert!(columns.iter().any(|c| c.identity.schema == "extra"));
        }
    }

    #[tokio::test]
    async fn test_long_query_yields_to_runtime() {
        let repo = repo();
        let ticked = Arc::new(AtomicBool::new(false));
        let tick = {
            let ticked = Arc::clone(&ticked);
            tokio::spawn(async move { ticked.store(true, Ordering::SeqCst) })
        };

        // Single-threaded runtime: the spawned task only runs if the query
        // gives the thread back while it executes.
        let result = repo
            .query(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 2000000) \
                 SELECT count(*) FROM n",
            )
            .await
            .unwrap();
        assert!(ticked.load(Ordering::SeqCst));
        assert_eq!(result.rows, vec![vec![Some("2000000".to_string())]]);
        tick.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_and_exec() {
        let repo = repo();

        let result = repo
            .query("SELECT id, label FROM client_types ORDER BY id")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["id", "label"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Some("1".to_string()), Some("retail".to_string())],
                vec![Some("2".to_string()), Some("wholesale".to_string())],
            ]
        );

        let exec = repo
            .exec("UPDATE client_types SET label = NULL WHERE id = 2")
            .await
            .unwrap();
        assert_eq!(exec, ExecResult { rows_affected: 1 });

        let result = repo
            .query("SELECT label FROM client_types WHERE id = 2")
            .await
            .unwrap();
        assert_eq!(result.rows, vec![vec![None]]);
    }

    #[tokio::test]
    async fn test_bad_sql_surfaces_driver_error() {
        let repo = repo();
        let err = repo.query("SELECT * FROM nowhere").await.unwrap_err();
        assert!(matches!(err, SchemaError::Sqlite(_)));
        assert!(!err.is_not_implemented());
    }

    #[tokio::test]
    async fn test_attach() {
        let repo = SqliteRepository::open(":memory:").unwrap();
        repo.attach(":memory:", "archive").unwrap();

        assert_eq!(repo.schemas().await.unwrap(), vec!["main", "archive"]);
        let tables = repo.schema_tables().await.unwrap();
        assert!(tables["archive"].is_empty());
    }
}
