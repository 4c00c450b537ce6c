//! SQLite implementation of [`SchemaRepository`].
//!
//! SQLite has no schemas in the `information_schema` sense; instead every
//! attached database is a schema (`main`, plus whatever was `ATTACH`ed).
//! That gives the same "one table name in several schemas" shape other
//! dialects have, so the cache is exercised the same way.
//!
//! Introspection goes through pragmas:
//!
//! ```text
//! schemas        PRAGMA database_list
//! tables         "<schema>".sqlite_master (rowid order = creation order)
//! columns        PRAGMA "<schema>".table_info("<table>")
//! foreign keys   PRAGMA "<schema>".foreign_key_list("<table>")
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use indexmap::IndexMap;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use tracing::debug;

use super::error::{SchemaError, SchemaResult};
use super::provider::SchemaRepository;
use super::types::{
    ColumnDescriptor, ColumnIdentity, ExecResult, ForeignKeyRelation, ForeignKeyRow, QueryResult,
};
use crate::cache::try_group_foreign_keys;
use crate::config::Driver;

const MEMORY: &str = ":memory:";

/// Schema repository over a single SQLite connection.
///
/// rusqlite connections are not `Sync`, so calls are serialized through a
/// mutex. Every trait call runs on the blocking pool; the lock is only ever
/// taken there.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open a database file, or an in-memory database for `:memory:` and
    /// the empty string.
    pub fn open(data_source_name: &str) -> SchemaResult<Self> {
        let conn = if data_source_name.is_empty() || data_source_name == MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(Path::new(data_source_name))
        }
        .map_err(|e| SchemaError::ConnectionFailed(format!("{data_source_name}: {e}")))?;

        Ok(Self::from_connection(conn))
    }

    /// Wrap a connection the caller has already prepared.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Attach another database file as `schema`.
    pub fn attach(&self, path: &str, schema: &str) -> SchemaResult<()> {
        lock(&self.conn).execute("ATTACH DATABASE ?1 AS ?2", params![path, schema])?;
        Ok(())
    }

    /// Run `f` against the connection on tokio's blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> SchemaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> SchemaResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&*lock(&conn)))
            .await
            .map_err(|e| SchemaError::Query(format!("sqlite task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // A panic mid-call leaves the connection itself usable.
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `(name, file)` of `main` and every attached database. The
/// connection-local `temp` schema is skipped.
fn list_schemas(conn: &Connection) -> SchemaResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().filter(|(name, _)| name != "temp").collect())
}

fn list_tables(conn: &Connection, schema: &str) -> SchemaResult<Vec<String>> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
         ORDER BY rowid",
        quote(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let tables = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tables)
}

struct TableInfoRow {
    name: String,
    data_type: String,
    not_null: bool,
    default: Option<String>,
    pk: i64,
}

fn table_info(conn: &Connection, schema: &str, table: &str) -> SchemaResult<Vec<TableInfoRow>> {
    let sql = format!("PRAGMA {}.table_info({})", quote(schema), quote(table));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TableInfoRow {
                name: row.get(1)?,
                data_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default: row.get(4)?,
                pk: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn describe_table(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> SchemaResult<Vec<ColumnDescriptor>> {
    let info = table_info(conn, schema, table)?;
    let pk_columns = info.iter().filter(|c| c.pk > 0).count();

    Ok(info
        .into_iter()
        .map(|c| {
            // A lone INTEGER PRIMARY KEY aliases the rowid and auto-assigns.
            let rowid_alias = c.pk > 0 && pk_columns == 1 && c.data_type.eq_ignore_ascii_case("INTEGER");
            ColumnDescriptor::new(ColumnIdentity::new(schema, table, c.name), c.data_type)
                .with_nullable(if c.not_null { "NO" } else { "YES" })
                .with_key(if c.pk > 0 { "PRI" } else { "" })
                .with_default(c.default)
                .with_extra(if rowid_alias { "auto_increment" } else { "" })
        })
        .collect())
}

fn describe_schema(conn: &Connection, schema: &str) -> SchemaResult<Vec<ColumnDescriptor>> {
    let mut columns = Vec::new();
    for table in list_tables(conn, schema)? {
        columns.extend(describe_table(conn, schema, &table)?);
    }
    Ok(columns)
}

/// Primary-key columns of `table`, in key order.
fn primary_key(conn: &Connection, schema: &str, table: &str) -> SchemaResult<Vec<String>> {
    let mut pk: Vec<(i64, String)> = table_info(conn, schema, table)?
        .into_iter()
        .filter(|c| c.pk > 0)
        .map(|c| (c.pk, c.name))
        .collect();
    pk.sort_by_key(|(position, _)| *position);
    Ok(pk.into_iter().map(|(_, name)| name).collect())
}

/// Foreign-key rows of one table ordered by (constraint id, seq).
///
/// A constraint whose implicit target columns cannot be resolved (the
/// referenced table was dropped, or has no primary key) is left out whole.
fn foreign_key_rows(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> SchemaResult<Vec<ForeignKeyRow>> {
    let sql = format!("PRAGMA {}.foreign_key_list({})", quote(schema), quote(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raw.sort_by_key(|(id, seq, ..)| (*id, *seq));

    let mut rows = Vec::with_capacity(raw.len());
    let mut current: Option<i64> = None;
    let mut group_start = 0;
    let mut skipped: Option<i64> = None;
    for (id, seq, referenced_table, column, referenced_column) in raw {
        if current != Some(id) {
            current = Some(id);
            group_start = rows.len();
        }
        if skipped == Some(id) {
            continue;
        }
        // `REFERENCES t` without a column list targets t's primary key.
        let referenced_column = match referenced_column {
            Some(name) => name,
            None => match primary_key(conn, schema, &referenced_table)?
                .into_iter()
                .nth(seq as usize)
            {
                Some(name) => name,
                None => {
                    debug!(
                        schema,
                        table,
                        referenced_table = referenced_table.as_str(),
                        "skipping foreign key with unresolvable target"
                    );
                    rows.truncate(group_start);
                    skipped = Some(id);
                    continue;
                }
            },
        };
        rows.push(ForeignKeyRow::new(
            id.to_string(),
            table,
            column,
            referenced_table,
            referenced_column,
        ));
    }
    Ok(rows)
}

fn render(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(format!("<{} bytes>", b.len())),
    }
}

#[async_trait]
impl SchemaRepository for SqliteRepository {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    async fn current_database(&self) -> SchemaResult<String> {
        self.with_conn(|conn| {
            let main = list_schemas(conn)?
                .into_iter()
                .find(|(name, _)| name == "main")
                .map(|(_, file)| file)
                .unwrap_or_default();
            Ok(if main.is_empty() { MEMORY.to_string() } else { main })
        })
        .await
    }

    async fn databases(&self) -> SchemaResult<Vec<String>> {
        Ok(vec![self.current_database().await?])
    }

    async fn current_schema(&self) -> SchemaResult<String> {
        Ok("main".to_string())
    }

    async fn schemas(&self) -> SchemaResult<Vec<String>> {
        self.with_conn(|conn| {
            Ok(list_schemas(conn)?
                .into_iter()
                .map(|(name, _)| name)
                .collect())
        })
        .await
    }

    async fn schema_tables(&self) -> SchemaResult<IndexMap<String, Vec<String>>> {
        self.with_conn(|conn| {
            let mut result = IndexMap::new();
            for (schema, _) in list_schemas(conn)? {
                let tables = list_tables(conn, &schema)?;
                result.insert(schema, tables);
            }
            Ok(result)
        })
        .await
    }

    async fn describe_database_columns(&self) -> SchemaResult<Vec<ColumnDescriptor>> {
        self.with_conn(|conn| {
            let mut columns = Vec::new();
            for (schema, _) in list_schemas(conn)? {
                columns.extend(describe_schema(conn, &schema)?);
            }
            Ok(columns)
        })
        .await
    }

    async fn describe_columns_by_schema(
        &self,
        schema: &str,
    ) -> SchemaResult<Vec<ColumnDescriptor>> {
        let schema = schema.to_string();
        self.with_conn(move |conn| describe_schema(conn, &schema))
            .await
    }

    async fn describe_foreign_keys_by_schema(
        &self,
        schema: &str,
    ) -> SchemaResult<Vec<ForeignKeyRelation>> {
        let schema = schema.to_string();
        self.with_conn(move |conn| {
            let tables = list_tables(conn, &schema)?;
            // Tables are walked one at a time and rows within a table are
            // sorted, so each constraint's rows arrive contiguously.
            let rows = tables
                .iter()
                .map(|table| foreign_key_rows(conn, &schema, table))
                .flat_map(|result| match result {
                    Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                });
            try_group_foreign_keys(rows, &schema)
        })
        .await
    }

    async fn query(&self, sql: &str) -> SchemaResult<QueryResult> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let width = columns.len();

            let mut rows = Vec::new();
            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    cells.push(render(row.get_ref(i)?));
                }
                rows.push(cells);
            }
            Ok(QueryResult { columns, rows })
        })
        .await
    }

    async fn exec(&self, sql: &str) -> SchemaResult<ExecResult> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let rows_affected = conn.execute(&sql, [])?;
            Ok(ExecResult {
                rows_affected: rows_affected as u64,
            })
        })
        .await
    }
}
