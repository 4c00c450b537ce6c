//! SchemaRepository trait definition.
//!
//! A repository wraps one SQL dialect's introspection queries. The refresh
//! worker treats every call as a possibly slow, possibly failing remote
//! round trip: calls are issued sequentially within a refresh phase and are
//! never retried here. Retry policy, if any, belongs to the implementation.

use async_trait::async_trait;
use indexmap::IndexMap;

use super::error::{SchemaError, SchemaResult};
use super::types::{ColumnDescriptor, ExecResult, ForeignKeyRelation, QueryResult};
use crate::config::Driver;

/// Introspection contract for one SQL dialect.
///
/// Operations a dialect cannot answer return
/// [`SchemaError::NotImplemented`]; the defaults below do exactly that so
/// implementations only override what they support.
///
/// # Example
///
/// ```ignore
/// use schemalens::repository::SchemaRepository;
///
/// async fn list(repo: &dyn SchemaRepository) -> SchemaResult<()> {
///     for (schema, tables) in repo.schema_tables().await? {
///         println!("{schema}: {}", tables.join(", "));
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Dialect this repository speaks.
    fn driver(&self) -> Driver;

    // =========================================================================
    // Topology (primary refresh)
    // =========================================================================

    /// Name of the database the connection is using.
    async fn current_database(&self) -> SchemaResult<String> {
        Err(SchemaError::NotImplemented("current_database"))
    }

    /// All databases visible to the connection.
    async fn databases(&self) -> SchemaResult<Vec<String>> {
        Err(SchemaError::NotImplemented("databases"))
    }

    /// Schema unqualified names resolve against.
    async fn current_schema(&self) -> SchemaResult<String>;

    /// All schemas visible to the connection.
    async fn schemas(&self) -> SchemaResult<Vec<String>>;

    /// Tables (and views) per schema, in declaration order.
    async fn schema_tables(&self) -> SchemaResult<IndexMap<String, Vec<String>>>;

    // =========================================================================
    // Detail (secondary refresh)
    // =========================================================================

    /// Columns of every table in the database.
    async fn describe_database_columns(&self) -> SchemaResult<Vec<ColumnDescriptor>> {
        Err(SchemaError::NotImplemented("describe_database_columns"))
    }

    /// Columns of every table in one schema.
    async fn describe_columns_by_schema(&self, schema: &str)
        -> SchemaResult<Vec<ColumnDescriptor>>;

    /// Foreign keys declared by tables in one schema.
    async fn describe_foreign_keys_by_schema(
        &self,
        _schema: &str,
    ) -> SchemaResult<Vec<ForeignKeyRelation>> {
        Err(SchemaError::NotImplemented("describe_foreign_keys_by_schema"))
    }

    // =========================================================================
    // Passthrough (live data preview)
    // =========================================================================

    /// Run a row-returning statement.
    async fn query(&self, _sql: &str) -> SchemaResult<QueryResult> {
        Err(SchemaError::NotImplemented("query"))
    }

    /// Run a statement for its side effects.
    async fn exec(&self, _sql: &str) -> SchemaResult<ExecResult> {
        Err(SchemaError::NotImplemented("exec"))
    }
}
