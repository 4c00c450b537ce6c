//! In-memory schema metadata cache.
//!
//! A [`SchemaCache`] is one snapshot of a database's schema as seen by the
//! completion engine. It has two tiers:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ SchemaCache                                                  │
//! │  topology (primary refresh, immutable)                       │
//! │    databases, default schema, schema -> [table, ...]         │
//! │  detail (secondary refresh, swapped as whole sub-maps)       │
//! │    columns:      RwLock<Arc<ColumnIndex>>                    │
//! │    foreign_keys: RwLock<Arc<ForeignKeyIndex>>                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers take an `Arc` snapshot of a sub-map and never observe one
//! half-written. Columns and foreign keys are replaced independently, so
//! they may come from different refresh cycles. Only the refresh worker
//! writes to a cache.
//!
//! # Unqualified table names
//!
//! The same table name may exist in several schemas. Lookups by bare name
//! resolve deterministically:
//!
//! 1. `schema.table` only consults that schema.
//! 2. A bare `table` tries the default schema first,
//! 3. then every schema in topology (registration) order,
//! 4. then schemas known only to the column index, sorted by name.
//!
//! Callers that need a specific schema should qualify the name.

mod foreign_keys;

pub use foreign_keys::{group_foreign_keys, try_group_foreign_keys};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::{IndexMap, IndexSet};

use crate::repository::{ColumnDescriptor, ForeignKeyRelation};

/// Key of the column index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedTable {
    pub schema: String,
    pub table: String,
}

impl QualifiedTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Split `schema.table` at the last dot. Returns `None` for bare names.
    pub fn parse(name: &str) -> Option<Self> {
        let (schema, table) = name.rsplit_once('.')?;
        if schema.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self::new(schema, table))
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Columns per qualified table, in ordinal order.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    tables: HashMap<QualifiedTable, Vec<ColumnDescriptor>>,
}

impl ColumnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index flat descriptors by their (schema, table), preserving order.
    pub fn from_columns<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = ColumnDescriptor>,
    {
        let mut index = Self::new();
        for column in columns {
            index.insert(column);
        }
        index
    }

    pub fn insert(&mut self, column: ColumnDescriptor) {
        let key = QualifiedTable::new(
            column.identity.schema.as_str(),
            column.identity.table.as_str(),
        );
        self.tables.entry(key).or_default().push(column);
    }

    pub fn get(&self, schema: &str, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables
            .get(&QualifiedTable::new(schema, table))
            .map(Vec::as_slice)
    }

    /// Number of tables with at least one column.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn schemas_sorted(&self) -> Vec<&str> {
        let mut schemas: Vec<&str> = self.tables.keys().map(|k| k.schema.as_str()).collect();
        schemas.sort_unstable();
        schemas.dedup();
        schemas
    }
}

/// Foreign-key relations per schema, per local table.
#[derive(Debug, Clone, Default)]
pub struct ForeignKeyIndex {
    schemas: HashMap<String, HashMap<String, Vec<ForeignKeyRelation>>>,
}

impl ForeignKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket one schema's relations by their local table.
    pub fn insert_schema(&mut self, schema: &str, relations: Vec<ForeignKeyRelation>) {
        let tables = self.schemas.entry(schema.to_string()).or_default();
        for relation in relations {
            let (_, table) = relation.local_table();
            tables.entry(table.to_string()).or_default().push(relation);
        }
    }

    pub fn get(&self, schema: &str, table: &str) -> &[ForeignKeyRelation] {
        self.schemas
            .get(schema)
            .and_then(|tables| tables.get(table))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of relations across all schemas.
    pub fn relation_count(&self) -> usize {
        self.schemas
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }
}

/// Topology gathered by a primary refresh.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub current_database: Option<String>,
    pub databases: Vec<String>,
    pub default_schema: String,
    pub schema_tables: IndexMap<String, IndexSet<String>>,
}

/// One snapshot of schema metadata.
#[derive(Debug)]
pub struct SchemaCache {
    generation: u64,
    topology: Topology,
    columns: RwLock<Arc<ColumnIndex>>,
    foreign_keys: RwLock<Arc<ForeignKeyIndex>>,
}

impl SchemaCache {
    /// Build a cache with topology only; detail starts empty.
    pub fn new(generation: u64, topology: Topology) -> Self {
        Self {
            generation,
            topology,
            columns: RwLock::new(Arc::new(ColumnIndex::new())),
            foreign_keys: RwLock::new(Arc::new(ForeignKeyIndex::new())),
        }
    }

    /// Primary-refresh generation that built this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // =========================================================================
    // Topology
    // =========================================================================

    pub fn current_database(&self) -> Option<&str> {
        self.topology.current_database.as_deref()
    }

    pub fn databases(&self) -> &[String] {
        &self.topology.databases
    }

    pub fn default_schema(&self) -> &str {
        &self.topology.default_schema
    }

    /// Schema names in registration order.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.topology.schema_tables.keys().map(String::as_str)
    }

    /// Tables of one schema in declaration order.
    pub fn tables(&self, schema: &str) -> impl Iterator<Item = &str> {
        self.topology
            .schema_tables
            .get(schema)
            .into_iter()
            .flat_map(|tables| tables.iter().map(String::as_str))
    }

    /// Every table of every schema, in topology order.
    pub fn all_tables(&self) -> impl Iterator<Item = QualifiedTable> + '_ {
        self.topology
            .schema_tables
            .iter()
            .flat_map(|(schema, tables)| {
                tables
                    .iter()
                    .map(move |table| QualifiedTable::new(schema.as_str(), table.as_str()))
            })
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.topology
            .schema_tables
            .get(schema)
            .is_some_and(|tables| tables.contains(table))
    }

    // =========================================================================
    // Detail
    // =========================================================================

    /// Current column sub-map.
    pub fn column_snapshot(&self) -> Arc<ColumnIndex> {
        Arc::clone(&read(&self.columns))
    }

    /// Current foreign-key sub-map.
    pub fn foreign_key_snapshot(&self) -> Arc<ForeignKeyIndex> {
        Arc::clone(&read(&self.foreign_keys))
    }

    /// Columns of `table`, which may be bare or `schema.table`.
    ///
    /// See the module docs for how bare names resolve.
    pub fn columns_of(&self, table: &str) -> Option<Vec<ColumnDescriptor>> {
        let index = self.column_snapshot();
        self.resolve_columns(&index, table).map(<[_]>::to_vec)
    }

    /// Columns of an explicitly qualified table.
    pub fn columns_in(&self, schema: &str, table: &str) -> Option<Vec<ColumnDescriptor>> {
        self.column_snapshot().get(schema, table).map(<[_]>::to_vec)
    }

    /// One column of `table`, using the same qualification rules as
    /// [`columns_of`](Self::columns_of).
    pub fn column(&self, table: &str, column: &str) -> Option<ColumnDescriptor> {
        let index = self.column_snapshot();
        self.resolve_columns(&index, table)?
            .iter()
            .find(|desc| desc.name() == column)
            .cloned()
    }

    /// Foreign keys declared by `schema.table`; empty when there are none.
    pub fn foreign_keys_of(&self, schema: &str, table: &str) -> Vec<ForeignKeyRelation> {
        self.foreign_key_snapshot().get(schema, table).to_vec()
    }

    fn resolve_columns<'a>(
        &self,
        index: &'a ColumnIndex,
        table: &str,
    ) -> Option<&'a [ColumnDescriptor]> {
        if let Some(qualified) = QualifiedTable::parse(table) {
            return index.get(&qualified.schema, &qualified.table);
        }

        if let Some(columns) = index.get(self.default_schema(), table) {
            return Some(columns);
        }

        if let Some(columns) = self.schemas().find_map(|schema| index.get(schema, table)) {
            return Some(columns);
        }

        index
            .schemas_sorted()
            .into_iter()
            .find_map(|schema| index.get(schema, table))
    }

    // =========================================================================
    // Write side (refresh worker only)
    // =========================================================================

    pub(crate) fn replace_columns(&self, columns: ColumnIndex) {
        *write(&self.columns) = Arc::new(columns);
    }

    pub(crate) fn replace_foreign_keys(&self, foreign_keys: ForeignKeyIndex) {
        *write(&self.foreign_keys) = Arc::new(foreign_keys);
    }
}

// A poisoned lock still guards a fully written Arc: the only write is a
// pointer store.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
