//! Value types exchanged between repositories and the schema cache.
//!
//! These are the Rust-native shapes of introspection results. They are
//! immutable once built; the cache shares them behind `Arc` snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Qualified address of a column.
///
/// Unique within one (schema, table) pair. The same table name may recur
/// under different schemas and each occurrence is a distinct table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnIdentity {
    pub schema: String,
    pub table: String,
    pub name: String,
}

impl ColumnIdentity {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.name)
    }
}

/// Description of a single column as reported by introspection.
///
/// `nullable` and `key` are free-form markers straight from the dialect
/// (`"YES"`/`"NO"`, `"PRI"`, `"MUL"`, ...); dialects disagree on the
/// vocabulary so they are not parsed into an enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub identity: ColumnIdentity,
    /// Dialect-native type name.
    pub data_type: String,
    pub nullable: String,
    pub key: String,
    pub default: Option<String>,
    /// Dialect-specific flags, e.g. `auto_increment`.
    pub extra: String,
}

impl ColumnDescriptor {
    /// Create a descriptor with empty markers; use the `with_*` builders to
    /// fill them in.
    pub fn new(identity: ColumnIdentity, data_type: impl Into<String>) -> Self {
        Self {
            identity,
            data_type: data_type.into(),
            nullable: String::new(),
            key: String::new(),
            default: None,
            extra: String::new(),
        }
    }

    pub fn with_nullable(mut self, nullable: impl Into<String>) -> Self {
        self.nullable = nullable.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Single-line summary: backticked type, key classification, extra flags.
    ///
    /// A key of `YES` renders as `PRIMARY KEY`; `NO` and empty keys are
    /// omitted.
    pub fn one_line(&self) -> String {
        let mut items: Vec<String> = Vec::new();
        if !self.data_type.is_empty() {
            items.push(format!("`{}`", self.data_type));
        }
        match self.key.as_str() {
            "" | "NO" => {}
            "YES" => items.push("PRIMARY KEY".to_string()),
            key => items.push(key.to_string()),
        }
        if !self.extra.is_empty() {
            items.push(self.extra.clone());
        }
        items.join(" ")
    }
}

/// One (local, referenced) column pair of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPair {
    pub local: ColumnIdentity,
    pub referenced: ColumnIdentity,
}

/// A foreign-key relation: an ordered, non-empty list of column pairs.
///
/// Composite keys carry several pairs in declaration order. Downstream code
/// joins pairs positionally, so the order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRelation {
    pairs: Vec<ColumnPair>,
}

impl ForeignKeyRelation {
    pub fn new(first: ColumnPair) -> Self {
        Self { pairs: vec![first] }
    }

    /// Append the next pair of a composite key.
    pub fn push(&mut self, pair: ColumnPair) {
        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[ColumnPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Schema and table owning the constraint.
    pub fn local_table(&self) -> (&str, &str) {
        let local = &self.pairs[0].local;
        (&local.schema, &local.table)
    }

    /// Schema and table the constraint points at.
    pub fn referenced_table(&self) -> (&str, &str) {
        let referenced = &self.pairs[0].referenced;
        (&referenced.schema, &referenced.table)
    }
}

/// One flat row of a foreign-key introspection query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRow {
    /// Constraint identifier; only compared for equality.
    pub constraint: String,
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// Absent when the dialect's query cannot report it.
    pub referenced_schema: Option<String>,
}

impl ForeignKeyRow {
    pub fn new(
        constraint: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            constraint: constraint.into(),
            table: table.into(),
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
            referenced_schema: None,
        }
    }

    pub fn with_referenced_schema(mut self, schema: impl Into<String>) -> Self {
        self.referenced_schema = Some(schema.into());
        self
    }
}

/// Result of a passthrough query. Cells are rendered as text; `None` is SQL
/// NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Result of a passthrough statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub rows_affected: u64,
}
