//! Schema repositories.
//!
//! A repository answers introspection queries for one SQL dialect. The
//! refresh worker is generic over [`SchemaRepository`] and never talks to a
//! driver directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      RefreshWorker                              │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │ Arc<dyn SchemaRepository>
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   SchemaRepository                              │
//! │  topology:  current_schema / schemas / schema_tables            │
//! │  detail:    describe_*_columns / describe_foreign_keys_*        │
//! │  preview:   query / exec                                        │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!                   SqliteRepository (rusqlite)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use schemalens::config::ConnectionConfig;
//! use schemalens::repository;
//!
//! let repo = repository::connect(&ConnectionConfig::sqlite("./app.db"))?;
//! let tables = repo.schema_tables().await?;
//! ```

mod error;
mod provider;
mod sqlite;
mod types;

use std::sync::Arc;

pub use error::{SchemaError, SchemaResult};
pub use provider::SchemaRepository;
pub use sqlite::SqliteRepository;
pub use types::*;

use crate::config::{ConnectionConfig, Driver};

/// Build the repository for a connection config.
///
/// Only SQLite has an introspection backend; other dialects fail with
/// [`SchemaError::UnsupportedDriver`].
pub fn connect(config: &ConnectionConfig) -> SchemaResult<Arc<dyn SchemaRepository>> {
    config.validate()?;
    match config.driver {
        Driver::Sqlite => Ok(Arc::new(SqliteRepository::open(&config.data_source_name)?)),
        other => Err(SchemaError::UnsupportedDriver(other.to_string())),
    }
}
