//! # Schemalens
//!
//! Schema-metadata cache for a SQL-aware language server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              LSP backend (tower-lsp, stdio)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │ bind / is_ready / cache
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RefreshWorker                         │
//! │   primary refresh (topology)  ─►  install SchemaCache    │
//! │   secondary refresh (columns, foreign keys, background)  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           SchemaRepository (SQLite, or yours)            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod lsp;
pub mod repository;
pub mod worker;

pub use cache::SchemaCache;
pub use repository::{SchemaError, SchemaRepository, SchemaResult};
pub use worker::RefreshWorker;
