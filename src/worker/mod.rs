//! Schema cache refresh worker.
//!
//! The worker keeps one [`SchemaCache`](crate::cache::SchemaCache) current
//! for a bound repository. Refreshing happens in two phases:
//!
//! ```text
//!   bind(repo) ──► primary refresh (caller's task)
//!                  topology: databases, schemas, tables
//!                  install new SchemaCache atomically
//!                        │
//!                        │ try_send(()) on a one-slot channel
//!                        ▼
//!                  secondary refresh (background task)
//!                  columns ──► swap column sub-map
//!                  foreign keys ──► swap foreign-key sub-map
//!                  mark ready
//! ```
//!
//! A failed primary refresh is returned to the caller. A failed secondary
//! refresh is logged, and the worker still becomes ready with the previous
//! detail left in place.
//!
//! # Example
//!
//! ```ignore
//! use schemalens::worker::RefreshWorker;
//!
//! let worker = RefreshWorker::spawn();
//! worker.bind(repo).await?;
//!
//! // Topology is usable immediately.
//! let cache = worker.cache().unwrap();
//! let tables: Vec<_> = cache.tables("main").collect();
//!
//! // Columns arrive once the background refresh finishes.
//! while !worker.is_ready() {
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//! }
//! ```

mod refresh;

pub use refresh::{RefreshStats, RefreshWorker, WorkerState};
