//! Language Server Protocol surface for the schema cache

pub mod backend;
pub mod completion;
pub mod transport;

// Re-export main entry points
pub use backend::{InitializeOptions, LspBackend};
pub use transport::run_stdio;
