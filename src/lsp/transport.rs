//! Transport layer - stdio
//!
//! Native editors (Neovim, VS Code, Zed) talk to the server over
//! stdin/stdout, so logging must go to stderr.

use tower_lsp::{LspService, Server};

use super::backend::LspBackend;

/// Run the LSP server over stdio until the client disconnects.
pub async fn run_stdio() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(LspBackend::new);

    Server::new(stdin, stdout, socket).serve(service).await;
}
