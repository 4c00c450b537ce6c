//! LSP Backend - implements tower_lsp::LanguageServer
//!
//! The backend owns one [`RefreshWorker`]. `initialize` binds it to the
//! connection from `initializationOptions` (or the environment / config
//! file), `workspace/didChangeConfiguration` rebinds it, and `shutdown`
//! stops it.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{info, warn};

use super::completion;
use crate::config::{ConnectionConfig, Settings};
use crate::repository::{self, SchemaError};
use crate::worker::RefreshWorker;

/// Options the client sends in `initializationOptions` or as the
/// `didChangeConfiguration` settings payload.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeOptions {
    #[serde(default)]
    pub connection_config: Option<ConnectionConfig>,
}

impl InitializeOptions {
    fn from_value(value: Option<Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::invalid_params(format!("invalid initializationOptions: {e}"))),
        }
    }
}

/// The LSP backend state.
pub struct LspBackend {
    /// The LSP client for sending notifications back to the editor.
    client: Client,
    /// Schema cache owner for this server instance.
    worker: RefreshWorker,
    /// Open documents, keyed by URI.
    documents: DashMap<Url, String>,
}

impl LspBackend {
    /// Create a new LSP backend. Must run inside a tokio runtime.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            worker: RefreshWorker::spawn(),
            documents: DashMap::new(),
        }
    }

    /// Get a reference to the client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a reference to the refresh worker.
    pub fn worker(&self) -> &RefreshWorker {
        &self.worker
    }

    /// Whether background schema population has finished.
    pub fn is_ready(&self) -> bool {
        self.worker.is_ready()
    }

    /// Build a repository for `config` and bind the worker to it.
    pub async fn connect(&self, config: &ConnectionConfig) -> std::result::Result<(), SchemaError> {
        let repo = repository::connect(config)?;
        self.worker.bind(Arc::clone(&repo)).await?;
        info!(driver = %config.driver, "bound schema cache");
        Ok(())
    }
}

/// Connection to use when the client sent none: environment first, then
/// the default entry of the config file.
fn fallback_connection() -> Option<ConnectionConfig> {
    if let Ok(config) = ConnectionConfig::from_env() {
        return Some(config);
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            warn!("ignoring config file: {e}");
            return None;
        }
    };
    let (name, conn) = settings.default_connection()?;
    match conn.to_connection_config() {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("ignoring connection {name}: {e}");
            None
        }
    }
}

fn bind_error(e: SchemaError) -> Error {
    let mut err = Error::internal_error();
    err.message = format!("failed to load database schema: {e}").into();
    err
}

#[tower_lsp::async_trait]
impl LanguageServer for LspBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let options = InitializeOptions::from_value(params.initialization_options)?;

        match options.connection_config.or_else(fallback_connection) {
            Some(config) => self.connect(&config).await.map_err(bind_error)?,
            None => info!("no database connection configured"),
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string()]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "schemalens".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "schemalens language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.worker.stop();
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let options = match InitializeOptions::from_value(Some(params.settings)) {
            Ok(options) => options,
            Err(e) => {
                self.client.show_message(MessageType::ERROR, e.message).await;
                return;
            }
        };
        let Some(config) = options.connection_config else {
            return;
        };

        if let Err(e) = self.connect(&config).await {
            warn!("rebind failed, keeping previous schema: {e}");
            self.client
                .show_message(MessageType::ERROR, format!("failed to load database schema: {e}"))
                .await;
        }
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.documents
            .insert(params.text_document.uri, params.text_document.text);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // With FULL sync, we get the entire document content
        if let Some(change) = params.content_changes.into_iter().next() {
            self.documents.insert(params.text_document.uri, change.text);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(cache) = self.worker.cache() else {
            return Ok(None);
        };
        let items = {
            let Some(doc) = self.documents.get(uri) else {
                return Ok(None);
            };
            let prefix = completion::identifier_before(doc.value(), position);
            completion::complete(&cache, prefix)
        };

        if items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CompletionResponse::Array(items)))
        }
    }
}
