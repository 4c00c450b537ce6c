//! Schemalens CLI - run the language server or inspect a database's schema
//!
//! Usage:
//!   schemalens serve
//!   schemalens inspect --driver sqlite3 --source app.db
//!   schemalens inspect --connection default
//!
//! Examples:
//!   RUST_LOG=schemalens=debug schemalens serve
//!   schemalens inspect --source ./data/app.db --timeout-ms 2000

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use schemalens::config::{ConnectionConfig, Driver, Settings};
use schemalens::repository;
use schemalens::worker::RefreshWorker;
use schemalens::SchemaCache;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemalens")]
#[command(about = "Schemalens - schema-metadata cache and SQL language server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the language server over stdio
    Serve,

    /// Load a database's schema and print it
    Inspect {
        /// Database driver (sqlite3, mysql, postgres, sqlserver)
        #[arg(short, long, default_value = "sqlite3")]
        driver: String,

        /// Data source name (a file path for SQLite)
        #[arg(short, long, conflicts_with = "connection")]
        source: Option<String>,

        /// Named connection from the config file
        #[arg(short, long)]
        connection: Option<String>,

        /// How long to wait for columns and foreign keys
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.lsp.log_filter);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Serve => {
            runtime.block_on(schemalens::lsp::run_stdio());
            ExitCode::SUCCESS
        }
        Commands::Inspect {
            driver,
            source,
            connection,
            timeout_ms,
        } => {
            let config = match resolve_connection(&settings, &driver, source, connection) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            runtime.block_on(cmd_inspect(config, Duration::from_millis(timeout_ms)))
        }
    }
}

/// Logs go to stderr; stdout carries the LSP stream.
fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn resolve_connection(
    settings: &Settings,
    driver: &str,
    source: Option<String>,
    connection: Option<String>,
) -> Result<ConnectionConfig, String> {
    if let Some(name) = connection {
        let conn = settings.get_connection(&name).map_err(|e| e.to_string())?;
        return conn.to_connection_config().map_err(|e| e.to_string());
    }

    let driver = Driver::from_str(driver).map_err(|e| e.to_string())?;
    match source {
        Some(source) => Ok(ConnectionConfig::new(driver, source)),
        None => match settings.default_connection() {
            Some((_, conn)) => conn.to_connection_config().map_err(|e| e.to_string()),
            None => Ok(ConnectionConfig::new(driver, "")),
        },
    }
}

async fn cmd_inspect(config: ConnectionConfig, timeout: Duration) -> ExitCode {
    let repo = match repository::connect(&config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let worker = RefreshWorker::spawn();
    if let Err(e) = worker.bind(Arc::clone(&repo)).await {
        eprintln!("Error loading schema: {}", e);
        return ExitCode::FAILURE;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    while !worker.is_ready() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    if !worker.is_ready() {
        eprintln!("Warning: column refresh still running, output may be partial");
    }

    if let Some(cache) = worker.cache() {
        print_cache(&cache);
    }

    worker.stop();
    worker.join().await;
    ExitCode::SUCCESS
}

fn print_cache(cache: &SchemaCache) {
    if let Some(db) = cache.current_database() {
        println!("database: {}", db);
    }
    println!("default schema: {}", cache.default_schema());

    for schema in cache.schemas() {
        println!();
        println!("schema {}", schema);
        for table in cache.tables(schema) {
            println!("  {}", table);
            for column in cache.columns_in(schema, table).unwrap_or_default() {
                println!("    {:<24} {}", column.name(), column.one_line());
            }
            for fk in cache.foreign_keys_of(schema, table) {
                let (ref_schema, ref_table) = fk.referenced_table();
                let local: Vec<&str> = fk.pairs().iter().map(|p| p.local.name.as_str()).collect();
                let referenced: Vec<&str> = fk
                    .pairs()
                    .iter()
                    .map(|p| p.referenced.name.as_str())
                    .collect();
                println!(
                    "    fk ({}) -> {}.{} ({})",
                    local.join(", "),
                    ref_schema,
                    ref_table,
                    referenced.join(", ")
                );
            }
        }
    }
}
