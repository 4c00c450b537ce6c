//! Background refresh worker for the schema cache.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use indexmap::IndexSet;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{ColumnIndex, ForeignKeyIndex, SchemaCache, Topology};
use crate::repository::{SchemaError, SchemaRepository, SchemaResult};

/// Observable lifecycle state of a [`RefreshWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No cache installed yet.
    Idle,
    /// Cache installed and the latest requested secondary refresh is done.
    Ready,
    /// Cache installed, a secondary refresh is pending or running.
    RefreshingSecondary,
    /// Background loop told to exit; terminal.
    Stopped,
}

/// Refresh counters, for health checks and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    /// Secondary refreshes requested, coalesced or not.
    pub requested: u64,
    /// Secondary refresh loop iterations that ran to completion.
    pub completed_runs: u64,
}

/// State shared between the worker handle and its background task.
struct Shared {
    /// Held for every write: binding, cache install, sub-map replacement.
    write: Mutex<Option<Arc<dyn SchemaRepository>>>,
    /// Published snapshot. Read-locked only long enough to clone the `Arc`.
    cache: RwLock<Option<Arc<SchemaCache>>>,
    /// Last primary-refresh generation handed out.
    generation: AtomicU64,
    /// Bumped before each secondary request is signalled.
    requested: AtomicU64,
    /// `requested` value the last finished iteration started from.
    completed: AtomicU64,
    runs: AtomicU64,
    stopped: AtomicBool,
}

impl Shared {
    fn lock_write(&self) -> MutexGuard<'_, Option<Arc<dyn SchemaRepository>>> {
        self.write.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cache(&self) -> Option<Arc<SchemaCache>> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn install(&self, cache: Arc<SchemaCache>) {
        *self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(cache);
    }
}

/// Owns the schema cache lifecycle for one connection.
///
/// - [`bind`](Self::bind) runs the primary (topology) refresh on the
///   caller's task and installs a fresh [`SchemaCache`].
/// - A single background task runs secondary (column / foreign-key)
///   refreshes, triggered through a one-slot channel so duplicate triggers
///   collapse into one run.
/// - [`is_ready`](Self::is_ready) is a lock-free check for "the latest
///   requested secondary refresh has finished".
///
/// One worker belongs to one server instance; nothing here is global.
///
/// # Readiness ordering
///
/// Each request bumps `requested` *before* signalling the loop. Each loop
/// iteration snapshots `requested` when it starts, writes its sub-maps, and
/// only then stores that snapshot into `completed` (release). `is_ready`
/// loads both (acquire) and reports `completed == requested`. A reader that
/// sees `true` therefore sees the sub-maps of the most recently completed
/// run, and no request made after that run started can read as done.
pub struct RefreshWorker {
    shared: Arc<Shared>,
    update_tx: mpsc::Sender<()>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshWorker {
    /// Create the worker and start its background loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        let shared = Arc::new(Shared {
            write: Mutex::new(None),
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
            requested: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            runs: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });

        let (update_tx, update_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_loop(Arc::clone(&shared), update_rx, shutdown_rx));

        Self {
            shared,
            update_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Bind a repository: run the primary refresh, install the new cache,
    /// then request a secondary refresh without waiting for it.
    ///
    /// On failure the previously installed cache and repository are left
    /// untouched and the repository error is returned.
    pub async fn bind(&self, repository: Arc<dyn SchemaRepository>) -> SchemaResult<()> {
        if self.is_stopped() {
            return Err(SchemaError::WorkerStopped);
        }

        let topology = primary_refresh(repository.as_ref()).await?;

        let generation = {
            let mut bound = self.shared.lock_write();
            // Numbered under the lock so installs are monotonic across
            // concurrent binds.
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *bound = Some(repository);
            self.shared
                .install(Arc::new(SchemaCache::new(generation, topology)));
            generation
        };
        info!(generation, "schema cache primary refresh complete");

        self.request_secondary_refresh();
        Ok(())
    }

    /// Ask the background loop for a secondary refresh. Never blocks.
    ///
    /// If a request is already pending this one collapses into it.
    pub fn request_secondary_refresh(&self) {
        self.shared.requested.fetch_add(1, Ordering::AcqRel);
        match self.update_tx.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("secondary refresh already pending");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("secondary refresh requested after worker exit");
            }
        }
    }

    /// True once the latest requested secondary refresh has finished,
    /// successfully or with a logged error.
    ///
    /// Topology from the primary refresh is usable even while this is false.
    pub fn is_ready(&self) -> bool {
        let completed = self.shared.completed.load(Ordering::Acquire);
        completed != 0 && completed == self.shared.requested.load(Ordering::Acquire)
    }

    /// The currently published snapshot, if any.
    pub fn cache(&self) -> Option<Arc<SchemaCache>> {
        self.shared.cache()
    }

    pub fn state(&self) -> WorkerState {
        if self.is_stopped() {
            WorkerState::Stopped
        } else if self.cache().is_none() {
            WorkerState::Idle
        } else if self.is_ready() {
            WorkerState::Ready
        } else {
            WorkerState::RefreshingSecondary
        }
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            requested: self.shared.requested.load(Ordering::Acquire),
            completed_runs: self.shared.runs.load(Ordering::Acquire),
        }
    }

    /// Tell the background loop to exit. A refresh already in flight still
    /// finishes; no further refreshes or binds are possible.
    pub fn stop(&self) {
        let sender = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match sender {
            Some(tx) => {
                self.shared.stopped.store(true, Ordering::Release);
                let _ = tx.send(());
                info!("schema refresh worker stopping");
            }
            None => warn!("schema refresh worker stopped twice"),
        }
    }

    /// Wait for the background loop to exit. Call after [`stop`](Self::stop).
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("schema refresh worker task failed: {e}");
            }
        }
    }

    fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        // Dropping the shutdown sender wakes the loop as well, but make the
        // exit explicit for workers that were never stopped.
        if let Some(tx) = self
            .shutdown_tx
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            let _ = tx.send(());
        }
    }
}

/// Query topology and build the new cache's contents.
async fn primary_refresh(repo: &dyn SchemaRepository) -> SchemaResult<Topology> {
    let current_database = optional(repo.current_database().await)?;
    let databases = optional(repo.databases().await)?.unwrap_or_default();
    let current_schema = repo.current_schema().await?;
    let schemas = repo.schemas().await?;
    let tables = repo.schema_tables().await?;

    let mut schema_tables = indexmap::IndexMap::with_capacity(schemas.len());
    for schema in schemas {
        schema_tables.insert(schema, IndexSet::new());
    }
    for (schema, names) in tables {
        schema_tables
            .entry(schema)
            .or_insert_with(IndexSet::new)
            .extend(names);
    }

    let default_schema = if current_schema.is_empty() {
        schema_tables.keys().next().cloned().unwrap_or_default()
    } else {
        current_schema
    };

    Ok(Topology {
        current_database,
        databases,
        default_schema,
        schema_tables,
    })
}

/// Map `NotImplemented` to `None`, keep every other outcome.
fn optional<T>(result: SchemaResult<T>) -> SchemaResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_implemented() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut update_rx: mpsc::Receiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!("schema refresh worker started");
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            signal = update_rx.recv() => {
                if signal.is_none() {
                    break;
                }
                let requested = shared.requested.load(Ordering::Acquire);
                secondary_refresh(&shared).await;
                shared.runs.fetch_add(1, Ordering::AcqRel);
                shared.completed.store(requested, Ordering::Release);
                debug!(requested, "schema cache secondary refresh complete");
            }
        }
    }
    info!("schema refresh worker done");
}

/// Refresh columns and foreign keys. Failures are logged and leave the
/// previous sub-map in place.
///
/// Results are only written into the cache the run started from. If a bind
/// installed a newer cache meanwhile, they are dropped; that bind already
/// requested the run which fills its own cache.
async fn secondary_refresh(shared: &Shared) {
    let (repo, schemas, generation) = {
        let bound = shared.lock_write();
        let Some(repo) = bound.clone() else {
            return;
        };
        let Some(cache) = shared.cache() else {
            return;
        };
        let schemas: Vec<String> = cache.schemas().map(str::to_string).collect();
        (repo, schemas, cache.generation())
    };

    match describe_columns(repo.as_ref(), &schemas).await {
        Ok(columns) => {
            let _guard = shared.lock_write();
            match shared.cache() {
                Some(cache) if cache.generation() == generation => cache.replace_columns(columns),
                _ => debug!(generation, "dropping columns for a replaced cache"),
            }
        }
        Err(e) => warn!("schema cache column refresh failed: {e}"),
    }

    match describe_foreign_keys(repo.as_ref(), &schemas).await {
        Ok(foreign_keys) => {
            let _guard = shared.lock_write();
            match shared.cache() {
                Some(cache) if cache.generation() == generation => {
                    cache.replace_foreign_keys(foreign_keys)
                }
                _ => debug!(generation, "dropping foreign keys for a replaced cache"),
            }
        }
        Err(e) if e.is_not_implemented() => {
            debug!("foreign keys unavailable for {}: {e}", repo.driver())
        }
        Err(e) => warn!("schema cache foreign key refresh failed: {e}"),
    }
}

async fn describe_columns(
    repo: &dyn SchemaRepository,
    schemas: &[String],
) -> SchemaResult<ColumnIndex> {
    match repo.describe_database_columns().await {
        Ok(columns) => return Ok(ColumnIndex::from_columns(columns)),
        Err(e) if e.is_not_implemented() => {}
        Err(e) => return Err(e),
    }

    let mut index = ColumnIndex::new();
    for schema in schemas {
        for column in repo.describe_columns_by_schema(schema).await? {
            index.insert(column);
        }
    }
    Ok(index)
}

async fn describe_foreign_keys(
    repo: &dyn SchemaRepository,
    schemas: &[String],
) -> SchemaResult<ForeignKeyIndex> {
    let mut index = ForeignKeyIndex::new();
    for schema in schemas {
        let relations = repo.describe_foreign_keys_by_schema(schema).await?;
        index.insert_schema(schema, relations);
    }
    Ok(index)
}
