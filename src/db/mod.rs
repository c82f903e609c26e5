use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
pub mod models;
mod repositories;

use migrations::run_migrations;

pub use models::{
    EntryDraft, InventoryEntry, ProductInput, ProductRecord, StockTotal, StoredProduct, Unit,
};

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the job queue and the thread draining it. Dropping the last
/// `Database` clone closes the queue and joins the thread.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn start(conn: Connection) -> Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("stockscan-db".into())
            .spawn(move || serve(conn, queue))
            .context("failed to spawn database worker thread")?;

        Ok(Self {
            jobs: Some(jobs),
            thread: Some(thread),
        })
    }

    fn submit(&self, job: Job) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("database worker already stopped"))?;
        jobs.send(job)
            .map_err(|_| anyhow!("database worker is no longer accepting queries"))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Pending jobs still run; `serve` returns once the queue is empty.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("database worker panicked");
            }
        }
    }
}

fn serve(mut conn: Connection, queue: mpsc::Receiver<Job>) {
    for job in queue {
        job(&mut conn);
    }
    debug!("database worker stopped");
}

/// Opens the file and brings the schema up to date.
fn open_store(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL mode unavailable for {}: {err}", path.display());
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite store holding the product catalog and the inventory log.
///
/// The connection lives on a dedicated thread; every query is shipped there as a
/// closure and the result comes back over a oneshot channel, so writes are
/// serialized without any locking on the caller side.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let conn = open_store(&path)?;
        let worker = Worker::start(conn)?;
        info!("inventory store ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Run `query` on the worker thread and wait for its result.
    pub async fn execute<F, T>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.worker.submit(Box::new(move |conn| {
            // The caller may have been cancelled; nothing to do with the result then.
            let _ = reply.send(query(conn));
        }))?;

        response
            .await
            .map_err(|_| anyhow!("database worker dropped the query"))?
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Database;

    /// Fresh database in a temp dir; keep the `TempDir` alive for the test's duration.
    pub fn temp_database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("stockscan.sqlite3")).unwrap();
        (dir, db)
    }
}
