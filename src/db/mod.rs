//! SQLite-backed key-value storage.
//!
//! The connection is opened and migrated on the caller's thread so setup
//! errors surface from [`Database::new`] directly. It then moves to a worker
//! thread that runs queued jobs one at a time; async callers wait on a
//! oneshot for each result.

use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, TrySendError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod migrations;
pub mod repositories;

use migrations::run_migrations;

/// Jobs waiting for the worker before `execute` callers start to block.
const QUEUE_DEPTH: usize = 64;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Close,
}

/// Owns the worker thread; closing happens when the last `Database` clone
/// goes away.
struct Worker {
    jobs: mpsc::SyncSender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn spawn(mut conn: Connection) -> Result<Self> {
        let (jobs, queue) = mpsc::sync_channel::<Request>(QUEUE_DEPTH);

        let thread = thread::Builder::new()
            .name("pomodoro-db".into())
            .spawn(move || {
                for request in queue {
                    match request {
                        Request::Run(job) => job(&mut conn),
                        Request::Close => break,
                    }
                }
                debug!("database worker closed");
            })
            .context("failed to spawn database worker thread")?;

        Ok(Self {
            jobs,
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let thread = match self.thread.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(thread) = thread else {
            return;
        };

        if self.jobs.send(Request::Close).is_err() {
            warn!("database worker was already gone at close");
        }
        if thread.join().is_err() {
            error!("database worker panicked");
        }
    }
}

/// Cloneable handle onto one SQLite file.
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

        let conn = open_connection(&path)?;
        let worker = Worker::spawn(conn)?;
        info!("history database ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `job` on the worker thread and hands back its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::Run(Box::new(move |conn| {
            // The caller may have been cancelled; nothing to report then.
            let _ = reply_tx.send(job(conn));
        }));

        match self.worker.jobs.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                let jobs = self.worker.jobs.clone();
                tokio::task::spawn_blocking(move || jobs.send(request))
                    .await
                    .context("database submit task failed")?
                    .map_err(|_| anyhow!("database worker is closed"))?;
            }
            Err(TrySendError::Disconnected(_)) => bail!("database worker is closed"),
        }

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    // Concurrent readers are a nicety; a file system without WAL still works.
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable for {}: {err}", path.display());
    }
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("failed to set SQLite busy timeout")?;

    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}
