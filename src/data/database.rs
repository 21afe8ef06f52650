//! SQLite run store with batched commits

use std::cell::Cell;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, ErrorCode, Params};
use thiserror::Error;

use super::migrations;

/// Statements buffered in one transaction before it is committed
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 20;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("There is already a run with id {0}")]
    DuplicateRun(String),
    #[error("No run with id {0}")]
    NoSuchRun(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to create data directory: {0}")]
    CreateDir(std::io::Error),
    #[error("Failed to start writer thread: {0}")]
    Worker(std::io::Error),
}

/// Handle to one run store.
///
/// Writes go through an open transaction that is committed every
/// `batch_size` statements, before any read, at `end_run`, and on drop.
/// The handle is `Send` but not `Sync`: exactly one thread owns it.
pub struct Db {
    conn: Connection,
    path: Option<PathBuf>,
    batch_size: usize,
    pending: Cell<usize>,
}

impl Db {
    /// Open or create a store at `path`, applying pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        tracing::debug!(path = %path.display(), "Opened run store");
        Self::init(conn, Some(path))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self {
            conn,
            path,
            batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            pending: Cell::new(0),
        })
    }

    /// Commit after `batch_size` buffered statements instead of the default.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of statements written but not yet committed.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Commit everything buffered so far.
    pub fn flush(&self) -> Result<(), StorageError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.pending.set(0);
        Ok(())
    }

    /// Run one modifying statement inside the batch transaction.
    pub(crate) fn execute_buffered<P: Params>(&self, sql: &str, params: P) -> Result<usize, StorageError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        let changed = self.conn.prepare_cached(sql)?.execute(params)?;
        self.pending.set(self.pending.get() + 1);
        if self.pending.get() >= self.batch_size {
            self.flush()?;
        }
        Ok(changed)
    }

    /// Connection for queries, with all buffered writes committed first.
    pub(crate) fn reader(&self) -> Result<&Connection, StorageError> {
        self.flush()?;
        Ok(&self.conn)
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "Failed to flush run store on close");
        }
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("batch_size", &self.batch_size)
            .field("pending", &self.pending.get())
            .finish()
    }
}
