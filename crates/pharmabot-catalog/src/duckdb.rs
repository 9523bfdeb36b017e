//! `DuckDB` connection pool management.
//!
//! A single database instance is opened per catalog. Every checkout is a
//! separate connection cloned from that instance, so a connection is never
//! shared between two callers at the same time.

use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::{Config, Connection};

/// How the database instance is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Lookups only; the file must already exist.
    ReadOnly,
    /// Imports and migrations; the file is created when missing.
    ReadWrite,
}

struct PoolInner {
    db_path: Option<PathBuf>,
    max_idle: usize,
    root: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
}

/// Connection pool over one `DuckDB` database instance.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database and create the pool.
    ///
    /// `None` opens a private in-memory database, which is always writable.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(
        db_path: Option<PathBuf>,
        max_idle: usize,
        mode: AccessMode,
    ) -> Result<Self, ::duckdb::Error> {
        let root = match (db_path.as_deref(), mode) {
            (Some(path), AccessMode::ReadOnly) => Connection::open_with_flags(
                path,
                Config::default().access_mode(::duckdb::AccessMode::ReadOnly)?,
            )?,
            (Some(path), AccessMode::ReadWrite) => Connection::open(path)?,
            (None, _) => Connection::open_in_memory()?,
        };
        configure_connection(&root)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_idle: max_idle.max(1),
                root: Mutex::new(root),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Check out a connection for exclusive use.
    ///
    /// The connection goes back to the pool when the guard is dropped.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be cloned from the instance.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let connection = match reused {
            Some(connection) => connection,
            None => {
                let root = self
                    .inner
                    .root
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let connection = root.try_clone()?;
                drop(root);
                configure_connection(&connection)?;
                connection
            }
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: ManuallyDrop::new(connection),
        })
    }

    /// Path of the database file, `None` when in memory.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }

    /// Number of idle connections waiting in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A checked-out connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: ManuallyDrop<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // SAFETY: `connection` is taken exactly once, here, and never used again.
        let connection = unsafe { ManuallyDrop::take(&mut self.connection) };

        let mut idle = self
            .pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.pool.max_idle {
            idle.push(connection);
        }
    }
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}
