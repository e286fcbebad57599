//! Database adapter
//!
//! One `Db` per project store: a single rusqlite connection behind an async
//! mutex. The mutex is the substrate's serialization point — concurrent
//! operations on one project database queue here, and every suspension point
//! in the public API is an acquisition of this lock. Multiple projects are
//! independent (separate `Db` values).

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;
use crate::error::{DbError, DbResult};
use crate::schema;

/// Uniform query/exec/transaction interface over embedded SQLite.
///
/// Two constructors: [`Db::open`] (persistent, one file per project under
/// the project-local database directory) and [`Db::open_memory`] (tests).
/// Both run the same engine, so SQL semantics are identical.
#[derive(Debug)]
pub struct Db {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Db {
    /// Open (and create if needed) the persistent database for a project.
    ///
    /// The database lives at `<project_root>/<db_dir>/<db_file>`. Schema
    /// creation is idempotent.
    pub fn open(project_root: &Path, config: &StoreConfig) -> DbResult<Self> {
        let dir = project_root.join(&config.db_dir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| DbError::Internal(format!("create {}: {e}", dir.display())))?;
        let path = dir.join(&config.db_file);
        let conn = Connection::open(&path)?;
        configure_connection(&conn, config)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open an in-memory database with the same schema (test support).
    pub fn open_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection outside an explicit transaction.
    ///
    /// Reads are snapshot-consistent within one call because the connection
    /// is exclusively held for the duration.
    pub async fn with_conn<T>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&Connection) -> DbResult<T>,
    ) -> DbResult<T> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let conn = self.conn.lock().await;
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        f(&conn)
    }

    /// Run `f` between `BEGIN IMMEDIATE` and `COMMIT`.
    ///
    /// Rolls back when `f` fails or when cancellation is observed before the
    /// commit point; cancellation after commit is ignored (effects are
    /// durable). No partial writes escape.
    pub async fn transaction<T>(
        &self,
        cancel: &CancellationToken,
        f: impl FnOnce(&Connection) -> DbResult<T>,
    ) -> DbResult<T> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let conn = self.conn.lock().await;
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }

        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&conn) {
            Ok(value) => {
                if cancel.is_cancelled() {
                    rollback(&conn);
                    return Err(DbError::Cancelled);
                }
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                rollback(&conn);
                Err(e)
            }
        }
    }
}

fn rollback(conn: &Connection) {
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        tracing::warn!("rollback failed: {e}");
    }
}

fn configure_connection(conn: &Connection, config: &StoreConfig) -> DbResult<()> {
    conn.busy_timeout(config.busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}
