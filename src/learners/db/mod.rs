//! SQLite persistence of learner records.
//!
//! Model parameters live in the model store; rows hold pointers to them.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};
use thiserror::Error;

/// Read-only learner queries.
pub mod read;
/// SQLite schema management for the learner database.
pub mod schema;
/// Inserts and updates of learner rows.
pub mod write;

mod util;


pub use read::OnlineQuery;

/// Errors returned when managing the learner database.
#[derive(Debug, Error)]
pub enum LearnerDbError {
    /// SQLite query failed.
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// A JSON column could not be encoded or decoded.
    #[error("Stored learner data is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// Failed to create a parent directory.
    #[error("Could not write to {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A learner with the same identity already exists.
    #[error("Learner already exists: {0}")]
    Duplicate(String),
    /// Database is locked or busy.
    #[error("Database is busy, please retry")]
    Busy,
    /// SQLite returned an unexpected result.
    #[error("SQLite returned an unexpected result")]
    Unexpected,
}

/// SQLite wrapper holding online, pretrained and attribute learner rows.
pub struct LearnerDb {
    connection: Connection,
    path: Option<PathBuf>,
}

/// Groups learner writes into one transaction.
pub struct LearnerWriteBatch<'conn> {
    tx: Transaction<'conn>,
}

impl LearnerDb {
    /// Open (or create) the learner database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LearnerDbError> {
        let path = path.as_ref();
        util::create_parent_if_needed(path)?;
        let connection = Connection::open(path)?;
        let db = Self {
            connection,
            path: Some(path.to_path_buf()),
        };
        db.apply_pragmas()?;
        db.apply_schema()?;
        tracing::debug!("Opened learner database at {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, LearnerDbError> {
        let connection = Connection::open_in_memory()?;
        let db = Self {
            connection,
            path: None,
        };
        db.connection
            .execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(util::map_sql_error)?;
        db.apply_schema()?;
        Ok(db)
    }

    /// Backing file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fold the write-ahead log back into the main database file.
    pub fn checkpoint(&self) -> Result<(), LearnerDbError> {
        if self.path.is_none() {
            return Ok(());
        }
        self.connection
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .map_err(util::map_sql_error)
    }

    fn apply_pragmas(&self) -> Result<(), LearnerDbError> {
        self.connection
            .execute_batch(
                "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
            )
            .map_err(util::map_sql_error)?;
        Ok(())
    }

    fn apply_schema(&self) -> Result<(), LearnerDbError> {
        schema::apply_schema(&self.connection)
    }
}
