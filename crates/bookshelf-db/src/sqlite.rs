//! The SQLite connection shared by every store operation.
//!
//! A single `rusqlite` connection sits behind an async mutex; each
//! operation runs on the blocking pool via [`SqliteStore::call`]. WAL
//! journaling and foreign keys are switched on when the file is opened.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use bookshelf_core::BookshelfError;

/// Path that selects an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// A cloneable handle to the application database.
#[derive(Clone)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`. `:memory:`
    /// opens a private in-memory database.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BookshelfError> {
        let path = path.into();
        let conn = if path.as_os_str() == MEMORY_PATH {
            Connection::open_in_memory()
        } else {
            Connection::open(&path)
        }
        .map_err(|e| BookshelfError::DatabaseError(format!("SQLite open failed: {e}")))?;

        // journal_mode reports the resulting mode as a row, so it cannot go
        // through execute_batch on every SQLite build.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(|e| BookshelfError::DatabaseError(format!("Failed to set pragmas: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| BookshelfError::DatabaseError(format!("Failed to set pragmas: {e}")))?;

        tracing::debug!(path = %path.display(), "opened database");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens a private in-memory database.
    pub fn memory() -> Result<Self, BookshelfError> {
        Self::open(MEMORY_PATH)
    }

    /// Returns the database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with exclusive access to the connection on the blocking
    /// pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T, BookshelfError>
    where
        F: FnOnce(&mut Connection) -> Result<T, BookshelfError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| BookshelfError::DatabaseError(format!("Task join error: {e}")))?
    }
}

/// Maps a `rusqlite` error: constraint violations become
/// `IntegrityError`, everything else `DatabaseError`.
pub fn db_error(err: rusqlite::Error) -> BookshelfError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            BookshelfError::IntegrityError(err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "database error");
            BookshelfError::DatabaseError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_open() {
        let store = SqliteStore::memory().unwrap();
        assert_eq!(store.path(), Path::new(":memory:"));
        let one: i64 = store
            .call(|conn| conn.query_row("SELECT 1", [], |r| r.get(0)).map_err(db_error))
            .await
            .unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let store = SqliteStore::memory().unwrap();
        let on: i64 = store
            .call(|conn| conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).map_err(db_error))
            .await
            .unwrap();
        assert_eq!(on, 1);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite3");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .call(|conn| {
                    conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
                        .map_err(db_error)
                })
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let x: i64 = store
            .call(|conn| conn.query_row("SELECT x FROM t", [], |r| r.get(0)).map_err(db_error))
            .await
            .unwrap();
        assert_eq!(x, 7);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_integrity_error() {
        let store = SqliteStore::memory().unwrap();
        let err = store
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE u (name TEXT UNIQUE); INSERT INTO u VALUES ('a'); INSERT INTO u VALUES ('a');",
                )
                .map_err(db_error)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BookshelfError::IntegrityError(_)));
    }
}
