//! Schema migrations.
//!
//! Migrations are applied in order, each inside its own transaction, and
//! recorded in `bookshelf_migrations` so that [`migrate`] is idempotent.

use rusqlite::{params, Transaction};

use bookshelf_auth::Permission;
use bookshelf_core::BookshelfError;

use crate::sqlite::{db_error, SqliteStore};

/// A named schema change.
pub struct Migration {
    /// Unique name, recorded once applied.
    pub name: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration").field("name", &self.name).finish_non_exhaustive()
    }
}

const INITIAL_SCHEMA: &str = "
CREATE TABLE auth_permission (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    codename TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);
CREATE TABLE auth_group (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE auth_group_permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL REFERENCES auth_group(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES auth_permission(id) ON DELETE CASCADE,
    UNIQUE (group_id, permission_id)
);
CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL DEFAULT '',
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    password TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_staff INTEGER NOT NULL DEFAULT 0,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    date_joined TEXT NOT NULL,
    last_login TEXT,
    date_of_birth TEXT,
    profile_photo TEXT
);
CREATE TABLE user_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES auth_group(id) ON DELETE CASCADE,
    UNIQUE (user_id, group_id)
);
CREATE TABLE user_permissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES auth_permission(id) ON DELETE CASCADE,
    UNIQUE (user_id, permission_id)
);
CREATE TABLE books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(title) <= 200),
    author TEXT NOT NULL CHECK (length(author) <= 100),
    publication_year INTEGER NOT NULL
);
";

const TOKENS_AND_SESSIONS: &str = "
CREATE TABLE auth_token (
    key TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    created TEXT NOT NULL
);
CREATE TABLE sessions (
    digest TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at INTEGER NOT NULL
);
CREATE INDEX sessions_expires_at ON sessions (expires_at);
";

fn seed_permissions(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO auth_permission (content_type, codename, name) VALUES (?1, ?2, ?3)",
    )?;
    for perm in Permission::ALL {
        stmt.execute(params![Permission::CONTENT_TYPE, perm.codename(), perm.name()])?;
    }
    Ok(())
}

/// Every migration, in application order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_initial",
        apply: |tx| tx.execute_batch(INITIAL_SCHEMA),
    },
    Migration {
        name: "0002_book_permissions",
        apply: seed_permissions,
    },
    Migration {
        name: "0003_tokens_and_sessions",
        apply: |tx| tx.execute_batch(TOKENS_AND_SESSIONS),
    },
];

/// Applies every pending migration and returns the names applied by this
/// call.
pub async fn migrate(store: &SqliteStore) -> Result<Vec<&'static str>, BookshelfError> {
    let applied = store
        .call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS bookshelf_migrations (
                    name TEXT PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .map_err(db_error)?;

            let mut applied = Vec::new();
            for migration in MIGRATIONS {
                let done: bool = conn
                    .query_row(
                        "SELECT EXISTS (SELECT 1 FROM bookshelf_migrations WHERE name = ?1)",
                        [migration.name],
                        |row| row.get(0),
                    )
                    .map_err(db_error)?;
                if done {
                    continue;
                }
                let tx = conn.transaction().map_err(db_error)?;
                (migration.apply)(&tx).map_err(db_error)?;
                tx.execute(
                    "INSERT INTO bookshelf_migrations (name, applied_at) VALUES (?1, ?2)",
                    params![migration.name, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(db_error)?;
                tx.commit().map_err(db_error)?;
                applied.push(migration.name);
            }
            Ok(applied)
        })
        .await?;

    for name in &applied {
        tracing::info!(migration = name, "applied migration");
    }
    Ok(applied)
}

/// Returns `(name, applied)` for every known migration.
pub async fn show_migrations(store: &SqliteStore) -> Result<Vec<(&'static str, bool)>, BookshelfError> {
    store
        .call(|conn| {
            let table_exists: bool = conn
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'bookshelf_migrations')",
                    [],
                    |row| row.get(0),
                )
                .map_err(db_error)?;
            MIGRATIONS
                .iter()
                .map(|m| -> Result<(&'static str, bool), BookshelfError> {
                    let applied = table_exists
                        && conn
                            .query_row(
                                "SELECT EXISTS (SELECT 1 FROM bookshelf_migrations WHERE name = ?1)",
                                [m.name],
                                |row| row.get(0),
                            )
                            .map_err(db_error)?;
                    Ok((m.name, applied))
                })
                .collect()
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = SqliteStore::memory().unwrap();
        let first = migrate(&store).await.unwrap();
        assert_eq!(
            first,
            vec!["0001_initial", "0002_book_permissions", "0003_tokens_and_sessions"]
        );
        assert!(migrate(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permissions_seeded_once() {
        let store = SqliteStore::memory().unwrap();
        migrate(&store).await.unwrap();
        migrate(&store).await.unwrap();
        let rows: Vec<(String, String)> = store
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT codename, name FROM auth_permission ORDER BY id")
                    .map_err(db_error)?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
                    .map_err(db_error)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_error)?;
                Ok(rows)
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], ("can_view".to_string(), "Can view book".to_string()));
        assert_eq!(rows[3].0, "can_delete");
    }

    #[tokio::test]
    async fn test_show_migrations() {
        let store = SqliteStore::memory().unwrap();
        let before = show_migrations(&store).await.unwrap();
        assert!(before.iter().all(|(_, applied)| !applied));
        migrate(&store).await.unwrap();
        let after = show_migrations(&store).await.unwrap();
        assert!(after.iter().all(|(_, applied)| *applied));
    }

    #[tokio::test]
    async fn test_book_title_length_enforced_by_schema() {
        let store = SqliteStore::memory().unwrap();
        migrate(&store).await.unwrap();
        let long = "x".repeat(201);
        let err = store
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO books (title, author, publication_year) VALUES (?1, 'a', 2000)",
                    [long],
                )
                .map_err(db_error)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BookshelfError::IntegrityError(_)));
    }
}
