//! # bookshelf-db
//!
//! SQLite persistence for bookshelf. [`SqliteStore`] owns the connection,
//! [`migrations`] creates the schema and the four book permissions,
//! [`books`] holds the book queries, and the store implements
//! [`bookshelf_auth::AuthStore`] for users, groups, tokens and sessions.

pub mod auth_store;
pub mod books;
pub mod migrations;
pub mod sqlite;

pub use books::{Book, BookData, BookFilter};
pub use migrations::migrate;
pub use sqlite::SqliteStore;

/// Opens the database at `path` and applies pending migrations.
pub async fn open_and_migrate(
    path: impl Into<std::path::PathBuf>,
) -> Result<SqliteStore, bookshelf_core::BookshelfError> {
    let store = SqliteStore::open(path)?;
    migrate(&store).await?;
    Ok(store)
}
