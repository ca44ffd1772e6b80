//! The `Book` record and its queries.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use bookshelf_core::BookshelfError;

use crate::sqlite::{db_error, SqliteStore};

/// Maximum title length in characters.
pub const TITLE_MAX_LENGTH: usize = 200;

/// Maximum author length in characters.
pub const AUTHOR_MAX_LENGTH: usize = 100;

/// A stored book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Primary key.
    pub id: i64,
    /// Title, at most 200 characters.
    pub title: String,
    /// Author, at most 100 characters.
    pub author: String,
    /// Year of publication.
    pub publication_year: i32,
}

/// Field values for inserting or replacing a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookData {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Year of publication.
    pub publication_year: i32,
}

impl From<Book> for BookData {
    fn from(book: Book) -> Self {
        Self {
            title: book.title,
            author: book.author,
            publication_year: book.publication_year,
        }
    }
}

/// Optional filters for [`SqliteStore::list_books`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    /// Case-insensitive substring of the title or author.
    pub q: Option<String>,
    /// Exact author.
    pub author: Option<String>,
    /// Exact publication year.
    pub publication_year: Option<i32>,
}

const BOOK_COLUMNS: &str = "id, title, author, publication_year";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        publication_year: row.get(3)?,
    })
}

fn like_pattern(q: &str) -> String {
    let escaped = q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

impl SqliteStore {
    /// Lists books matching `filter`, ordered by title then id.
    pub async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>, BookshelfError> {
        let filter = filter.clone();
        self.call(move |conn| {
            let mut sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE 1 = 1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                sql.push_str(
                    " AND (title LIKE ? ESCAPE '\\' OR author LIKE ? ESCAPE '\\')",
                );
                args.push(Box::new(like_pattern(q)));
                args.push(Box::new(like_pattern(q)));
            }
            if let Some(author) = filter.author {
                sql.push_str(" AND author = ?");
                args.push(Box::new(author));
            }
            if let Some(year) = filter.publication_year {
                sql.push_str(" AND publication_year = ?");
                args.push(Box::new(year));
            }
            sql.push_str(" ORDER BY title COLLATE NOCASE, id");

            let mut stmt = conn.prepare(&sql).map_err(db_error)?;
            let books = stmt
                .query_map(rusqlite::params_from_iter(args.iter()), book_from_row)
                .map_err(db_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_error)?;
            Ok(books)
        })
        .await
    }

    /// Fetches one book; a missing id is `DoesNotExist`.
    pub async fn get_book(&self, id: i64) -> Result<Book, BookshelfError> {
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                [id],
                book_from_row,
            )
            .optional()
            .map_err(db_error)?
            .ok_or_else(|| BookshelfError::DoesNotExist(format!("Book {id} does not exist.")))
        })
        .await
    }

    /// Inserts a book.
    pub async fn create_book(&self, data: &BookData) -> Result<Book, BookshelfError> {
        let data = data.clone();
        let book = self
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO books (title, author, publication_year) VALUES (?1, ?2, ?3)",
                    params![data.title, data.author, data.publication_year],
                )
                .map_err(db_error)?;
                Ok(Book {
                    id: conn.last_insert_rowid(),
                    title: data.title,
                    author: data.author,
                    publication_year: data.publication_year,
                })
            })
            .await?;
        tracing::info!(book_id = book.id, title = %book.title, "book created");
        Ok(book)
    }

    /// Replaces every field of a book; a missing id is `DoesNotExist`.
    pub async fn update_book(&self, id: i64, data: &BookData) -> Result<Book, BookshelfError> {
        let data = data.clone();
        let book = self
            .call(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE books SET title = ?1, author = ?2, publication_year = ?3 WHERE id = ?4",
                        params![data.title, data.author, data.publication_year, id],
                    )
                    .map_err(db_error)?;
                if changed == 0 {
                    return Err(BookshelfError::DoesNotExist(format!(
                        "Book {id} does not exist."
                    )));
                }
                Ok(Book {
                    id,
                    title: data.title,
                    author: data.author,
                    publication_year: data.publication_year,
                })
            })
            .await?;
        tracing::info!(book_id = id, "book updated");
        Ok(book)
    }

    /// Deletes a book; returns `false` if it did not exist.
    pub async fn delete_book(&self, id: i64) -> Result<bool, BookshelfError> {
        let deleted = self
            .call(move |conn| {
                conn.execute("DELETE FROM books WHERE id = ?1", [id])
                    .map_err(db_error)
            })
            .await?
            > 0;
        if deleted {
            tracing::info!(book_id = id, "book deleted");
        }
        Ok(deleted)
    }

    /// Returns the number of stored books.
    pub async fn count_books(&self) -> Result<i64, BookshelfError> {
        self.call(|conn| {
            conn.query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0))
                .map_err(db_error)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::migrate;

    async fn store() -> SqliteStore {
        let store = SqliteStore::memory().unwrap();
        migrate(&store).await.unwrap();
        store
    }

    fn data(title: &str, author: &str, year: i32) -> BookData {
        BookData {
            title: title.into(),
            author: author.into(),
            publication_year: year,
        }
    }

    async fn seeded() -> SqliteStore {
        let store = store().await;
        for d in [
            data("The Dispossessed", "Ursula K. Le Guin", 1974),
            data("A Wizard of Earthsea", "Ursula K. Le Guin", 1968),
            data("Kindred", "Octavia E. Butler", 1979),
            data("100% Pure", "Anon", 1974),
        ] {
            store.create_book(&d).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_crud_cycle() {
        let store = store().await;
        let book = store.create_book(&data("Dune", "Frank Herbert", 1965)).await.unwrap();
        assert_eq!(store.get_book(book.id).await.unwrap(), book);

        let updated = store
            .update_book(book.id, &data("Dune Messiah", "Frank Herbert", 1969))
            .await
            .unwrap();
        assert_eq!(updated.title, "Dune Messiah");
        assert_eq!(store.get_book(book.id).await.unwrap().publication_year, 1969);

        assert!(store.delete_book(book.id).await.unwrap());
        assert!(!store.delete_book(book.id).await.unwrap());
        assert!(matches!(
            store.get_book(book.id).await.unwrap_err(),
            BookshelfError::DoesNotExist(_)
        ));
    }

    #[tokio::test]
    async fn test_update_missing_book() {
        let store = store().await;
        let err = store.update_book(99, &data("x", "y", 1)).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_list_orders_by_title() {
        let store = seeded().await;
        let titles: Vec<_> = store
            .list_books(&BookFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(
            titles,
            vec!["100% Pure", "A Wizard of Earthsea", "Kindred", "The Dispossessed"]
        );
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = seeded().await;

        let by_q = store
            .list_books(&BookFilter { q: Some("le guin".into()), ..BookFilter::default() })
            .await
            .unwrap();
        assert_eq!(by_q.len(), 2);

        let by_author = store
            .list_books(&BookFilter {
                author: Some("Octavia E. Butler".into()),
                ..BookFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 1);

        let by_year = store
            .list_books(&BookFilter { publication_year: Some(1974), ..BookFilter::default() })
            .await
            .unwrap();
        assert_eq!(by_year.len(), 2);

        let combined = store
            .list_books(&BookFilter {
                q: Some("dispossessed".into()),
                publication_year: Some(1974),
                ..BookFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(combined.len(), 1);
    }

    #[tokio::test]
    async fn test_q_wildcards_are_literal() {
        let store = seeded().await;
        let percent = store
            .list_books(&BookFilter { q: Some("%".into()), ..BookFilter::default() })
            .await
            .unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].title, "100% Pure");

        let blank = store
            .list_books(&BookFilter { q: Some("  ".into()), ..BookFilter::default() })
            .await
            .unwrap();
        assert_eq!(blank.len(), 4);
        assert_eq!(store.count_books().await.unwrap(), 4);
    }
}
