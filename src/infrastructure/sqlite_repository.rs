//! SQLite-backed book repository
//!
//! Schema is created on connect so a fresh database file works without an
//! external migration step. `upsert` maps to `INSERT OR REPLACE`, which is
//! atomic per row; per-id serialization is the catalog store's job.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::domain::book::{Availability, Book};
use crate::domain::repositories::{BookRepository, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id           TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    category     TEXT NOT NULL,
    price        REAL,
    rating       INTEGER,
    in_stock     BOOLEAN NOT NULL DEFAULT 0,
    stock_count  INTEGER,
    description  TEXT,
    image_url    TEXT,
    source_url   TEXT NOT NULL,
    last_seen_at DATETIME NOT NULL,
    fingerprint  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_books_category ON books (category);
"#;

pub struct SqliteBookRepository {
    pool: SqlitePool,
}

impl SqliteBookRepository {
    /// Connect to `database_url` (e.g. `sqlite:data/bookscrape.db`), creating
    /// the file and schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // raw_sql allows the multi-statement schema in one round trip.
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        info!(database_url, "sqlite book repository ready");
        Ok(Self { pool })
    }

    fn row_to_book(row: &sqlx::sqlite::SqliteRow) -> Result<Book, StoreError> {
        let map = |e: sqlx::Error| StoreError::Query(e.to_string());
        let rating: Option<i64> = row.try_get("rating").map_err(map)?;
        let stock_count: Option<i64> = row.try_get("stock_count").map_err(map)?;
        let last_seen_at: DateTime<Utc> = row.try_get("last_seen_at").map_err(map)?;
        Ok(Book {
            id: row.try_get("id").map_err(map)?,
            title: row.try_get("title").map_err(map)?,
            category: row.try_get("category").map_err(map)?,
            price: row.try_get("price").map_err(map)?,
            rating: rating.map(|r| r as u8),
            availability: Availability {
                in_stock: row.try_get("in_stock").map_err(map)?,
                stock_count: stock_count.map(|c| c as u32),
            },
            description: row.try_get("description").map_err(map)?,
            image_url: row.try_get("image_url").map_err(map)?,
            source_url: row.try_get("source_url").map_err(map)?,
            last_seen_at,
            fingerprint: row.try_get("fingerprint").map_err(map)?,
        })
    }
}

#[async_trait]
impl BookRepository for SqliteBookRepository {
    async fn load_all(&self) -> Result<Vec<Book>, StoreError> {
        let rows = sqlx::query("SELECT * FROM books")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        rows.iter().map(Self::row_to_book).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let row = sqlx::query("SELECT * FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        row.as_ref().map(Self::row_to_book).transpose()
    }

    async fn upsert(&self, book: &Book) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO books
               (id, title, category, price, rating, in_stock, stock_count,
                description, image_url, source_url, last_seen_at, fingerprint)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.category)
        .bind(book.price)
        .bind(book.rating.map(i64::from))
        .bind(book.availability.in_stock)
        .bind(book.availability.stock_count.map(i64::from))
        .bind(&book.description)
        .bind(&book.image_url)
        .bind(&book.source_url)
        .bind(book.last_seen_at)
        .bind(&book.fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM books")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let n: i64 = row.try_get("n").map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(n as u64)
    }
}
