//! Persistence boundary for the catalog
//!
//! The catalog store delegates durable storage to an injected repository.
//! Correctness depends only on this contract, not on the physical storage
//! technology behind it.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::book::Book;

/// Failures crossing the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Query(String),
}

/// Durable storage for books. `upsert` must be atomic per record; the caller
/// guarantees that concurrent upserts of the same id never reach the backend
/// simultaneously.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Load every stored record (snapshot source).
    async fn load_all(&self) -> Result<Vec<Book>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError>;

    /// Insert or replace the record with `book.id`.
    async fn upsert(&self, book: &Book) -> Result<(), StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}
