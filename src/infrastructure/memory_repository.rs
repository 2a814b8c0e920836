//! In-memory repository, used by tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::book::Book;
use crate::domain::repositories::{BookRepository, StoreError};

#[derive(Debug, Default)]
pub struct MemoryBookRepository {
    books: RwLock<HashMap<String, Book>>,
}

impl MemoryBookRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookRepository for MemoryBookRepository {
    async fn load_all(&self) -> Result<Vec<Book>, StoreError> {
        Ok(self.books.read().await.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self.books.read().await.get(id).cloned())
    }

    async fn upsert(&self, book: &Book) -> Result<(), StoreError> {
        self.books.write().await.insert(book.id.clone(), book.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.books.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::book::{Availability, BookCandidate};
    use chrono::Utc;

    fn book(id: &str) -> Book {
        BookCandidate {
            id: id.to_string(),
            title: "t".to_string(),
            category: Some("c".to_string()),
            price: Some(10.0),
            rating: Some(4),
            availability: Availability::in_stock(None),
            description: None,
            image_url: None,
            source_url: format!("https://example.test/{id}/index.html"),
        }
        .canonicalize(Utc::now())
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let repo = MemoryBookRepository::new();
        repo.upsert(&book("a")).await.unwrap();
        let mut updated = book("a");
        updated.title = "t2".to_string();
        updated.refresh_fingerprint();
        repo.upsert(&updated).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get("a").await.unwrap().unwrap().title, "t2");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let repo = MemoryBookRepository::new();
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
