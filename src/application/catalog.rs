//! Catalog store: upsert, lookup, search and snapshots
//!
//! The store owns the merge semantics on top of an injected repository. A
//! per-id async lock serializes concurrent upserts of the same record, so the
//! read-merge-write sequence is atomic per id while distinct ids proceed in
//! parallel. A category index is maintained in memory for cheap listing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::book::{Book, BookCandidate, UpsertOutcome, UNKNOWN_CATEGORY};
use crate::domain::events::{AppEvent, EventSink};
use crate::domain::repositories::{BookRepository, StoreError};

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no book with id {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Search filters; all optional, combined with AND.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Case-insensitive substring match on the title.
    pub title_contains: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self { title_contains: None, category: None, page: 1, page_size: 20 }
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub books: Vec<Book>,
    /// Matches before pagination.
    pub total_matches: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Owned, id-sorted view of the catalog at one instant. Later upserts do not
/// mutate an already taken snapshot.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    books: Vec<Book>,
    taken_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Books with a parsed price inside `[min, max]`, id order preserved.
    pub fn books_in_price_range(&self, min: f64, max: f64) -> Vec<&Book> {
        self.books
            .iter()
            .filter(|b| b.price.is_some_and(|p| p >= min && p <= max))
            .collect()
    }

    /// Books ordered by rating, highest first; unrated books sort last.
    /// Ties keep id order.
    pub fn books_sorted_by_rating(&self) -> Vec<&Book> {
        let mut books: Vec<&Book> = self.books.iter().collect();
        books.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| a.id.cmp(&b.id)));
        books
    }
}

pub struct CatalogStore {
    repository: Arc<dyn BookRepository>,
    events: Arc<dyn EventSink>,
    /// category -> ids, rebuilt on open and maintained on upsert.
    category_index: RwLock<BTreeMap<String, BTreeSet<String>>>,
    /// One async lock per record id, created lazily.
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CatalogStore {
    /// Open the store over a repository, rebuilding the category index from
    /// the stored records.
    pub async fn open(
        repository: Arc<dyn BookRepository>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, CatalogError> {
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for book in repository.load_all().await? {
            index.entry(book.category.clone()).or_default().insert(book.id);
        }
        debug!(categories = index.len(), "catalog store opened");
        Ok(Self {
            repository,
            events,
            category_index: RwLock::new(index),
            id_locks: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().await;
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Merge a parsed candidate into the catalog. Absent candidate fields
    /// keep the stored values, so a listing-only re-crawl never erases data
    /// the detail pages provided earlier. The outcome is decided by comparing
    /// fingerprints; an unchanged record still refreshes `last_seen_at`.
    pub async fn upsert_candidate(
        &self,
        mut candidate: BookCandidate,
    ) -> Result<UpsertOutcome, CatalogError> {
        let id_lock = self.lock_for(&candidate.id).await;
        let _guard = id_lock.lock().await;

        let existing = self.repository.get(&candidate.id).await?;
        if let Some(existing) = &existing {
            if candidate.category.is_none() && existing.category != UNKNOWN_CATEGORY {
                candidate.category = Some(existing.category.clone());
            }
            if candidate.price.is_none() {
                candidate.price = existing.price;
            }
            if candidate.rating.is_none() {
                candidate.rating = existing.rating;
            }
            if candidate.availability.stock_count.is_none() {
                candidate.availability.stock_count = existing.availability.stock_count;
            }
            if candidate.description.is_none() {
                candidate.description.clone_from(&existing.description);
            }
            if candidate.image_url.is_none() {
                candidate.image_url.clone_from(&existing.image_url);
            }
        }

        let book = candidate.canonicalize(Utc::now());
        let outcome = match &existing {
            None => UpsertOutcome::Created,
            Some(e) if e.fingerprint == book.fingerprint => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };

        // Unchanged records are still written so last_seen_at advances.
        self.repository.upsert(&book).await?;

        let mut index = self.category_index.write().await;
        if let Some(existing) = &existing {
            if existing.category != book.category {
                if let Some(ids) = index.get_mut(&existing.category) {
                    ids.remove(&book.id);
                    if ids.is_empty() {
                        index.remove(&existing.category);
                    }
                }
            }
        }
        index.entry(book.category.clone()).or_default().insert(book.id.clone());
        drop(index);

        self.events.emit(AppEvent::UpsertApplied { id: book.id, outcome });
        Ok(outcome)
    }

    pub async fn get(&self, id: &str) -> Result<Book, CatalogError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub async fn count(&self) -> Result<u64, CatalogError> {
        Ok(self.repository.count().await?)
    }

    /// Owned point-in-time view, sorted by id for deterministic iteration.
    pub async fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        let mut books = self.repository.load_all().await?;
        books.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(CatalogSnapshot { books, taken_at: Utc::now() })
    }

    /// Category names with their record counts, derived from the index.
    pub async fn list_categories(&self) -> BTreeMap<String, usize> {
        self.category_index
            .read()
            .await
            .iter()
            .map(|(category, ids)| (category.clone(), ids.len()))
            .collect()
    }

    /// Filtered, paginated search over a fresh snapshot. Results are in id
    /// order; `total_matches` counts matches before pagination.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults, CatalogError> {
        if query.page == 0 {
            return Err(CatalogError::InvalidQuery("page numbers start at 1".to_string()));
        }
        if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
            return Err(CatalogError::InvalidQuery(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}"
            )));
        }

        let needle = query.title_contains.as_deref().map(str::to_lowercase);
        let snapshot = self.snapshot().await?;
        let matches: Vec<&Book> = snapshot
            .books()
            .iter()
            .filter(|b| match &needle {
                Some(n) => b.title.to_lowercase().contains(n),
                None => true,
            })
            .filter(|b| match &query.category {
                Some(c) => b.category == *c,
                None => true,
            })
            .collect();

        let total_matches = matches.len();
        let books = matches
            .into_iter()
            .skip((query.page - 1) * query.page_size)
            .take(query.page_size)
            .cloned()
            .collect();

        Ok(SearchResults { books, total_matches, page: query.page, page_size: query.page_size })
    }
}
