//! bookscrape: book catalog ingestion, querying and prediction
//!
//! The crate crawls a paginated book catalog, parses listing and detail
//! pages into canonical records, upserts them into a catalog store, and
//! serves search, statistics and a trained recommendation model on top of
//! immutable catalog snapshots.
//!
//! Layering:
//! - [`domain`]: entities (books, crawl jobs), events and the persistence
//!   contract.
//! - [`infrastructure`]: configuration, logging, the HTTP fetcher, HTML
//!   parsers and the repository implementations.
//! - [`application`]: the catalog store, crawl orchestrator, statistics
//!   engine and the feature/prediction engine.
//!
//! The library has no transport surface of its own; an embedding process
//! wires [`application::orchestrator::CrawlOrchestrator`] and the query
//! operations to whatever trigger and query transport it uses.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::catalog::{
    CatalogError, CatalogSnapshot, CatalogStore, SearchQuery, SearchResults,
};
pub use application::ml::{
    build_training_dataset, MlError, Prediction, PredictionEngine, TrainingDataset,
};
pub use application::orchestrator::{CrawlError, CrawlOrchestrator};
pub use application::statistics::{overview, CatalogOverview};
pub use domain::book::{Availability, Book, BookCandidate, UpsertOutcome};
pub use domain::crawl_job::{CrawlJob, JobStatus};
pub use domain::events::{AppEvent, ChannelSink, EventSink, NullSink, TracingSink};
pub use domain::repositories::BookRepository;
pub use infrastructure::config::AppConfig;
pub use infrastructure::http_client::{HttpFetcher, PageFetcher};
pub use infrastructure::memory_repository::MemoryBookRepository;
pub use infrastructure::sqlite_repository::SqliteBookRepository;
