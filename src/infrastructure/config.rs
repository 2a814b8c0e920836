//! Application configuration
//!
//! Defaults live in the `defaults` module; a TOML file and `BOOKSCRAPE_*`
//! environment variables can override them. Startup wiring is left to the
//! embedding process; the library only defines the shapes and the loader.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default values for all tunables.
pub mod defaults {
    pub const BASE_URL: &str = "https://books.toscrape.com/";
    pub const USER_AGENT: &str = "bookscrape/0.2 (catalog research)";
    pub const MAX_CONCURRENCY: usize = 4;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 500;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
    pub const DATABASE_URL: &str = "sqlite:data/bookscrape.db";
    pub const LOG_LEVEL: &str = "info";
}

/// Tuning for one crawl run and the shared HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Root of the external catalog; listing pages live under `catalogue/`.
    pub base_url: String,
    pub user_agent: String,
    /// Worker pool width, independent of the number of pages.
    pub max_concurrency: usize,
    /// Global politeness rate limit shared by all workers.
    pub max_requests_per_second: u32,
    pub request_timeout_seconds: u64,
    /// Retries per fetch for transient failures; whole jobs are never retried.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Fetch each book's detail page for category, description and stock.
    pub fetch_details: bool,
    /// Optional cap on listing pages per crawl, for partial runs.
    pub page_limit: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            max_concurrency: defaults::MAX_CONCURRENCY,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            fetch_details: true,
            page_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: defaults::DATABASE_URL.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// When set, also write non-blocking daily log files into this directory.
    pub file_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: defaults::LOG_LEVEL.to_string(), file_dir: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus `BOOKSCRAPE_*`
    /// environment overrides (`BOOKSCRAPE_CRAWLER__MAX_CONCURRENCY=8`).
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("BOOKSCRAPE").separator("__"))
            .build()
            .context("failed to assemble configuration sources")?;
        cfg.try_deserialize().context("invalid configuration")
    }
}
