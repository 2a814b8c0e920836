//! Crawl orchestration: discovery, worker pool, job lifecycle
//!
//! One crawl at a time: a single-permit semaphore guards the run slot, and a
//! second request while a job runs is rejected instead of queued. The first
//! listing page doubles as page discovery; the remaining pages fan out to a
//! bounded worker pool. Page failures degrade the job, only a run with zero
//! successful pages fails it.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::catalog::CatalogStore;
use crate::domain::book::BookCandidate;
use crate::domain::crawl_job::{CrawlJob, JobStatus, PageFailure};
use crate::domain::events::{AppEvent, EventSink};
use crate::infrastructure::config::CrawlerConfig;
use crate::infrastructure::http_client::{FetchError, PageFetcher};
use crate::infrastructure::parsing::{BookDetailParser, BookListParser, ParseError};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("a crawl job is already running")]
    AlreadyRunning,
    #[error("no job with id {0}")]
    JobNotFound(Uuid),
    #[error(transparent)]
    Parser(#[from] ParseError),
}

/// Result of processing one listing page, folded into the job record.
#[derive(Debug, Default)]
struct PageOutcome {
    succeeded: bool,
    upserted: u32,
    skipped: u32,
    failures: Vec<PageFailure>,
}

/// Pagination facts read from a successfully parsed listing page.
#[derive(Debug, Clone, Copy)]
struct PageMeta {
    total_pages: Option<u32>,
    has_next: bool,
}

/// Shared orchestrator state; the public handle clones this into background
/// tasks.
struct Inner {
    fetcher: Arc<dyn PageFetcher>,
    catalog: Arc<CatalogStore>,
    events: Arc<dyn EventSink>,
    list_parser: BookListParser,
    detail_parser: BookDetailParser,
    config: CrawlerConfig,
    jobs: RwLock<HashMap<Uuid, CrawlJob>>,
    cancel_tokens: RwLock<HashMap<Uuid, CancellationToken>>,
}

pub struct CrawlOrchestrator {
    inner: Arc<Inner>,
    /// Single-permit run slot; holding the permit is what "running" means.
    run_slot: Arc<Semaphore>,
}

impl CrawlOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        catalog: Arc<CatalogStore>,
        events: Arc<dyn EventSink>,
        config: CrawlerConfig,
    ) -> Result<Self, CrawlError> {
        Ok(Self {
            inner: Arc::new(Inner {
                fetcher,
                catalog,
                events,
                list_parser: BookListParser::new()?,
                detail_parser: BookDetailParser::new()?,
                config,
                jobs: RwLock::new(HashMap::new()),
                cancel_tokens: RwLock::new(HashMap::new()),
            }),
            run_slot: Arc::new(Semaphore::new(1)),
        })
    }

    /// Start a crawl job. Returns immediately with the job id; the run
    /// proceeds in a background task. Fails with [`CrawlError::AlreadyRunning`]
    /// while another job holds the run slot.
    pub async fn start_crawl(&self) -> Result<Uuid, CrawlError> {
        let permit = self
            .run_slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| CrawlError::AlreadyRunning)?;

        let job = CrawlJob::new();
        let job_id = job.job_id;
        let cancel = CancellationToken::new();
        self.inner.jobs.write().await.insert(job_id, job);
        self.inner.cancel_tokens.write().await.insert(job_id, cancel.clone());

        info!(%job_id, "crawl job accepted");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.drive(job_id, cancel).await;
            // Permit released here, after every worker has drained.
            drop(permit);
        });
        Ok(job_id)
    }

    pub async fn job_status(&self, job_id: Uuid) -> Result<CrawlJob, CrawlError> {
        self.inner
            .jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(CrawlError::JobNotFound(job_id))
    }

    /// All known jobs, most recently started first.
    pub async fn list_jobs(&self) -> Vec<CrawlJob> {
        let mut jobs: Vec<CrawlJob> = self.inner.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    /// Request cancellation of a running job. Pages already in flight finish;
    /// no new page work starts. Returns `false` for unknown or terminal jobs.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let terminal = match self.inner.jobs.read().await.get(&job_id) {
            Some(job) => job.status.is_terminal(),
            None => return false,
        };
        if terminal {
            return false;
        }
        if let Some(token) = self.inner.cancel_tokens.read().await.get(&job_id) {
            info!(%job_id, "cancellation requested");
            token.cancel();
            true
        } else {
            false
        }
    }
}

impl Inner {
    fn page_url(&self, page: u32) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/catalogue/page-{page}.html")
    }

    async fn transition(&self, job_id: Uuid, next: JobStatus) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            let from = job.status;
            if job.transition_to(next) {
                self.events.emit(AppEvent::JobTransition { job_id, from, to: next });
            }
        }
    }

    async fn update_job(&self, job_id: Uuid, f: impl FnOnce(&mut CrawlJob)) {
        if let Some(job) = self.jobs.write().await.get_mut(&job_id) {
            f(job);
        }
    }

    async fn finish(&self, job_id: Uuid, cancel: &CancellationToken) {
        let pages_succeeded =
            self.jobs.read().await.get(&job_id).map(|j| j.pages_succeeded).unwrap_or(0);
        let status = if cancel.is_cancelled() {
            JobStatus::Cancelled
        } else if pages_succeeded == 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.transition(job_id, status).await;
        self.cancel_tokens.write().await.remove(&job_id);
        info!(%job_id, %status, "crawl job finished");
    }

    async fn drive(self: Arc<Self>, job_id: Uuid, cancel: CancellationToken) {
        // The first page doubles as page discovery.
        let first_url = self.page_url(1);
        let first = self.process_page(&first_url, &cancel).await;

        let meta = match first {
            Ok((outcome, meta)) => {
                self.transition(job_id, JobStatus::Running).await;
                self.fold_outcome(job_id, outcome).await;
                meta
            }
            Err(outcome) => {
                // Discovery never succeeded; fail (or cancel) before dispatch.
                self.fold_outcome(job_id, outcome).await;
                self.finish(job_id, &cancel).await;
                return;
            }
        };

        match meta.total_pages {
            Some(total) => {
                let capped = match self.config.page_limit {
                    Some(limit) => total.min(limit.max(1)),
                    None => total,
                };
                self.update_job(job_id, |job| job.total_pages = Some(capped)).await;
                Arc::clone(&self).crawl_pooled(job_id, capped, cancel.clone()).await;
            }
            // No pager total; fall back to following the next link page by
            // page.
            None if meta.has_next => self.crawl_sequential(job_id, &cancel).await,
            None => {
                self.update_job(job_id, |job| job.total_pages = Some(1)).await;
            }
        }

        self.finish(job_id, &cancel).await;
    }

    /// Known page count: fan pages 2..=total out to the worker pool.
    async fn crawl_pooled(self: Arc<Self>, job_id: Uuid, total_pages: u32, cancel: CancellationToken) {
        let pool = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut workers: JoinSet<PageOutcome> = JoinSet::new();
        for page in 2..=total_pages {
            let this = Arc::clone(&self);
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            let url = self.page_url(page);
            workers.spawn(async move {
                let _permit = match pool.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return PageOutcome::default(),
                };
                // Cancellation is honored at the page boundary.
                if cancel.is_cancelled() {
                    return PageOutcome::default();
                }
                match this.process_page(&url, &cancel).await {
                    Ok((outcome, _)) | Err(outcome) => outcome,
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => self.fold_outcome(job_id, outcome).await,
                Err(e) => {
                    warn!(%job_id, error = %e, "page worker panicked");
                    self.update_job(job_id, |job| {
                        job.record_failure("worker", e.to_string());
                    })
                    .await;
                }
            }
        }
    }

    /// Unknown page count: follow the next link one page at a time until it
    /// runs out, a page fails, or the page limit is reached.
    async fn crawl_sequential(&self, job_id: Uuid, cancel: &CancellationToken) {
        let mut page = 2u32;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(limit) = self.config.page_limit {
                if page > limit.max(1) {
                    break;
                }
            }
            let url = self.page_url(page);
            match self.process_page(&url, cancel).await {
                Ok((outcome, meta)) => {
                    self.fold_outcome(job_id, outcome).await;
                    if !meta.has_next {
                        break;
                    }
                }
                Err(outcome) => {
                    self.fold_outcome(job_id, outcome).await;
                    break;
                }
            }
            page += 1;
        }
        self.update_job(job_id, |job| job.total_pages = Some(page)).await;
    }

    async fn fold_outcome(&self, job_id: Uuid, outcome: PageOutcome) {
        self.update_job(job_id, |job| {
            // Cancellation skips are not attempts.
            if outcome.succeeded || !outcome.failures.is_empty() {
                job.pages_attempted += 1;
            }
            if outcome.succeeded {
                job.pages_succeeded += 1;
            }
            job.records_upserted += outcome.upserted;
            job.records_skipped += outcome.skipped;
            job.errors.extend(outcome.failures);
        })
        .await;
    }

    /// Fetch, parse and ingest one listing page. On success also returns the
    /// pagination facts used by discovery. A failed page is returned as `Err`
    /// with its failure recorded in the outcome.
    async fn process_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(PageOutcome, PageMeta), PageOutcome> {
        let mut outcome = PageOutcome::default();

        // Per-attempt fetch events are emitted by the fetcher itself, which
        // owns the retry loop.
        let page = match self.fetcher.fetch(url, cancel).await {
            Ok(page) => page,
            Err(FetchError::Cancelled { .. }) => return Err(outcome),
            Err(e) => {
                self.events.emit(AppEvent::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                    permanent: matches!(e, FetchError::Permanent { .. }),
                });
                outcome
                    .failures
                    .push(PageFailure { page_ref: url.to_string(), reason: e.to_string() });
                return Err(outcome);
            }
        };

        let parsed = match self.list_parser.parse(&page.html, url) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.events
                    .emit(AppEvent::ParseFailed { url: url.to_string(), reason: e.to_string() });
                outcome
                    .failures
                    .push(PageFailure { page_ref: url.to_string(), reason: e.to_string() });
                return Err(outcome);
            }
        };

        self.events.emit(AppEvent::PageParsed {
            url: url.to_string(),
            candidates: parsed.candidates.len(),
            dropped: parsed.failures.len(),
        });
        outcome.skipped += parsed.failures.len() as u32;
        for reason in &parsed.failures {
            outcome
                .failures
                .push(PageFailure { page_ref: url.to_string(), reason: reason.clone() });
        }

        for mut candidate in parsed.candidates {
            // A page abandoned mid-ingest is not a success; whatever was
            // upserted so far is still reported in the counters.
            if cancel.is_cancelled() {
                return Err(outcome);
            }
            if self.config.fetch_details {
                self.enrich_candidate(&mut candidate, &mut outcome, cancel).await;
            }
            let id = candidate.id.clone();
            match self.catalog.upsert_candidate(candidate).await {
                Ok(_) => outcome.upserted += 1,
                // Storage failures fail the whole page; nothing else on this
                // page would fare better against an unavailable store.
                Err(e) => {
                    self.events
                        .emit(AppEvent::UpsertFailed { id: id.clone(), reason: e.to_string() });
                    outcome.skipped += 1;
                    outcome.failures.push(PageFailure { page_ref: id, reason: e.to_string() });
                    return Err(outcome);
                }
            }
        }

        outcome.succeeded = true;
        Ok((outcome, PageMeta { total_pages: parsed.total_pages, has_next: parsed.has_next }))
    }

    /// Best effort: a failed detail fetch or parse keeps the listing data and
    /// records the reason without failing the page.
    async fn enrich_candidate(
        &self,
        candidate: &mut BookCandidate,
        outcome: &mut PageOutcome,
        cancel: &CancellationToken,
    ) {
        let detail_url = candidate.source_url.clone();
        let page = match self.fetcher.fetch(&detail_url, cancel).await {
            Ok(page) => page,
            Err(FetchError::Cancelled { .. }) => return,
            Err(e) => {
                warn!(url = %detail_url, error = %e, "detail fetch failed, keeping listing data");
                outcome
                    .failures
                    .push(PageFailure { page_ref: detail_url, reason: e.to_string() });
                return;
            }
        };
        match self.detail_parser.parse(&page.html, &detail_url) {
            Ok(detail) => candidate.enrich_from_detail(&detail),
            Err(e) => {
                self.events
                    .emit(AppEvent::ParseFailed { url: detail_url.clone(), reason: e.to_string() });
                outcome
                    .failures
                    .push(PageFailure { page_ref: detail_url, reason: e.to_string() });
            }
        }
    }
}
