//! The harvest loop: one search query driven across numbered result pages,
//! each listing scraped, parsed, dedup-checked, and persisted in sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::airtable::{AirtableClient, AirtableError, AirtableResult};
use crate::browser::{BrowserError, BrowserResult};
use crate::ledger::{LedgerError, LedgerResult, SqliteLedger};
use crate::qualify::QualificationParser;
use crate::record::{JobRecord, ListingDetail, ListingSummary};

/// Listing source seam: the live browser in production, mocks in tests.
#[async_trait(?Send)]
pub trait JobSource {
    async fn open_search(&mut self, query: &str) -> BrowserResult<()>;
    async fn current_listings(&mut self) -> BrowserResult<Vec<ListingSummary>>;
    async fn scrape_detail(&mut self, summary: &ListingSummary) -> BrowserResult<ListingDetail>;
    /// Moves to the next result page; None when exhausted.
    async fn next_page(&mut self) -> BrowserResult<Option<u32>>;
}

/// Persistence seam over the tabular store.
#[async_trait(?Send)]
pub trait RecordSink {
    /// Persists one record and returns the created record id.
    async fn push(&self, record: &JobRecord) -> AirtableResult<String>;
}

#[async_trait(?Send)]
impl RecordSink for AirtableClient {
    async fn push(&self, record: &JobRecord) -> AirtableResult<String> {
        AirtableClient::push(self, record).await
    }
}

/// Cross-run dedup seam.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn contains(&self, listing_key: &str) -> LedgerResult<bool>;
    async fn record_push(&self, record: &JobRecord, record_id: &str) -> LedgerResult<()>;
}

#[async_trait]
impl DedupLedger for SqliteLedger {
    async fn contains(&self, listing_key: &str) -> LedgerResult<bool> {
        let ledger = self.clone();
        let listing_key = listing_key.to_string();
        tokio::task::spawn_blocking(move || ledger.contains(&listing_key))
            .await
            .map_err(|err| LedgerError::Io(std::io::Error::other(err)))?
    }

    async fn record_push(&self, record: &JobRecord, record_id: &str) -> LedgerResult<()> {
        let ledger = self.clone();
        let record = record.clone();
        let record_id = record_id.to_string();
        tokio::task::spawn_blocking(move || ledger.record_push(&record, &record_id))
            .await
            .map_err(|err| LedgerError::Io(std::io::Error::other(err)))?
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub query: String,
    pub max_records: usize,
    pub listing_delay_ms: (u64, u64),
    pub stop_on_first_error: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct HarvestStats {
    pub run_id: String,
    pub query: String,
    pub pages_visited: u32,
    pub listings_seen: usize,
    pub records_scraped: usize,
    pub records_pushed: usize,
    pub duplicates_skipped: usize,
    pub listings_skipped: usize,
    pub dry_run: bool,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
    pub errors: Vec<String>,
}

impl HarvestStats {
    fn new(query: &str, dry_run: bool) -> Self {
        Self {
            run_id: format!("run-{}", Uuid::new_v4().simple()),
            query: query.to_string(),
            dry_run,
            ..Default::default()
        }
    }
}

enum ListingOutcome {
    Pushed(String),
    Duplicate,
    DryRun,
}

pub struct HarvestLoop {
    source: Box<dyn JobSource>,
    sink: Arc<dyn RecordSink>,
    ledger: Arc<dyn DedupLedger>,
    parser: QualificationParser,
    config: HarvestConfig,
    rate_limiter: RateLimiter,
}

impl HarvestLoop {
    pub fn new(
        source: Box<dyn JobSource>,
        sink: Arc<dyn RecordSink>,
        ledger: Arc<dyn DedupLedger>,
        config: HarvestConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.listing_delay_ms);
        Self {
            source,
            sink,
            ledger,
            parser: QualificationParser::new(),
            config,
            rate_limiter,
        }
    }

    pub async fn run(&mut self) -> BrowserResult<HarvestStats> {
        let start = Instant::now();
        let query = self.config.query.clone();
        let mut stats = HarvestStats::new(&query, self.config.dry_run);
        stats.pages_visited = 1;

        self.source.open_search(&query).await?;
        info!(run_id = %stats.run_id, query = %query, dry_run = stats.dry_run, "harvest started");

        'pages: loop {
            let listings = self.source.current_listings().await?;
            stats.listings_seen += listings.len();
            info!(
                page = stats.pages_visited,
                listings = listings.len(),
                "collected result page"
            );

            for summary in &listings {
                if stats.records_scraped >= self.config.max_records {
                    debug!(max_records = self.config.max_records, "record cap reached");
                    break 'pages;
                }

                if stats.records_scraped + stats.listings_skipped + stats.duplicates_skipped > 0 {
                    let waited = self.rate_limiter.wait().await;
                    stats.total_wait_ms += waited;
                }

                match self.process_listing(summary).await {
                    Ok(ListingOutcome::Pushed(record_id)) => {
                        stats.records_scraped += 1;
                        stats.records_pushed += 1;
                        debug!(record_id = %record_id, "record persisted");
                    }
                    Ok(ListingOutcome::DryRun) => {
                        stats.records_scraped += 1;
                    }
                    Ok(ListingOutcome::Duplicate) => {
                        stats.duplicates_skipped += 1;
                    }
                    Err(err) => {
                        stats.listings_skipped += 1;
                        let message = format!("listing {}: {}", summary.position, err);
                        stats.errors.push(message);
                        warn!(position = summary.position, error = %err, "listing skipped");
                        if self.config.stop_on_first_error {
                            return Err(err);
                        }
                    }
                }
            }

            match self.source.next_page().await {
                Ok(Some(page)) => {
                    stats.pages_visited = page.max(stats.pages_visited + 1);
                }
                Ok(None) => break,
                Err(err) => {
                    // The run ends at the last completed page; already
                    // persisted records stand.
                    stats.errors.push(format!("pagination: {err}"));
                    warn!(error = %err, "pagination failed, ending run at last completed page");
                    break;
                }
            }
        }

        stats.duration_secs = start.elapsed().as_secs();
        info!(
            run_id = %stats.run_id,
            pages = stats.pages_visited,
            seen = stats.listings_seen,
            pushed = stats.records_pushed,
            duplicates = stats.duplicates_skipped,
            skipped = stats.listings_skipped,
            errors = stats.errors.len(),
            duration = stats.duration_secs,
            "harvest finished"
        );
        Ok(stats)
    }

    async fn process_listing(&mut self, summary: &ListingSummary) -> BrowserResult<ListingOutcome> {
        let detail = self.source.scrape_detail(summary).await?;
        let qualifications = self.parser.parse(&detail.description);
        let record = JobRecord::from_detail(detail, qualifications);

        let already_pushed = self
            .ledger
            .contains(&record.listing_key)
            .await
            .map_err(|err| BrowserError::Unexpected(err.to_string()))?;
        if already_pushed {
            debug!(listing_key = %record.listing_key, "listing already in ledger");
            return Ok(ListingOutcome::Duplicate);
        }

        if self.config.dry_run {
            return Ok(ListingOutcome::DryRun);
        }

        let record_id = self
            .sink
            .push(&record)
            .await
            .map_err(|err| BrowserError::Unexpected(persist_error(&record, &err)))?;
        if let Err(err) = self.ledger.record_push(&record, &record_id).await {
            // The record exists remotely; a ledger write failure only costs
            // dedup on a future run.
            warn!(listing_key = %record.listing_key, error = %err, "ledger write failed");
        }
        Ok(ListingOutcome::Pushed(record_id))
    }
}

fn persist_error(record: &JobRecord, err: &AirtableError) -> String {
    format!("persist {} failed: {}", record.listing_key, err)
}

struct RateLimiter {
    range: (u64, u64),
}

impl RateLimiter {
    fn new(range: (u64, u64)) -> Self {
        Self { range }
    }

    async fn wait(&mut self) -> u64 {
        if self.range.0 == 0 && self.range.1 == 0 {
            return 0;
        }
        let lower = self.range.0.min(self.range.1);
        let upper = self.range.0.max(self.range.1);
        let delay = rand::thread_rng().gen_range(lower..=upper);
        sleep(Duration::from_millis(delay)).await;
        delay
    }
}
