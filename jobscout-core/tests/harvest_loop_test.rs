use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use jobscout_core::airtable::{AirtableError, AirtableResult};
use jobscout_core::browser::{BrowserError, BrowserResult};
use jobscout_core::harvest::{
    DedupLedger, HarvestConfig, HarvestLoop, JobSource, RecordSink,
};
use jobscout_core::ledger::LedgerResult;
use jobscout_core::record::{JobRecord, ListingDetail, ListingSummary};

#[derive(Clone)]
struct ListingStub {
    id: u64,
    title: String,
    fail_scrape: bool,
}

struct MockSource {
    pages: Vec<Vec<ListingStub>>,
    page_index: usize,
    fail_next_page: bool,
}

impl MockSource {
    fn new(pages: Vec<Vec<ListingStub>>) -> Self {
        Self {
            pages,
            page_index: 0,
            fail_next_page: false,
        }
    }
}

#[async_trait(?Send)]
impl JobSource for MockSource {
    async fn open_search(&mut self, _query: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn current_listings(&mut self) -> BrowserResult<Vec<ListingSummary>> {
        let page = self.pages.get(self.page_index).cloned().unwrap_or_default();
        Ok(page
            .iter()
            .enumerate()
            .map(|(position, stub)| ListingSummary {
                position,
                listing_id: Some(stub.id.to_string()),
                title: Some(stub.title.clone()),
                url: Some(format!("https://www.linkedin.com/jobs/view/{}", stub.id)),
            })
            .collect())
    }

    async fn scrape_detail(&mut self, summary: &ListingSummary) -> BrowserResult<ListingDetail> {
        let page = &self.pages[self.page_index];
        let stub = &page[summary.position];
        if stub.fail_scrape {
            return Err(BrowserError::ElementNotFound("job details card".into()));
        }
        Ok(ListingDetail {
            title: stub.title.clone(),
            organization: "Acme Analytics".into(),
            location: "Remote".into(),
            posted_date: Some("1 week ago".into()),
            salary: None,
            description: format!(
                "About the role for {}\nMinimum Qualifications\n- SQL\n- Python\nPreferred Qualifications\n- dbt\n",
                stub.title
            ),
            url: summary.url.clone(),
        })
    }

    async fn next_page(&mut self) -> BrowserResult<Option<u32>> {
        if self.fail_next_page {
            return Err(BrowserError::Timeout("selector nav".into()));
        }
        if self.page_index + 1 < self.pages.len() {
            self.page_index += 1;
            Ok(Some(self.page_index as u32 + 1))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
struct MockSink {
    pushed: Mutex<Vec<JobRecord>>,
    fail_always: bool,
}

#[async_trait(?Send)]
impl RecordSink for MockSink {
    async fn push(&self, record: &JobRecord) -> AirtableResult<String> {
        if self.fail_always {
            return Err(AirtableError::Api {
                status: 422,
                message: "unknown field".into(),
            });
        }
        let mut guard = self.pushed.lock().await;
        guard.push(record.clone());
        Ok(format!("rec{}", guard.len()))
    }
}

#[derive(Default)]
struct MockLedger {
    known: Mutex<Vec<String>>,
    recorded: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl DedupLedger for MockLedger {
    async fn contains(&self, listing_key: &str) -> LedgerResult<bool> {
        Ok(self.known.lock().await.iter().any(|key| key == listing_key))
    }

    async fn record_push(&self, record: &JobRecord, record_id: &str) -> LedgerResult<()> {
        self.known.lock().await.push(record.listing_key.clone());
        self.recorded
            .lock()
            .await
            .push((record.listing_key.clone(), record_id.to_string()));
        Ok(())
    }
}

fn listing(id: u64, title: &str) -> ListingStub {
    ListingStub {
        id,
        title: title.to_string(),
        fail_scrape: false,
    }
}

fn failing_listing(id: u64, title: &str) -> ListingStub {
    ListingStub {
        id,
        title: title.to_string(),
        fail_scrape: true,
    }
}

fn harvest_config(dry_run: bool) -> HarvestConfig {
    HarvestConfig {
        query: "Data Analyst".into(),
        max_records: 50,
        listing_delay_ms: (0, 0),
        stop_on_first_error: false,
        dry_run,
    }
}

#[tokio::test]
async fn harvests_every_listing_across_pages() {
    let source = MockSource::new(vec![
        vec![listing(1, "Data Analyst"), listing(2, "BI Analyst")],
        vec![listing(3, "Analytics Engineer")],
    ]);
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        harvest_config(false),
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.pages_visited, 2);
    assert_eq!(stats.listings_seen, 3);
    assert_eq!(stats.records_pushed, 3);
    assert_eq!(stats.listings_skipped, 0);
    assert!(stats.errors.is_empty());

    let pushed = sink.pushed.lock().await;
    assert_eq!(pushed.len(), 3);
    assert_eq!(pushed[0].listing_key, "1");
    assert_eq!(pushed[0].qualifications.minimum, vec!["SQL", "Python"]);
    assert_eq!(pushed[0].qualifications.preferred, vec!["dbt"]);
    assert!(pushed[0].qualifications.requirements.is_empty());

    let recorded = ledger.recorded.lock().await;
    assert_eq!(recorded.len(), 3);
    assert_eq!(recorded[0], ("1".to_string(), "rec1".to_string()));
}

#[tokio::test]
async fn failing_listing_is_skipped_and_counted() {
    let source = MockSource::new(vec![vec![
        listing(1, "Data Analyst"),
        failing_listing(2, "Broken"),
        listing(3, "BI Analyst"),
    ]]);
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        harvest_config(false),
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.records_pushed, 2);
    assert_eq!(stats.listings_skipped, 1);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].contains("element not found"));
}

#[tokio::test]
async fn stop_on_first_error_aborts_the_run() {
    let source = MockSource::new(vec![vec![
        failing_listing(1, "Broken"),
        listing(2, "Data Analyst"),
    ]]);
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    let mut config = harvest_config(false);
    config.stop_on_first_error = true;
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        config,
    );

    assert!(harvest.run().await.is_err());
    assert!(sink.pushed.lock().await.is_empty());
}

#[tokio::test]
async fn dry_run_persists_nothing() {
    let source = MockSource::new(vec![vec![listing(1, "Data Analyst")]]);
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        harvest_config(true),
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.records_scraped, 1);
    assert_eq!(stats.records_pushed, 0);
    assert!(sink.pushed.lock().await.is_empty());
    assert!(ledger.recorded.lock().await.is_empty());
}

#[tokio::test]
async fn ledger_hit_skips_the_push() {
    let source = MockSource::new(vec![vec![
        listing(11, "Data Analyst"),
        listing(12, "BI Analyst"),
    ]]);
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    ledger.known.lock().await.push("11".to_string());
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        harvest_config(false),
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(stats.records_pushed, 1);
    let pushed = sink.pushed.lock().await;
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].listing_key, "12");
}

#[tokio::test]
async fn record_cap_bounds_the_run() {
    let source = MockSource::new(vec![vec![
        listing(1, "A"),
        listing(2, "B"),
        listing(3, "C"),
        listing(4, "D"),
    ]]);
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    let mut config = harvest_config(false);
    config.max_records = 2;
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        config,
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.records_pushed, 2);
    assert_eq!(stats.records_scraped, 2);
}

#[tokio::test]
async fn persistence_failure_skips_the_record_but_not_the_run() {
    let source = MockSource::new(vec![vec![
        listing(1, "Data Analyst"),
        listing(2, "BI Analyst"),
    ]]);
    let sink = Arc::new(MockSink {
        fail_always: true,
        ..Default::default()
    });
    let ledger = Arc::new(MockLedger::default());
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        harvest_config(false),
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.records_pushed, 0);
    assert_eq!(stats.listings_skipped, 2);
    assert_eq!(stats.errors.len(), 2);
    assert!(ledger.recorded.lock().await.is_empty());
}

#[tokio::test]
async fn pagination_failure_ends_the_run_at_the_last_completed_page() {
    let mut source = MockSource::new(vec![vec![listing(1, "Data Analyst")]]);
    source.fail_next_page = true;
    let sink = Arc::new(MockSink::default());
    let ledger = Arc::new(MockLedger::default());
    let mut harvest = HarvestLoop::new(
        Box::new(source),
        Arc::clone(&sink) as Arc<dyn RecordSink>,
        Arc::clone(&ledger) as Arc<dyn DedupLedger>,
        harvest_config(false),
    );

    let stats = harvest.run().await.unwrap();
    assert_eq!(stats.records_pushed, 1);
    assert_eq!(stats.pages_visited, 1);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].starts_with("pagination:"));
}
