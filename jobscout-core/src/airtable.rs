//! Airtable persistence adapter: one create-record call per harvested job,
//! with a bounded backoff schedule for transient failures. A record-level
//! failure never aborts the surrounding run.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use crate::config::{AirtableSection, PushRetrySection};
use crate::record::JobRecord;

#[derive(Debug, Error)]
pub enum AirtableError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("airtable rejected the request with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("airtable rate limit hit")]
    RateLimited,
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AirtableError {
    pub fn is_transient(&self) -> bool {
        match self {
            AirtableError::RateLimited => true,
            AirtableError::Api { status, .. } => *status >= 500,
            AirtableError::Http(err) => err.is_timeout() || err.is_connect(),
            AirtableError::Configuration(_) => false,
        }
    }
}

pub type AirtableResult<T> = std::result::Result<T, AirtableError>;

/// Backoff schedule for create-record calls. Transient failures are retried
/// until the schedule is exhausted; anything else fails immediately.
#[derive(Debug, Clone)]
pub struct PushRetryPolicy {
    max_attempts: usize,
    schedule: Vec<Duration>,
    jitter_ms: u64,
}

impl PushRetryPolicy {
    pub fn new(config: PushRetrySection) -> Self {
        let mut schedule = config
            .backoff_ms
            .into_iter()
            .map(Duration::from_millis)
            .collect::<Vec<_>>();
        if schedule.is_empty() {
            schedule.push(Duration::from_secs(1));
            schedule.push(Duration::from_secs(5));
            schedule.push(Duration::from_secs(15));
        }
        Self {
            max_attempts: config.max_attempts.max(1),
            schedule,
            jitter_ms: config.jitter_ms,
        }
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self
            .schedule
            .get(attempt.saturating_sub(1))
            .cloned()
            .unwrap_or_else(|| *self.schedule.last().unwrap());
        if self.jitter_ms == 0 {
            base
        } else {
            let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
            base + Duration::from_millis(jitter)
        }
    }

    pub async fn run<F, Fut, T>(&self, mut operation: F) -> AirtableResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = AirtableResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if !error.is_transient() || attempt >= self.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient persistence failure, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRecordBody<'a> {
    fields: RecordFields<'a>,
    typecast: bool,
}

#[derive(Debug, Serialize)]
struct RecordFields<'a> {
    #[serde(rename = "Listing Key")]
    listing_key: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Organization")]
    organization: &'a str,
    #[serde(rename = "Location")]
    location: &'a str,
    #[serde(rename = "Posted Date", skip_serializing_if = "Option::is_none")]
    posted_date: Option<&'a str>,
    #[serde(rename = "Salary", skip_serializing_if = "Option::is_none")]
    salary: Option<&'a str>,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Minimum Qualifications")]
    minimum_qualifications: String,
    #[serde(rename = "Preferred Qualifications")]
    preferred_qualifications: String,
    #[serde(rename = "Requirements")]
    requirements: String,
}

impl<'a> RecordFields<'a> {
    fn from_record(record: &'a JobRecord) -> Self {
        Self {
            listing_key: &record.listing_key,
            title: &record.title,
            organization: &record.organization,
            location: &record.location,
            posted_date: record.posted_date.as_deref(),
            salary: record.salary.as_deref(),
            description: &record.description,
            minimum_qualifications: record.qualifications.minimum.join("\n"),
            preferred_qualifications: record.qualifications.preferred.join("\n"),
            requirements: record.qualifications.requirements.join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordCreated {
    id: String,
}

#[derive(Debug, Clone)]
pub struct AirtableClient {
    http: reqwest::Client,
    record_url: Url,
    api_key: String,
    retry: PushRetryPolicy,
}

impl AirtableClient {
    pub fn new(
        config: &AirtableSection,
        retry: PushRetrySection,
        api_key: String,
    ) -> AirtableResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let record_url = build_record_url(config)?;
        Ok(Self {
            http,
            record_url,
            api_key,
            retry: PushRetryPolicy::new(retry),
        })
    }

    pub fn record_url(&self) -> &Url {
        &self.record_url
    }

    /// Single create-record attempt, no retry.
    pub async fn create_record(&self, record: &JobRecord) -> AirtableResult<String> {
        let body = CreateRecordBody {
            fields: RecordFields::from_record(record),
            typecast: true,
        };
        let response = self
            .http
            .post(self.record_url.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AirtableError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AirtableError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let created: RecordCreated = response.json().await?;
        Ok(created.id)
    }

    /// Create-record with the configured backoff schedule applied.
    pub async fn push(&self, record: &JobRecord) -> AirtableResult<String> {
        self.retry.run(|_| self.create_record(record)).await
    }
}

fn build_record_url(config: &AirtableSection) -> AirtableResult<Url> {
    let mut url = Url::parse(&config.endpoint)
        .map_err(|err| AirtableError::Configuration(format!("invalid endpoint: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| AirtableError::Configuration("endpoint cannot be opaque".to_string()))?
        .push(&config.base_id)
        .push(&config.table);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn retry_section(max_attempts: usize) -> PushRetrySection {
        PushRetrySection {
            max_attempts,
            backoff_ms: vec![0],
            jitter_ms: 0,
        }
    }

    fn airtable_section() -> AirtableSection {
        AirtableSection {
            endpoint: "https://api.airtable.com/v0".to_string(),
            base_id: "appFAKEBASE".to_string(),
            table: "Job Posts".to_string(),
            timeout_seconds: 5,
        }
    }

    #[test]
    fn record_url_escapes_table_name() {
        let url = build_record_url(&airtable_section()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.airtable.com/v0/appFAKEBASE/Job%20Posts"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(AirtableError::RateLimited.is_transient());
        assert!(AirtableError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!AirtableError::Api {
            status: 422,
            message: String::new()
        }
        .is_transient());
        assert!(!AirtableError::Configuration("x".into()).is_transient());
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let policy = PushRetryPolicy::new(retry_section(3));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = Arc::clone(&calls);
        let result = policy
            .run(move |_| {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AirtableError::RateLimited)
                    } else {
                        Ok::<_, AirtableError>("rec42".to_string())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "rec42");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let policy = PushRetryPolicy::new(retry_section(2));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = Arc::clone(&calls);
        let result: AirtableResult<String> = policy
            .run(move |_| {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AirtableError::RateLimited)
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_permanent_failures() {
        let policy = PushRetryPolicy::new(retry_section(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_op = Arc::clone(&calls);
        let result: AirtableResult<String> = policy
            .run(move |_| {
                let calls = Arc::clone(&calls_in_op);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AirtableError::Api {
                        status: 422,
                        message: "unknown field".to_string(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(AirtableError::Api { status: 422, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
