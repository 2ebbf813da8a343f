use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::qualify::QualificationBlock;

/// One row of a search-results page, as reported by the result list before
/// the detail view has been opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSummary {
    pub position: usize,
    pub listing_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}

/// Raw fields scraped from a rendered listing detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDetail {
    pub title: String,
    pub organization: String,
    pub location: String,
    pub posted_date: Option<String>,
    pub salary: Option<String>,
    pub description: String,
    pub url: Option<String>,
}

/// A fully extracted job posting, ready for persistence. Immutable after
/// creation; discarded once the tabular store acknowledges it.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub listing_key: String,
    pub title: String,
    pub organization: String,
    pub location: String,
    pub posted_date: Option<String>,
    pub salary: Option<String>,
    pub description: String,
    pub qualifications: QualificationBlock,
}

impl JobRecord {
    pub fn from_detail(detail: ListingDetail, qualifications: QualificationBlock) -> Self {
        let listing_key = detail
            .url
            .as_deref()
            .and_then(listing_key_from_url)
            .unwrap_or_else(|| {
                fallback_listing_key(&detail.title, &detail.organization, &detail.location)
            });
        Self {
            listing_key,
            title: detail.title,
            organization: detail.organization,
            location: detail.location,
            posted_date: detail.posted_date,
            salary: detail.salary,
            description: detail.description,
            qualifications,
        }
    }
}

/// Pulls the numeric job id out of a listing URL. Both the detail-pane URL
/// (`currentJobId=` query parameter) and the standalone view URL
/// (`/jobs/view/<id>`) carry it.
pub fn listing_key_from_url(url: &str) -> Option<String> {
    let pattern = Regex::new(r"(?:currentJobId=|/jobs/view/)(\d+)").expect("valid regex");
    pattern
        .captures(url)
        .map(|captures| captures[1].to_string())
}

fn fallback_listing_key(title: &str, organization: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(organization.as_bytes());
    hasher.update([0x1f]);
    hasher.update(location.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
