use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::{SelectorSection, SessionSection};
use crate::record::ListingSummary;

use super::automation::BrowserContext;
use super::error::BrowserResult;
use super::escape_js;

/// Opens a job search for a query string and reads the result rows of the
/// currently rendered page.
#[derive(Debug, Clone)]
pub struct SearchNavigator {
    session: SessionSection,
    selectors: SelectorSection,
}

#[derive(Debug, Deserialize)]
struct ListingRowRaw {
    index: usize,
    listing_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

impl SearchNavigator {
    pub fn new(session: SessionSection, selectors: SelectorSection) -> Self {
        Self { session, selectors }
    }

    pub fn build_search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let base = self.session.jobs_url.trim_end_matches('/');
        format!("{base}/?keywords={encoded}")
    }

    pub async fn open_search(&self, context: &BrowserContext, query: &str) -> BrowserResult<()> {
        let url = self.build_search_url(query);
        debug!(url = %url, "opening job search");
        context.goto(&url).await?;
        context.wait_for_element(&self.selectors.results_list).await?;
        Ok(())
    }

    pub async fn page_listings(
        &self,
        context: &BrowserContext,
    ) -> BrowserResult<Vec<ListingSummary>> {
        let script = self.listing_scan_script();
        let rows: Vec<ListingRowRaw> = context.evaluate_json(&script).await?;
        trace!(rows = rows.len(), "scanned result page rows");
        Ok(rows
            .into_iter()
            .map(|row| ListingSummary {
                position: row.index,
                listing_id: row.listing_id.filter(|id| !id.is_empty()),
                title: row
                    .title
                    .map(|title| title.trim().to_string())
                    .filter(|title| !title.is_empty()),
                url: row.url.filter(|url| !url.is_empty()),
            })
            .collect())
    }

    fn listing_scan_script(&self) -> String {
        format!(
            r#"
(() => {{
    const rows = Array.from(document.querySelectorAll('{items}'));
    return rows.map((row, index) => {{
        const link = row.querySelector("a[href*='/jobs/view/'], a.job-card-list__title, a.base-card__full-link");
        const id = row.getAttribute('data-occludable-job-id')
            || row.getAttribute('data-job-id')
            || row.getAttribute('data-id');
        return {{
            index,
            listing_id: id,
            title: link && link.textContent ? link.textContent.trim() : null,
            url: link ? link.href : null,
        }};
    }});
}})()
"#,
            items = escape_js(&self.selectors.listing_items),
        )
    }
}
