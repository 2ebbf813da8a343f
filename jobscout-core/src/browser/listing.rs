use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::{ScrollSection, SelectorSection};
use crate::record::{ListingDetail, ListingSummary};

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};
use super::escape_js;
use super::human::HumanMotionController;

/// Opens one result row's detail view, forces lazy content to render by
/// scrolling the description container until its height settles, then reads
/// the structured fields and the full description text.
#[derive(Debug, Clone)]
pub struct ListingScraper {
    selectors: SelectorSection,
    scroll: ScrollSection,
}

#[derive(Debug, Deserialize)]
struct ScrollProbe {
    height: f64,
    top: f64,
}

#[derive(Debug, Deserialize)]
struct RawListingPayload {
    title_candidates: Vec<String>,
    org_name: Option<String>,
    location: Option<String>,
    posted_date: Option<String>,
    salary: Option<String>,
    description_text: Option<String>,
    page_url: Option<String>,
}

impl ListingScraper {
    pub fn new(selectors: SelectorSection, scroll: ScrollSection) -> Self {
        Self { selectors, scroll }
    }

    pub async fn scrape(
        &self,
        context: &BrowserContext,
        human: &mut HumanMotionController,
        summary: &ListingSummary,
    ) -> BrowserResult<ListingDetail> {
        self.open_listing(context, human, summary).await?;
        self.settle_description(context, human).await?;
        self.extract(context).await
    }

    async fn open_listing(
        &self,
        context: &BrowserContext,
        human: &mut HumanMotionController,
        summary: &ListingSummary,
    ) -> BrowserResult<()> {
        let rows = context.find_elements(&self.selectors.listing_items).await?;
        let row = rows.into_iter().nth(summary.position).ok_or_else(|| {
            BrowserError::ElementNotFound(format!("result row at position {}", summary.position))
        })?;
        human.click_element(&row).await?;
        context.wait_for_element(&self.selectors.detail_card).await?;
        context.wait_for_element(&self.selectors.job_title).await?;
        debug!(position = summary.position, "opened listing detail view");
        Ok(())
    }

    /// Scrolls the description container in fixed increments until the
    /// scroll height stops changing for the configured number of probes, or
    /// the bottom is reached.
    async fn settle_description(
        &self,
        context: &BrowserContext,
        human: &mut HumanMotionController,
    ) -> BrowserResult<()> {
        let script = self.scroll_script();
        let mut last_height = -1.0f64;
        let mut unchanged = 0u32;
        loop {
            let probe: Option<ScrollProbe> = context.evaluate_json(&script).await?;
            let Some(probe) = probe else {
                return Err(BrowserError::ElementNotFound(
                    self.selectors.description_container.clone(),
                ));
            };
            trace!(height = probe.height, top = probe.top, "description scroll probe");
            if (probe.height - last_height).abs() < 1.0 {
                unchanged += 1;
            } else {
                unchanged = 0;
            }
            if unchanged >= self.scroll.settle_probes
                || probe.top + f64::from(self.scroll.increment_px) >= probe.height
            {
                return Ok(());
            }
            last_height = probe.height;
            human.pause_for_scroll().await;
        }
    }

    async fn extract(&self, context: &BrowserContext) -> BrowserResult<ListingDetail> {
        let payload: RawListingPayload = context.evaluate_json(&self.extract_script()).await?;

        let title = select_title(payload.title_candidates)
            .ok_or_else(|| BrowserError::Extraction("job title missing from detail view".into()))?;
        let organization = clean(payload.org_name)
            .ok_or_else(|| BrowserError::Extraction("organization missing from detail view".into()))?;
        let description = clean(payload.description_text)
            .ok_or_else(|| BrowserError::Extraction("description missing from detail view".into()))?;

        Ok(ListingDetail {
            title,
            organization,
            location: clean(payload.location).unwrap_or_default(),
            posted_date: clean(payload.posted_date),
            salary: clean(payload.salary),
            description,
            url: clean(payload.page_url),
        })
    }

    fn scroll_script(&self) -> String {
        format!(
            r#"
(() => {{
    const el = document.querySelector('{container}');
    if (!el) return null;
    el.scrollBy(0, {increment});
    return {{ height: el.scrollHeight, top: el.scrollTop }};
}})()
"#,
            container = escape_js(&self.selectors.description_container),
            increment = self.scroll.increment_px,
        )
    }

    fn extract_script(&self) -> String {
        format!(
            r#"
(() => {{
    const text = (selector) => {{
        const el = document.querySelector(selector);
        return el && el.innerText ? el.innerText.trim() : null;
    }};
    const container = document.querySelector('{container}');
    return {{
        title_candidates: [text('{title}'), document.title || null].filter(Boolean),
        org_name: text('{org}'),
        location: text('{location}'),
        posted_date: text('{date}'),
        salary: text('{salary}'),
        description_text: container ? container.innerText : null,
        page_url: window.location.href,
    }};
}})()
"#,
            container = escape_js(&self.selectors.description_container),
            title = escape_js(&self.selectors.job_title),
            org = escape_js(&self.selectors.org_name),
            location = escape_js(&self.selectors.location),
            date = escape_js(&self.selectors.posted_date),
            salary = escape_js(&self.selectors.salary),
        )
    }
}

fn select_title(candidates: Vec<String>) -> Option<String> {
    candidates
        .into_iter()
        .map(|candidate| candidate.trim().to_string())
        .find(|candidate| !candidate.is_empty())
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_title_prefers_first_non_empty_candidate() {
        assert_eq!(
            select_title(vec!["  ".into(), "Data Analyst".into(), "tab title".into()]),
            Some("Data Analyst".to_string())
        );
        assert_eq!(select_title(vec![]), None);
    }

    #[test]
    fn clean_trims_and_drops_empty_values() {
        assert_eq!(clean(Some("  Lisbon  ".into())), Some("Lisbon".to_string()));
        assert_eq!(clean(Some("   ".into())), None);
        assert_eq!(clean(None), None);
    }
}
