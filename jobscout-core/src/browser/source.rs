use async_trait::async_trait;

use crate::config::{BrowserConfig, SelectorSection};
use crate::harvest::JobSource;
use crate::record::{ListingDetail, ListingSummary};

use super::automation::BrowserContext;
use super::error::BrowserResult;
use super::human::HumanMotionController;
use super::listing::ListingScraper;
use super::navigator::SearchNavigator;
use super::pagination::{BrowserPager, PaginationController};

/// Live-browser implementation of the harvest loop's listing source,
/// composing the navigator, scraper, and pagination controller over one
/// browser context.
pub struct BrowserJobSource {
    context: BrowserContext,
    navigator: SearchNavigator,
    scraper: ListingScraper,
    pagination: PaginationController,
    human: HumanMotionController,
    selectors: SelectorSection,
}

impl BrowserJobSource {
    pub fn new(context: BrowserContext, config: &BrowserConfig, max_pages: u32) -> Self {
        Self {
            navigator: SearchNavigator::new(config.session.clone(), config.selectors.clone()),
            scraper: ListingScraper::new(config.selectors.clone(), config.scroll.clone()),
            pagination: PaginationController::new(config.pagination.clone(), max_pages),
            human: HumanMotionController::new(config.human_simulation.clone()),
            selectors: config.selectors.clone(),
            context,
        }
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }
}

#[async_trait(?Send)]
impl JobSource for BrowserJobSource {
    async fn open_search(&mut self, query: &str) -> BrowserResult<()> {
        self.navigator.open_search(&self.context, query).await
    }

    async fn current_listings(&mut self) -> BrowserResult<Vec<ListingSummary>> {
        self.navigator.page_listings(&self.context).await
    }

    async fn scrape_detail(&mut self, summary: &ListingSummary) -> BrowserResult<ListingDetail> {
        self.scraper
            .scrape(&self.context, &mut self.human, summary)
            .await
    }

    async fn next_page(&mut self) -> BrowserResult<Option<u32>> {
        let mut pager = BrowserPager::new(&self.context, &self.selectors);
        match self.pagination.advance(&mut pager).await? {
            Some(page) => {
                self.context
                    .wait_for_element(&self.selectors.results_list)
                    .await?;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }
}
