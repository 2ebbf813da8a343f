//! Numbered-page pagination. Exhaustion is only declared after re-probing
//! the pagination affordance, so a page that has not finished rendering is
//! not mistaken for the last one.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::{PaginationSection, SelectorSection};

use super::automation::BrowserContext;
use super::error::BrowserResult;
use super::escape_js;

/// Read/advance access to the pagination affordance of the current page.
#[async_trait(?Send)]
pub trait PageProber {
    /// Page number the affordance reports as current, if any.
    async fn current_page(&mut self) -> BrowserResult<Option<u32>>;
    /// Clicks the button for the given page number. False when no such
    /// button is present.
    async fn goto_page(&mut self, page: u32) -> BrowserResult<bool>;
    /// Gives the page time to re-render.
    async fn settle(&mut self, wait_ms: u64) -> BrowserResult<()>;
}

#[derive(Debug)]
pub struct PaginationController {
    config: PaginationSection,
    max_pages: u32,
    pages_visited: u32,
}

impl PaginationController {
    pub fn new(config: PaginationSection, max_pages: u32) -> Self {
        Self {
            config,
            max_pages: max_pages.max(1),
            pages_visited: 1,
        }
    }

    pub fn pages_visited(&self) -> u32 {
        self.pages_visited
    }

    /// Moves to the next numbered page. Returns the new page number, or
    /// None when the result set is exhausted or the page cap is reached.
    pub async fn advance<P: PageProber + ?Sized>(
        &mut self,
        prober: &mut P,
    ) -> BrowserResult<Option<u32>> {
        if self.pages_visited >= self.max_pages {
            debug!(max_pages = self.max_pages, "page cap reached");
            return Ok(None);
        }

        let current = prober.current_page().await?.unwrap_or(1);
        let target = current + 1;
        let mut reprobes = 0u32;
        loop {
            if prober.goto_page(target).await? {
                prober.settle(self.config.render_wait_ms).await?;
                self.pages_visited += 1;
                debug!(page = target, "advanced to next result page");
                return Ok(Some(target));
            }
            if reprobes >= self.config.reprobe_attempts {
                debug!(page = target, reprobes, "no further page button, result set exhausted");
                return Ok(None);
            }
            reprobes += 1;
            trace!(page = target, reprobes, "next page button absent, re-probing");
            prober.settle(self.config.reprobe_delay_ms).await?;
        }
    }
}

/// CDP-backed prober over the live pagination controls.
pub struct BrowserPager<'a> {
    context: &'a BrowserContext,
    selectors: &'a SelectorSection,
}

impl<'a> BrowserPager<'a> {
    pub fn new(context: &'a BrowserContext, selectors: &'a SelectorSection) -> Self {
        Self { context, selectors }
    }

    fn current_page_script(&self) -> String {
        format!(
            r#"
(() => {{
    const el = document.querySelector('{current}');
    if (!el || !el.textContent) return null;
    const parsed = parseInt(el.textContent.trim(), 10);
    return Number.isFinite(parsed) ? parsed : null;
}})()
"#,
            current = escape_js(&self.selectors.pagination_current),
        )
    }

    fn click_page_script(&self, page: u32) -> String {
        format!(
            r#"
(() => {{
    const buttons = Array.from(document.querySelectorAll('{buttons}'));
    const target = buttons.find(btn => (btn.textContent || '').trim() === '{page}');
    if (!target) return false;
    target.click();
    return true;
}})()
"#,
            buttons = escape_js(&self.selectors.pagination_buttons),
            page = page,
        )
    }
}

#[async_trait(?Send)]
impl PageProber for BrowserPager<'_> {
    async fn current_page(&mut self) -> BrowserResult<Option<u32>> {
        self.context.evaluate_json(&self.current_page_script()).await
    }

    async fn goto_page(&mut self, page: u32) -> BrowserResult<bool> {
        self.context.evaluate_json(&self.click_page_script(page)).await
    }

    async fn settle(&mut self, wait_ms: u64) -> BrowserResult<()> {
        sleep(Duration::from_millis(wait_ms)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockProber {
        current: u32,
        click_responses: VecDeque<bool>,
        clicks: Vec<u32>,
        settles: Vec<u64>,
    }

    impl MockProber {
        fn new(current: u32, click_responses: Vec<bool>) -> Self {
            Self {
                current,
                click_responses: click_responses.into(),
                clicks: Vec::new(),
                settles: Vec::new(),
            }
        }
    }

    #[async_trait(?Send)]
    impl PageProber for MockProber {
        async fn current_page(&mut self) -> BrowserResult<Option<u32>> {
            Ok(Some(self.current))
        }

        async fn goto_page(&mut self, page: u32) -> BrowserResult<bool> {
            self.clicks.push(page);
            let advanced = self.click_responses.pop_front().unwrap_or(false);
            if advanced {
                self.current = page;
            }
            Ok(advanced)
        }

        async fn settle(&mut self, wait_ms: u64) -> BrowserResult<()> {
            self.settles.push(wait_ms);
            Ok(())
        }
    }

    fn section() -> PaginationSection {
        PaginationSection {
            reprobe_attempts: 2,
            reprobe_delay_ms: 10,
            render_wait_ms: 5,
        }
    }

    #[tokio::test]
    async fn advances_to_the_next_numbered_page() {
        let mut prober = MockProber::new(1, vec![true]);
        let mut controller = PaginationController::new(section(), 10);
        let advanced = controller.advance(&mut prober).await.unwrap();
        assert_eq!(advanced, Some(2));
        assert_eq!(prober.clicks, vec![2]);
        assert_eq!(controller.pages_visited(), 2);
    }

    #[tokio::test]
    async fn stops_at_the_page_cap_without_probing() {
        let mut prober = MockProber::new(1, vec![true, true, true, true]);
        let mut controller = PaginationController::new(section(), 3);
        assert_eq!(controller.advance(&mut prober).await.unwrap(), Some(2));
        assert_eq!(controller.advance(&mut prober).await.unwrap(), Some(3));
        assert_eq!(controller.advance(&mut prober).await.unwrap(), None);
        // The cap check runs before the affordance is touched again.
        assert_eq!(prober.clicks, vec![2, 3]);
    }

    #[tokio::test]
    async fn reprobes_before_concluding_exhaustion() {
        // Button missing on the first probe, present on the second: a slow
        // re-render must not read as the last page.
        let mut prober = MockProber::new(3, vec![false, true]);
        let mut controller = PaginationController::new(section(), 10);
        let advanced = controller.advance(&mut prober).await.unwrap();
        assert_eq!(advanced, Some(4));
        assert_eq!(prober.clicks, vec![4, 4]);
        assert_eq!(prober.settles, vec![10, 5]);
    }

    #[tokio::test]
    async fn exhaustion_after_all_reprobes_fail() {
        let mut prober = MockProber::new(7, vec![false, false, false]);
        let mut controller = PaginationController::new(section(), 10);
        let advanced = controller.advance(&mut prober).await.unwrap();
        assert_eq!(advanced, None);
        assert_eq!(prober.clicks.len(), 3);
        assert_eq!(controller.pages_visited(), 1);
    }

    #[tokio::test]
    async fn missing_current_indicator_defaults_to_page_one() {
        struct NoCurrent(Vec<u32>);

        #[async_trait(?Send)]
        impl PageProber for NoCurrent {
            async fn current_page(&mut self) -> BrowserResult<Option<u32>> {
                Ok(None)
            }
            async fn goto_page(&mut self, page: u32) -> BrowserResult<bool> {
                self.0.push(page);
                Ok(true)
            }
            async fn settle(&mut self, _wait_ms: u64) -> BrowserResult<()> {
                Ok(())
            }
        }

        let mut prober = NoCurrent(Vec::new());
        let mut controller = PaginationController::new(section(), 10);
        assert_eq!(controller.advance(&mut prober).await.unwrap(), Some(2));
        assert_eq!(prober.0, vec![2]);
    }
}
