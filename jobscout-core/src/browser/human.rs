use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::ThreadRng;
use rand::{thread_rng, Rng};
use tokio::time::sleep;

use chromiumoxide::element::Element;

use crate::config::HumanSimulationSection;

use super::error::{BrowserError, BrowserResult};

/// Paces interaction with the page: typing cadence, click hesitation, and
/// idle pauses drawn from the configured ranges.
#[derive(Debug)]
pub struct HumanMotionController {
    config: HumanSimulationSection,
    rng: ThreadRng,
}

impl HumanMotionController {
    pub fn new(config: HumanSimulationSection) -> Self {
        Self {
            config,
            rng: thread_rng(),
        }
    }

    pub async fn idle(&mut self) -> BrowserResult<()> {
        let delay = self.random_duration(self.config.idle_duration_ms);
        sleep(delay).await;
        Ok(())
    }

    pub async fn click_element(&mut self, element: &Element) -> BrowserResult<()> {
        let hesitation = self.random_duration(self.config.click_hesitation_ms);
        sleep(hesitation).await;
        element
            .click()
            .await
            .map_err(|err| BrowserError::Unexpected(format!("failed to click element: {err}")))?;
        Ok(())
    }

    pub async fn type_text(&mut self, element: &Element, text: &str) -> BrowserResult<()> {
        element.click().await.map_err(|err| {
            BrowserError::Unexpected(format!("failed to focus element before typing: {err}"))
        })?;
        for ch in text.chars() {
            element.type_str(ch.to_string()).await.map_err(|err| {
                BrowserError::Unexpected(format!("failed to type character: {err}"))
            })?;
            let delay = self.typing_delay();
            sleep(delay).await;
        }
        Ok(())
    }

    pub async fn pause_for_scroll(&mut self) {
        let delay = self.random_duration(self.config.scroll_pause_ms);
        sleep(delay).await;
    }

    fn typing_delay(&mut self) -> Duration {
        let cadence_range = RangeInclusive::new(
            self.config.typing_cadence_cpm[0],
            self.config.typing_cadence_cpm[1],
        );
        let cadence = self.rng.gen_range(cadence_range).max(60) as f64;
        let chars_per_second = cadence / 60.0;
        let base_delay = 1.0 / chars_per_second;
        let jitter_range = RangeInclusive::new(
            self.config.typing_jitter_ms[0],
            self.config.typing_jitter_ms[1],
        );
        let jitter_ms = self.rng.gen_range(jitter_range);
        Duration::from_secs_f64(base_delay + jitter_ms as f64 / 1000.0)
    }

    fn random_duration(&mut self, bounds: [u32; 2]) -> Duration {
        let lower = bounds[0].min(bounds[1]);
        let upper = bounds[0].max(bounds[1]);
        let ms = self.rng.gen_range(lower..=upper) as u64;
        Duration::from_millis(ms)
    }
}
