use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobscoutConfig {
    pub search: SearchSection,
    pub paths: PathsSection,
    pub airtable: AirtableSection,
    pub push_retry: PushRetrySection,
}

impl JobscoutConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    pub query: String,
    pub max_pages: u32,
    pub max_records: usize,
    pub listing_delay_ms: [u64; 2],
    pub stop_on_first_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub session_file: String,
    pub ledger_db: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AirtableSection {
    pub endpoint: String,
    pub base_id: String,
    pub table: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRetrySection {
    pub max_attempts: usize,
    pub backoff_ms: Vec<u64>,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
    pub user_agents: UserAgentSection,
    pub viewport: ViewportSection,
    pub human_simulation: HumanSimulationSection,
    pub timeouts: TimeoutSection,
    pub session: SessionSection,
    pub selectors: SelectorSection,
    pub scroll: ScrollSection,
    pub pagination: PaginationSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub tab_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub disable_automation_controlled: bool,
    pub disable_blink_features: Vec<String>,
    pub mute_audio: bool,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportSection {
    pub resolutions: Vec<[u32; 2]>,
    pub jitter_pixels: u32,
    pub device_scale_factor: [f32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct HumanSimulationSection {
    pub typing_cadence_cpm: [u32; 2],
    pub typing_jitter_ms: [u32; 2],
    pub click_hesitation_ms: [u32; 2],
    pub scroll_pause_ms: [u32; 2],
    pub idle_duration_ms: [u32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSection {
    pub navigation_seconds: u64,
    pub element_seconds: u64,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    pub login_url: String,
    pub jobs_url: String,
    pub email_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    pub authenticated_selector: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub results_list: String,
    pub listing_items: String,
    pub detail_card: String,
    pub job_title: String,
    pub org_name: String,
    pub location: String,
    pub posted_date: String,
    pub salary: String,
    pub description_container: String,
    pub pagination_current: String,
    pub pagination_buttons: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrollSection {
    pub increment_px: u32,
    pub settle_probes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationSection {
    pub reprobe_attempts: u32,
    pub reprobe_delay_ms: u64,
    pub render_wait_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ConfigBundle {
    pub jobscout: JobscoutConfig,
    pub browser: BrowserConfig,
}

impl ConfigBundle {
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let jobscout = load_jobscout_config(dir.join("jobscout.toml"))?;
        let browser = load_browser_config(dir.join("browser.toml"))?;
        Ok(Self { jobscout, browser })
    }
}

pub fn load_jobscout_config<P: AsRef<Path>>(path: P) -> Result<JobscoutConfig> {
    load_toml(path)
}

pub fn load_browser_config<P: AsRef<Path>>(path: P) -> Result<BrowserConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
