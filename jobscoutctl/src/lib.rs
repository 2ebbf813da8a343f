use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jobscout_core::browser::{
    BrowserAutomation, BrowserJobSource, BrowserLauncher, Credentials, HumanMotionController,
    LaunchOverrides, SessionManager,
};
use jobscout_core::harvest::{DedupLedger, HarvestConfig, HarvestLoop, RecordSink};
use jobscout_core::ledger::{LedgerEntry, SqliteLedger};
use jobscout_core::{
    load_browser_config, load_jobscout_config, AirtableClient, ConfigBundle, HarvestStats,
};

mod commands;

pub use commands::{LedgerShowArgs, LoginArgs, RunArgs};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] jobscout_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("browser error: {0}")]
    Browser(#[from] jobscout_core::browser::BrowserError),
    #[error("ledger error: {0}")]
    Ledger(#[from] jobscout_core::LedgerError),
    #[error("persistence error: {0}")]
    Airtable(#[from] jobscout_core::AirtableError),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "LinkedIn job harvester control interface", long_about = None)]
pub struct Cli {
    /// Path to the main jobscout.toml
    #[arg(long, default_value = "configs/jobscout.toml")]
    pub config: PathBuf,
    /// Alternate path for browser.toml
    #[arg(long)]
    pub browser_config: Option<PathBuf>,
    /// Data directory override (replaces paths.data_dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Alternate path for the session token file
    #[arg(long)]
    pub session_file: Option<PathBuf>,
    /// Alternate path for ledger.sqlite
    #[arg(long)]
    pub ledger_db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Logs into the job site interactively and saves the session token
    Login(LoginArgs),
    /// Runs the harvest loop for a search query
    Run(RunArgs),
    /// Operations on the local push ledger
    #[command(subcommand)]
    Ledger(LedgerCommands),
    /// Executes basic integrity checks
    #[command(name = "health")]
    Health,
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// Lists recently pushed listings
    Show(LedgerShowArgs),
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Login(args) => {
            let report = context.login(args)?;
            render(&report, cli.format)?;
        }
        Commands::Run(args) => {
            let stats = context.harvest(args)?;
            render(&stats, cli.format)?;
        }
        Commands::Ledger(LedgerCommands::Show(args)) => {
            let list = context.ledger_show(args)?;
            render(&list, cli.format)?;
        }
        Commands::Health => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    bundle: ConfigBundle,
    config_path: PathBuf,
    browser_path: PathBuf,
    data_dir: PathBuf,
    session_file: PathBuf,
    ledger_db: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let jobscout = load_jobscout_config(&config_path)?;

        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let browser_path = cli
            .browser_config
            .clone()
            .unwrap_or_else(|| config_dir.join("browser.toml"));
        let browser = load_browser_config(&browser_path)?;

        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(|| jobscout.resolve_path(&jobscout.paths.data_dir));
        let session_file = cli
            .session_file
            .clone()
            .unwrap_or_else(|| jobscout.resolve_path(&jobscout.paths.session_file));
        let ledger_db = cli
            .ledger_db
            .clone()
            .unwrap_or_else(|| jobscout.resolve_path(&jobscout.paths.ledger_db));

        let bundle = ConfigBundle { jobscout, browser };

        Ok(Self {
            bundle,
            config_path,
            browser_path,
            data_dir,
            session_file,
            ledger_db,
        })
    }

    fn browser_launcher(&self) -> BrowserLauncher {
        BrowserLauncher::new(
            self.bundle.browser.clone(),
            self.data_dir.join("browser-profile"),
        )
    }

    fn session_manager(&self) -> SessionManager {
        SessionManager::new(self.session_file.clone(), self.bundle.browser.session.clone())
    }

    fn login(&self, args: &LoginArgs) -> Result<LoginReport> {
        let credentials = Credentials::from_env().ok_or_else(|| {
            AppError::MissingResource("JOBSCOUT_EMAIL / JOBSCOUT_PASSWORD not set".to_string())
        })?;
        let runtime = runtime()?;
        runtime.block_on(async {
            let launcher = self.browser_launcher();
            let automation = launcher
                .launch_with_overrides(LaunchOverrides {
                    headless: Some(args.headless),
                })
                .await?;
            let outcome = self.drive_login(&automation, &credentials).await;
            let shutdown = automation.shutdown().await;
            let report = outcome?;
            shutdown?;
            Ok(report)
        })
    }

    async fn drive_login(
        &self,
        automation: &BrowserAutomation,
        credentials: &Credentials,
    ) -> Result<LoginReport> {
        let context = automation.new_context().await?;
        let mut human = HumanMotionController::new(self.bundle.browser.human_simulation.clone());
        let manager = self.session_manager();
        manager.login(&context, &mut human, credentials).await?;
        Ok(LoginReport {
            status: "ok".to_string(),
            session_file: manager.token_path().display().to_string(),
        })
    }

    fn harvest(&self, args: &RunArgs) -> Result<HarvestStats> {
        let search = &self.bundle.jobscout.search;
        let query = args.query.clone().unwrap_or_else(|| search.query.clone());
        let max_pages = args.max_pages.unwrap_or(search.max_pages);
        let max_records = args.max_records.unwrap_or(search.max_records);

        let api_key = std::env::var("JOBSCOUT_AIRTABLE_KEY").unwrap_or_default();
        if api_key.is_empty() && !args.dry_run {
            return Err(AppError::MissingResource(
                "JOBSCOUT_AIRTABLE_KEY not set (use --dry-run to scrape without persisting)"
                    .to_string(),
            ));
        }

        let ledger = SqliteLedger::new(&self.ledger_db)?;
        ledger.initialize()?;
        let sink = AirtableClient::new(
            &self.bundle.jobscout.airtable,
            self.bundle.jobscout.push_retry.clone(),
            api_key,
        )?;

        let config = HarvestConfig {
            query,
            max_records,
            listing_delay_ms: (search.listing_delay_ms[0], search.listing_delay_ms[1]),
            stop_on_first_error: search.stop_on_first_error,
            dry_run: args.dry_run,
        };

        let runtime = runtime()?;
        runtime.block_on(async {
            let launcher = self.browser_launcher();
            let overrides = LaunchOverrides {
                headless: if args.headful { Some(false) } else { None },
            };
            let automation = launcher.launch_with_overrides(overrides).await?;
            let outcome = self
                .drive_harvest(&automation, max_pages, config, sink, ledger)
                .await;
            let shutdown = automation.shutdown().await;
            let stats = outcome?;
            shutdown?;
            Ok(stats)
        })
    }

    async fn drive_harvest(
        &self,
        automation: &BrowserAutomation,
        max_pages: u32,
        config: HarvestConfig,
        sink: AirtableClient,
        ledger: SqliteLedger,
    ) -> Result<HarvestStats> {
        let context = automation.new_context().await?;
        let manager = self.session_manager();
        if !manager.restore(&context).await? {
            info!("no saved session found, logging in first");
            let credentials = Credentials::from_env().ok_or_else(|| {
                AppError::MissingResource(
                    "no saved session and JOBSCOUT_EMAIL / JOBSCOUT_PASSWORD not set; \
                     run `jobscoutctl login` first"
                        .to_string(),
                )
            })?;
            let mut human =
                HumanMotionController::new(self.bundle.browser.human_simulation.clone());
            manager.login(&context, &mut human, &credentials).await?;
        }

        let source = BrowserJobSource::new(context, &self.bundle.browser, max_pages);
        let mut harvest = HarvestLoop::new(
            Box::new(source),
            Arc::new(sink) as Arc<dyn RecordSink>,
            Arc::new(ledger) as Arc<dyn DedupLedger>,
            config,
        );
        Ok(harvest.run().await?)
    }

    fn ledger_show(&self, args: &LedgerShowArgs) -> Result<LedgerList> {
        if !self.ledger_db.exists() {
            return Err(AppError::MissingResource(format!(
                "ledger database missing: {}",
                self.ledger_db.display()
            )));
        }
        let ledger = SqliteLedger::builder()
            .path(&self.ledger_db)
            .read_only(true)
            .build()?;
        let rows = ledger.recent(args.limit)?;
        Ok(LedgerList { rows })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(self.check_path("jobscout.toml", &self.config_path));
        results.push(self.check_path("browser.toml", &self.browser_path));
        results.push(self.check_optional_path(
            "chromium",
            Path::new(&self.bundle.browser.chromium.executable_path),
        ));
        results.push(self.check_directory("data dir", &self.data_dir));
        results.push(self.check_optional_path("session token", &self.session_file));
        results.push(self.check_database("ledger.sqlite", &self.ledger_db));
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} missing", path = path.display()))
        }
    }

    fn check_optional_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::warn(name, format!("{path} not found", path = path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::warn(
                name,
                format!("{path} is not a directory", path = path.display()),
            ),
            Err(_) => HealthEntry::warn(name, format!("{path} not found", path = path.display())),
        }
    }

    fn check_database(&self, name: &str, path: &Path) -> HealthEntry {
        if !path.exists() {
            return HealthEntry::warn(name, format!("{path} not found", path = path.display()));
        }
        match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
            Ok(conn) => {
                let pragma: rusqlite::Result<String> =
                    conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
                match pragma {
                    Ok(result) if result.to_lowercase() == "ok" => {
                        HealthEntry::ok(name, "integrity ok".to_string())
                    }
                    Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                    Err(err) => HealthEntry::warn(name, format!("error: {err}")),
                }
            }
            Err(err) => HealthEntry::error(name, format!("failed to open: {err}")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginReport {
    pub status: String,
    pub session_file: String,
}

impl DisplayFallback for LoginReport {
    fn display(&self) -> String {
        format!("login {}: session saved to {}", self.status, self.session_file)
    }
}

impl DisplayFallback for HarvestStats {
    fn display(&self) -> String {
        let mut lines = vec![
            format!(
                "{run} (query: {query}{mode})",
                run = self.run_id,
                query = self.query,
                mode = if self.dry_run { ", dry-run" } else { "" }
            ),
            format!(
                "  pages: {} | seen: {} | pushed: {} | duplicates: {} | skipped: {}",
                self.pages_visited,
                self.listings_seen,
                self.records_pushed,
                self.duplicates_skipped,
                self.listings_skipped
            ),
            format!(
                "  waited: {:.1} s | took: {} s",
                self.total_wait_ms as f64 / 1000.0,
                self.duration_secs
            ),
        ];
        if !self.errors.is_empty() {
            lines.push("  errors:".to_string());
            for error in &self.errors {
                lines.push(format!("    - {error}"));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct LedgerList {
    pub rows: Vec<LedgerEntry>,
}

impl DisplayFallback for LedgerList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "ledger is empty".to_string();
        }
        let mut lines = Vec::new();
        for entry in &self.rows {
            lines.push(format!(
                "{key} | {title} @ {org} | record={record} | pushed={pushed}",
                key = entry.listing_key,
                title = entry.title.as_deref().unwrap_or("<untitled>"),
                org = entry.organization.as_deref().unwrap_or("-"),
                record = entry.airtable_record_id.as_deref().unwrap_or("-"),
                pushed = entry.pushed_at.as_deref().unwrap_or("-"),
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in self {
            lines.push(format!(
                "[{status}] {name}: {detail}",
                status = entry.status,
                name = entry.name,
                detail = entry.detail
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobscout_core::qualify::QualificationBlock;
    use jobscout_core::record::ListingDetail;
    use jobscout_core::JobRecord;
    use tempfile::TempDir;

    fn prepare_test_context() -> Result<(TempDir, AppContext)> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy("../configs/jobscout.toml", configs_dir.join("jobscout.toml")).unwrap();
        fs::copy("../configs/browser.toml", configs_dir.join("browser.toml")).unwrap();

        let data_dir = root.join("data");
        fs::create_dir_all(&data_dir).unwrap();

        let cli = Cli {
            config: configs_dir.join("jobscout.toml"),
            browser_config: None,
            data_dir: Some(data_dir.clone()),
            session_file: Some(data_dir.join("session.json")),
            ledger_db: Some(data_dir.join("ledger.sqlite")),
            format: OutputFormat::Json,
            command: Commands::Health,
        };

        let context = AppContext::new(&cli)?;
        Ok((temp, context))
    }

    fn seeded_record() -> JobRecord {
        JobRecord::from_detail(
            ListingDetail {
                title: "Data Analyst".into(),
                organization: "Acme".into(),
                location: "Remote".into(),
                posted_date: None,
                salary: None,
                description: "n/a".into(),
                url: Some("https://www.linkedin.com/jobs/view/987654".into()),
            },
            QualificationBlock::default(),
        )
    }

    #[test]
    fn health_check_flags_nothing_fatal_on_fresh_context() {
        let (_temp, context) = prepare_test_context().unwrap();
        let report = context.health_check();
        assert!(report
            .iter()
            .filter(|entry| entry.name != "chromium")
            .all(|entry| !matches!(entry.status, CheckStatus::Error)));
        assert!(report
            .iter()
            .any(|entry| entry.name == "session token"
                && matches!(entry.status, CheckStatus::Warn)));
    }

    #[test]
    fn ledger_show_reads_seeded_rows() {
        let (_temp, context) = prepare_test_context().unwrap();
        let ledger = SqliteLedger::new(&context.ledger_db).unwrap();
        ledger.initialize().unwrap();
        ledger.record_push(&seeded_record(), "recXYZ").unwrap();

        let list = context.ledger_show(&LedgerShowArgs { limit: 10 }).unwrap();
        assert_eq!(list.rows.len(), 1);
        assert_eq!(list.rows[0].listing_key, "987654");
        assert_eq!(list.rows[0].airtable_record_id.as_deref(), Some("recXYZ"));
        assert!(list.display().contains("Data Analyst"));
    }

    #[test]
    fn ledger_show_without_database_is_a_missing_resource() {
        let (_temp, context) = prepare_test_context().unwrap();
        let result = context.ledger_show(&LedgerShowArgs { limit: 10 });
        assert!(matches!(result, Err(AppError::MissingResource(_))));
    }

    #[test]
    fn harvest_without_api_key_and_without_dry_run_is_rejected() {
        let (_temp, context) = prepare_test_context().unwrap();
        std::env::remove_var("JOBSCOUT_AIRTABLE_KEY");
        let args = RunArgs {
            query: None,
            max_pages: None,
            max_records: None,
            dry_run: false,
            headful: false,
        };
        let result = context.harvest(&args);
        assert!(matches!(result, Err(AppError::MissingResource(_))));
    }

    #[test]
    fn stats_render_mentions_errors() {
        let stats = HarvestStats {
            run_id: "run-test".into(),
            query: "Data Analyst".into(),
            errors: vec!["listing 3: element not found: card".into()],
            ..Default::default()
        };
        let text = stats.display();
        assert!(text.contains("run-test"));
        assert!(text.contains("listing 3"));
    }
}
