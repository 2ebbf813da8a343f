use clap::Args;

/// Runs the harvest loop for one search query.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Search term; defaults to search.query from the config
    #[arg(short, long)]
    pub query: Option<String>,

    /// Cap on result pages visited during the run
    #[arg(short = 'p', long)]
    pub max_pages: Option<u32>,

    /// Cap on records scraped during the run
    #[arg(short = 'm', long)]
    pub max_records: Option<usize>,

    /// Scrape and parse without writing to Airtable or the ledger
    #[arg(long)]
    pub dry_run: bool,

    /// Show the browser window during the run
    #[arg(long)]
    pub headful: bool,
}
