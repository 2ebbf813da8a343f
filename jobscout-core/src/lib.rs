pub mod airtable;
pub mod browser;
pub mod config;
pub mod error;
pub mod harvest;
pub mod ledger;
pub mod qualify;
pub mod record;
mod sqlite;

pub use airtable::{AirtableClient, AirtableError, PushRetryPolicy};
pub use config::{
    load_browser_config, load_jobscout_config, BrowserConfig, ConfigBundle, JobscoutConfig,
};
pub use error::{ConfigError, Result};
pub use harvest::{DedupLedger, HarvestConfig, HarvestLoop, HarvestStats, JobSource, RecordSink};
pub use ledger::{LedgerEntry, LedgerError, SqliteLedger, SqliteLedgerBuilder};
pub use qualify::{QualificationBlock, QualificationParser};
pub use record::{JobRecord, ListingDetail, ListingSummary};
