//! Cross-run dedup ledger. Every listing persisted to the tabular store is
//! recorded here by its stable listing key so a later run against the same
//! search query does not create duplicate records.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::record::JobRecord;
use crate::sqlite::configure_connection;

const LEDGER_SCHEMA: &str = include_str!("../../sql/ledger.sql");

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger path not configured")]
    MissingStore,
    #[error("failed to open ledger at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub listing_key: String,
    pub title: Option<String>,
    pub organization: Option<String>,
    pub airtable_record_id: Option<String>,
    pub pushed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SqliteLedgerBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteLedgerBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteLedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> LedgerResult<SqliteLedger> {
        let path = self.path.ok_or(LedgerError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteLedger { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteLedger {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteLedger {
    pub fn builder() -> SqliteLedgerBuilder {
        SqliteLedgerBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        SqliteLedgerBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> LedgerResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            LedgerError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| LedgerError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = self.open()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    pub fn contains(&self, listing_key: &str) -> LedgerResult<bool> {
        let conn = self.open()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT listing_key FROM pushed_listings WHERE listing_key = ?1",
                params![listing_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn record_push(&self, record: &JobRecord, airtable_record_id: &str) -> LedgerResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO pushed_listings \
             (listing_key, title, organization, airtable_record_id) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.listing_key,
                record.title,
                record.organization,
                airtable_record_id
            ],
        )?;
        Ok(())
    }

    pub fn recent(&self, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT listing_key, title, organization, airtable_record_id, pushed_at \
             FROM pushed_listings \
             ORDER BY pushed_at DESC \
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(LedgerEntry {
                    listing_key: row.get(0)?,
                    title: row.get(1)?,
                    organization: row.get(2)?,
                    airtable_record_id: row.get(3)?,
                    pushed_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> LedgerResult<i64> {
        let conn = self.open()?;
        let count = conn.query_row("SELECT COUNT(*) FROM pushed_listings", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualify::QualificationBlock;
    use crate::record::ListingDetail;
    use tempfile::tempdir;

    fn sample_record(key_url: &str) -> JobRecord {
        JobRecord::from_detail(
            ListingDetail {
                title: "Data Analyst".into(),
                organization: "Acme".into(),
                location: "Remote".into(),
                posted_date: None,
                salary: None,
                description: "n/a".into(),
                url: Some(key_url.to_string()),
            },
            QualificationBlock::default(),
        )
    }

    #[test]
    fn record_push_then_contains() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::new(dir.path().join("ledger.sqlite")).unwrap();
        ledger.initialize().unwrap();

        let record = sample_record("https://www.linkedin.com/jobs/view/123456");
        assert!(!ledger.contains(&record.listing_key).unwrap());
        ledger.record_push(&record, "recABC").unwrap();
        assert!(ledger.contains(&record.listing_key).unwrap());
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[test]
    fn repeated_push_does_not_duplicate_rows() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::new(dir.path().join("ledger.sqlite")).unwrap();
        ledger.initialize().unwrap();

        let record = sample_record("https://www.linkedin.com/jobs/view/777");
        ledger.record_push(&record, "rec1").unwrap();
        ledger.record_push(&record, "rec2").unwrap();
        assert_eq!(ledger.count().unwrap(), 1);

        let entries = ledger.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].airtable_record_id.as_deref(), Some("rec2"));
    }

    #[test]
    fn initialize_creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::new(dir.path().join("nested/data/ledger.sqlite")).unwrap();
        ledger.initialize().unwrap();
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn builder_without_path_is_rejected() {
        let result = SqliteLedgerBuilder::new().build();
        assert!(matches!(result, Err(LedgerError::MissingStore)));
    }
}
