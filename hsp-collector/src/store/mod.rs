//! Persistence for collected records.
//!
//! The collector only needs to write records, ask how many exist for a
//! task's exact window, and remember which windows were fetched. Anything
//! implementing [`Persistence`] can back a run; [`SqliteStore`] is used in
//! production and [`MemoryStore`] in tests.

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DateWindow, DayType, ServiceRecord, TaskKey};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("store used before prepare() was called")]
    NotPrepared,

    #[error("corrupt stored value in {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

/// A successful `serviceMetrics` fetch, kept so that empty windows are not
/// requested again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLogEntry {
    pub key: TaskKey,
    /// Services HSP returned for the window.
    pub services: u64,
    /// Records that passed validation and were saved.
    pub records: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Storage used by the collector.
pub trait Persistence {
    /// Make the store ready for a run (create schema and the like).
    ///
    /// Called once at the start of every run; must be idempotent.
    fn prepare(&mut self) -> Result<(), StoreError>;

    /// Insert or replace records, keyed by `(route, rid)`.
    ///
    /// Returns the number of records written.
    fn save(&mut self, records: &[ServiceRecord]) -> Result<u64, StoreError>;

    /// Records stored for `route` whose service date lies inside `window`
    /// and runs on `day_type`.
    fn query_coverage(
        &self,
        route: &str,
        window: DateWindow,
        day_type: DayType,
    ) -> Result<u64, StoreError>;

    /// Remember a successful fetch. Replaces any earlier entry for the key.
    fn record_fetch(&mut self, entry: &FetchLogEntry) -> Result<(), StoreError>;

    /// The fetch-log entry for exactly this task, if any.
    fn fetch_entry(&self, key: &TaskKey) -> Result<Option<FetchLogEntry>, StoreError>;

    /// Number of distinct service dates stored for `route`.
    fn distinct_dates(&self, route: &str) -> Result<u64, StoreError>;

    /// Total records held across all routes.
    fn total_records(&self) -> Result<u64, StoreError>;
}
