//! In-memory persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::{DateWindow, DayType, ServiceRecord, TaskKey};

use super::{FetchLogEntry, Persistence, StoreError};

/// A [`Persistence`] backend that keeps everything in memory.
///
/// Used by tests and by `--dry-run` planning when no database exists yet.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<(String, String), ServiceRecord>,
    fetch_log: HashMap<TaskKey, FetchLogEntry>,
    prepared: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records for a route, ordered by RID.
    pub fn records_for(&self, route: &str) -> Vec<&ServiceRecord> {
        self.records
            .iter()
            .filter(|((r, _), _)| r == route)
            .map(|(_, record)| record)
            .collect()
    }

    fn check_prepared(&self) -> Result<(), StoreError> {
        if self.prepared {
            Ok(())
        } else {
            Err(StoreError::NotPrepared)
        }
    }
}

impl Persistence for MemoryStore {
    fn prepare(&mut self) -> Result<(), StoreError> {
        self.prepared = true;
        Ok(())
    }

    fn save(&mut self, records: &[ServiceRecord]) -> Result<u64, StoreError> {
        self.check_prepared()?;
        for record in records {
            self.records
                .insert((record.route.clone(), record.rid.clone()), record.clone());
        }
        Ok(records.len() as u64)
    }

    fn query_coverage(
        &self,
        route: &str,
        window: DateWindow,
        day_type: DayType,
    ) -> Result<u64, StoreError> {
        self.check_prepared()?;
        let count = self
            .records
            .values()
            .filter(|r| {
                r.route == route && r.day_type == day_type && window.contains(r.date_of_service)
            })
            .count();
        Ok(count as u64)
    }

    fn record_fetch(&mut self, entry: &FetchLogEntry) -> Result<(), StoreError> {
        self.check_prepared()?;
        self.fetch_log.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn fetch_entry(&self, key: &TaskKey) -> Result<Option<FetchLogEntry>, StoreError> {
        self.check_prepared()?;
        Ok(self.fetch_log.get(key).cloned())
    }

    fn distinct_dates(&self, route: &str) -> Result<u64, StoreError> {
        self.check_prepared()?;
        let dates: BTreeSet<_> = self
            .records
            .values()
            .filter(|r| r.route == route)
            .map(|r| r.date_of_service)
            .collect();
        Ok(dates.len() as u64)
    }

    fn total_records(&self) -> Result<u64, StoreError> {
        self.check_prepared()?;
        Ok(self.records.len() as u64)
    }
}
