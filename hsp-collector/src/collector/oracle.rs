//! Deciding whether a task's data is already held.

use crate::domain::Task;
use crate::store::{Persistence, StoreError};

/// Answers "is this task already done?" from persistence alone.
///
/// A task is complete when at least `min_records` records exist for its
/// exact route, window and day type, or when the fetch log shows HSP
/// returned no services at all for that window. A logged fetch that
/// returned services never stands in for missing records. Records for
/// neighbouring windows or other day types never count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOracle {
    min_records: u64,
}

impl Default for CompletionOracle {
    fn default() -> Self {
        Self { min_records: 1 }
    }
}

impl CompletionOracle {
    /// `min_records` below 1 is raised to 1; an empty window is never
    /// complete on record count alone.
    pub fn new(min_records: u64) -> Self {
        Self {
            min_records: min_records.max(1),
        }
    }

    pub fn min_records(&self) -> u64 {
        self.min_records
    }

    pub fn is_complete<P: Persistence + ?Sized>(
        &self,
        store: &P,
        task: &Task,
    ) -> Result<bool, StoreError> {
        let held = store.query_coverage(&task.route.name, task.window, task.day_type)?;
        if held >= self.min_records {
            return Ok(true);
        }
        let fetched_empty = store
            .fetch_entry(&task.key())?
            .is_some_and(|entry| entry.services == 0);
        Ok(fetched_empty)
    }
}
