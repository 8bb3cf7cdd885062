//! Run statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{TaskOutcome, TaskStatus};

use super::state_file::write_json_atomic;

/// Per-route counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStats {
    pub tasks: u64,
    pub completed: u64,
    pub skipped: u64,
    pub no_data: u64,
    pub errors: u64,
    pub records: u64,
}

impl RouteStats {
    fn add(&mut self, outcome: &TaskOutcome) {
        self.tasks += 1;
        self.records += outcome.records_saved;
        match outcome.status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::NoData => self.no_data += 1,
            TaskStatus::Error => self.errors += 1,
        }
    }

    fn merge(&mut self, other: &RouteStats) {
        self.tasks += other.tasks;
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.no_data += other.no_data;
        self.errors += other.errors;
        self.records += other.records;
    }
}

/// Everything a run did, written to the statistics file when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub routes: BTreeMap<String, RouteStats>,
    pub totals: RouteStats,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            elapsed_secs: 0.0,
            cancelled: false,
            routes: BTreeMap::new(),
            totals: RouteStats::default(),
        }
    }

    pub fn record(&mut self, route: &str, outcome: &TaskOutcome) {
        self.routes.entry(route.to_string()).or_default().add(outcome);
        self.totals.add(outcome);
    }

    pub fn route(&self, route: &str) -> Option<&RouteStats> {
        self.routes.get(route)
    }

    /// Stamp the end time and recompute totals.
    pub fn finish(&mut self, cancelled: bool) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.elapsed_secs = (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.cancelled = cancelled;

        let mut totals = RouteStats::default();
        for stats in self.routes.values() {
            totals.merge(stats);
        }
        self.totals = totals;
    }

    /// Tasks that ended with `status`.
    pub fn count(&self, status: TaskStatus) -> u64 {
        match status {
            TaskStatus::Completed => self.totals.completed,
            TaskStatus::Skipped => self.totals.skipped,
            TaskStatus::NoData => self.totals.no_data,
            TaskStatus::Error => self.totals.errors,
        }
    }

    /// Percentage of tasks skipped, `100.0` when there were no tasks.
    pub fn skip_rate(&self) -> f64 {
        if self.totals.tasks == 0 {
            return 100.0;
        }
        self.totals.skipped as f64 * 100.0 / self.totals.tasks as f64
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        write_json_atomic(path, self)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>6} {:>6} {:>6} {:>7} {:>6} {:>8}",
            "route", "tasks", "done", "skip", "nodata", "error", "records"
        )?;
        for (name, s) in &self.routes {
            writeln!(
                f,
                "{:<24} {:>6} {:>6} {:>6} {:>7} {:>6} {:>8}",
                name, s.tasks, s.completed, s.skipped, s.no_data, s.errors, s.records
            )?;
        }
        let t = &self.totals;
        write!(
            f,
            "{:<24} {:>6} {:>6} {:>6} {:>7} {:>6} {:>8}  ({:.1}s)",
            "TOTAL", t.tasks, t.completed, t.skipped, t.no_data, t.errors, t.records, self.elapsed_secs
        )
    }
}
