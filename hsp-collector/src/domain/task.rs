//! Units of collection work and their outcomes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{DateWindow, DayType, Route};

/// One `serviceMetrics` request: a route, a ≤7-day window and a day type.
///
/// Tasks are rebuilt from configuration on every run; they are never
/// persisted or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Task {
    pub route: Arc<Route>,
    pub window: DateWindow,
    pub day_type: DayType,
}

impl Task {
    pub fn new(route: Arc<Route>, window: DateWindow, day_type: DayType) -> Self {
        Self {
            route,
            window,
            day_type,
        }
    }

    /// The stable identity of this task, used as the fetch-log key.
    pub fn key(&self) -> TaskKey {
        TaskKey {
            route: self.route.name.clone(),
            window: self.window,
            day_type: self.day_type,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.route.name, self.window, self.day_type)
    }
}

/// Owned `(route, window, day type)` identity of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub route: String,
    pub window: DateWindow,
    pub day_type: DayType,
}

/// Terminal state of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Existing data already satisfies the task; nothing was requested.
    Skipped,
    /// Fetched and at least one record was saved.
    Completed,
    /// Fetched successfully but upstream had no usable services.
    NoData,
    /// Fetching or saving failed after retries.
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Skipped => "SKIPPED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::NoData => "NO_DATA",
            TaskStatus::Error => "ERROR",
        })
    }
}

/// What happened when a task was attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub records_saved: u64,
    pub elapsed: Duration,
    /// Error message when `status` is [`TaskStatus::Error`].
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn skipped(elapsed: Duration) -> Self {
        Self {
            status: TaskStatus::Skipped,
            records_saved: 0,
            elapsed,
            error: None,
        }
    }

    /// A successful fetch; `NoData` when nothing was saved.
    pub fn fetched(records_saved: u64, elapsed: Duration) -> Self {
        let status = if records_saved == 0 {
            TaskStatus::NoData
        } else {
            TaskStatus::Completed
        };
        Self {
            status,
            records_saved,
            elapsed,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: TaskStatus::Error,
            records_saved: 0,
            elapsed,
            error: Some(error.into()),
        }
    }
}
