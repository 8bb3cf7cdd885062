//! Expansion of configuration into the task list.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{DateWindow, DayType, MAX_WINDOW_DAYS, Route, Task};

/// Error building the task space.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskSpaceError {
    #[error("date range starts {from} after it ends {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("no day types configured")]
    NoDayTypes,
}

/// Every task for a run, in execution order.
///
/// Routes are outermost, then date chunks of at most a week, then day
/// types, so that all of one route's work finishes before the next begins.
pub fn build_tasks(
    routes: &[Arc<Route>],
    from: NaiveDate,
    to: NaiveDate,
    day_types: &[DayType],
) -> Result<Vec<Task>, TaskSpaceError> {
    let range = DateWindow::new(from, to).ok_or(TaskSpaceError::InvertedRange { from, to })?;
    if day_types.is_empty() {
        return Err(TaskSpaceError::NoDayTypes);
    }

    let chunks = range.chunks(MAX_WINDOW_DAYS);
    let mut tasks = Vec::with_capacity(routes.len() * chunks.len() * day_types.len());
    for route in routes {
        for window in &chunks {
            for &day_type in day_types {
                tasks.push(Task::new(Arc::clone(route), *window, day_type));
            }
        }
    }
    Ok(tasks)
}
