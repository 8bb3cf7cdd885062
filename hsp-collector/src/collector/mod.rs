//! Resumable collection of HSP data.
//!
//! The work for a run is the Cartesian product of configured routes, week-long
//! date chunks and day types ([`build_tasks`]). The [`Collector`] walks that
//! list once, skipping whatever the [`ProgressTracker`] or the
//! [`CompletionOracle`] says is already done, so a crashed or cancelled run
//! can simply be started again.

mod oracle;
mod orchestrator;
mod pipeline;
mod progress;
mod state_file;
mod stats;
mod tasks;

pub use oracle::CompletionOracle;
pub use orchestrator::{
    CollectError, Collector, PlannedTask, SkipReason, metrics_request, plan_tasks,
};
pub use pipeline::{HspProcessor, ProcessContext, Processor, RecordValidator, Validator};
pub use progress::{FailedRoute, ProgressError, ProgressState, ProgressTracker};
pub use stats::{RouteStats, RunStats};
pub use tasks::{TaskSpaceError, build_tasks};
