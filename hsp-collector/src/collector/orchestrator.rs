//! The collection loop.
//!
//! Tasks run strictly one after another. Each task is first checked against
//! the progress ledger and the completion oracle; only tasks that are not
//! already satisfied reach HSP. A route is recorded as done once every one
//! of its tasks has reached a terminal state, whether or not some of them
//! failed. The ledger alone skips a route only when no errors are recorded
//! against it; otherwise the oracle decides task by task, so failed windows
//! are fetched again on the next run. Only an authentication failure stops
//! the run early.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Task, TaskOutcome};
use crate::hsp::{HspClient, HspError, ServiceMetricsRequest, Transport};
use crate::store::{FetchLogEntry, Persistence, StoreError};

use super::oracle::CompletionOracle;
use super::pipeline::{HspProcessor, ProcessContext, Processor, RecordValidator, Validator};
use super::progress::{ProgressError, ProgressTracker};
use super::stats::RunStats;

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("HSP rejected the credentials: {0}")]
    Authentication(#[source] HspError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Why a task would not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger lists the route as done with no errors outstanding.
    RouteCompleted,
    /// Persistence already holds the task's data.
    AlreadyHeld,
}

/// A task and what a run would do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub task: Task,
    /// `None` when the task would be fetched.
    pub skip: Option<SkipReason>,
}

/// Decide for each task whether a run would fetch it, without any network
/// access or writes beyond preparing the store.
pub fn plan_tasks<P: Persistence + ?Sized>(
    tasks: &[Task],
    store: &mut P,
    progress: &ProgressTracker,
    oracle: &CompletionOracle,
) -> Result<Vec<PlannedTask>, StoreError> {
    store.prepare()?;
    tasks
        .iter()
        .map(|task| {
            let skip = if progress.is_route_settled(&task.route.name) {
                Some(SkipReason::RouteCompleted)
            } else if oracle.is_complete(store, task)? {
                Some(SkipReason::AlreadyHeld)
            } else {
                None
            };
            Ok(PlannedTask {
                task: task.clone(),
                skip,
            })
        })
        .collect()
}

/// Drives tasks through fetch, transform, validate and save.
pub struct Collector<T, P, Pr = HspProcessor, V = RecordValidator> {
    client: HspClient<T>,
    store: P,
    progress: ProgressTracker,
    oracle: CompletionOracle,
    processor: Pr,
    validator: V,
    tolerance: Vec<String>,
    stats_path: Option<PathBuf>,
    cancel: CancellationToken,
}

impl<T: Transport, P: Persistence> Collector<T, P> {
    pub fn new(client: HspClient<T>, store: P, progress: ProgressTracker) -> Self {
        Self {
            client,
            store,
            progress,
            oracle: CompletionOracle::default(),
            processor: HspProcessor::default(),
            validator: RecordValidator,
            tolerance: Vec::new(),
            stats_path: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl<T, P, Pr, V> Collector<T, P, Pr, V>
where
    T: Transport,
    P: Persistence,
    Pr: Processor,
    V: Validator,
{
    pub fn with_oracle(mut self, oracle: CompletionOracle) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_processor<Q: Processor>(self, processor: Q) -> Collector<T, P, Q, V> {
        Collector {
            client: self.client,
            store: self.store,
            progress: self.progress,
            oracle: self.oracle,
            processor,
            validator: self.validator,
            tolerance: self.tolerance,
            stats_path: self.stats_path,
            cancel: self.cancel,
        }
    }

    pub fn with_validator<W: Validator>(self, validator: W) -> Collector<T, P, Pr, W> {
        Collector {
            client: self.client,
            store: self.store,
            progress: self.progress,
            oracle: self.oracle,
            processor: self.processor,
            validator,
            tolerance: self.tolerance,
            stats_path: self.stats_path,
            cancel: self.cancel,
        }
    }

    /// Lateness thresholds sent with every metrics request.
    pub fn with_tolerance(mut self, tolerance: Vec<String>) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Write run statistics to `path` when the run ends.
    pub fn with_stats_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_path = Some(path.into());
        self
    }

    /// Stop between tasks once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn client(&self) -> &HspClient<T> {
        &self.client
    }

    pub fn into_store(self) -> P {
        self.store
    }

    /// Run every task in order.
    ///
    /// Returns the run statistics, also written to the statistics file if
    /// one is configured. Fails only on authentication errors and on
    /// failures to prepare the store or write the progress ledger.
    pub async fn run(&mut self, tasks: &[Task]) -> Result<RunStats, CollectError> {
        self.store.prepare()?;

        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for task in tasks {
            *remaining.entry(task.route.name.as_str()).or_default() += 1;
        }
        let mut route_records: HashMap<&str, u64> = HashMap::new();

        let mut stats = RunStats::new();
        let mut cancelled = false;
        info!(tasks = tasks.len(), routes = remaining.len(), "starting collection");

        for (n, task) in tasks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(done = n, total = tasks.len(), "cancelled, stopping before next task");
                cancelled = true;
                break;
            }

            let route = task.route.name.as_str();
            let settled = self.progress.is_route_settled(route);
            if !settled && self.progress.state().current_route.as_deref() != Some(route) {
                self.progress.record_route_started(route)?;
            }

            let outcome = match self.run_task(task, settled).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    stats.finish(false);
                    self.write_stats(&stats);
                    return Err(e);
                }
            };

            info!(
                task = n + 1,
                of = tasks.len(),
                route,
                window = %task.window,
                day_type = %task.day_type,
                status = %outcome.status,
                records = outcome.records_saved,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "task finished"
            );

            if let Some(error) = &outcome.error {
                self.progress.record_route_failed(
                    route,
                    format!("{} {}: {}", task.window, task.day_type, error),
                )?;
            }
            stats.record(route, &outcome);
            *route_records.entry(route).or_default() += outcome.records_saved;

            if let Some(left) = remaining.get_mut(route) {
                *left -= 1;
                if *left == 0 && !settled {
                    if stats.route(route).is_some_and(|r| r.errors == 0) {
                        self.progress.clear_route_failures(route)?;
                    }
                    let records = route_records.get(route).copied().unwrap_or(0);
                    self.progress.record_route_completed(route, records)?;
                    info!(route, records, "route done");
                }
            }
        }

        stats.finish(cancelled);
        self.write_stats(&stats);
        info!(
            completed = stats.totals.completed,
            skipped = stats.totals.skipped,
            no_data = stats.totals.no_data,
            errors = stats.totals.errors,
            records = stats.totals.records,
            elapsed_secs = stats.elapsed_secs,
            "collection finished"
        );
        Ok(stats)
    }

    /// One task. `Err` only for failures that must end the run.
    async fn run_task(&mut self, task: &Task, settled: bool) -> Result<TaskOutcome, CollectError> {
        let start = Instant::now();

        if settled {
            return Ok(TaskOutcome::skipped(start.elapsed()));
        }
        match self.oracle.is_complete(&self.store, task) {
            Ok(true) => return Ok(TaskOutcome::skipped(start.elapsed())),
            Ok(false) => {}
            Err(e) => return Ok(TaskOutcome::failed(e.to_string(), start.elapsed())),
        }

        let request = metrics_request(task, &self.tolerance);
        let raw = match self.client.service_metrics(&request).await {
            Ok(raw) => raw,
            Err(e) => return upstream_failure(e, start.elapsed()),
        };

        let ctx = ProcessContext {
            task,
            client: &self.client,
        };
        let records = match self.processor.transform(&raw, ctx).await {
            Ok(records) => records,
            Err(e) => return upstream_failure(e, start.elapsed()),
        };

        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            let (ok, issues) = self.validator.validate(&record, task);
            if ok {
                valid.push(record);
            } else {
                warn!(rid = %record.rid, route = %task.route.name, ?issues, "dropping invalid record");
            }
        }

        let saved = match self.store.save(&valid) {
            Ok(n) => n,
            Err(e) => return Ok(TaskOutcome::failed(e.to_string(), start.elapsed())),
        };

        // A window whose services were all rejected is not logged, so it is
        // requested again rather than passed as empty.
        let services = raw.services.len() as u64;
        if services > 0 && saved == 0 {
            warn!(task = %task, services, "no usable records in response");
        } else {
            let entry = FetchLogEntry {
                key: task.key(),
                services,
                records: saved,
                fetched_at: Utc::now(),
            };
            if let Err(e) = self.store.record_fetch(&entry) {
                warn!(task = %task, error = %e, "could not record fetch");
            }
        }

        Ok(TaskOutcome::fetched(saved, start.elapsed()))
    }

    fn write_stats(&self, stats: &RunStats) {
        if let Some(path) = &self.stats_path
            && let Err(e) = stats.save(path)
        {
            warn!(path = %path.display(), error = %e, "could not write statistics");
        }
    }
}

fn upstream_failure(error: HspError, elapsed: Duration) -> Result<TaskOutcome, CollectError> {
    if error.is_fatal() {
        return Err(CollectError::Authentication(error));
    }
    Ok(TaskOutcome::failed(error.to_string(), elapsed))
}

/// The `serviceMetrics` body for a task.
pub fn metrics_request(task: &Task, tolerance: &[String]) -> ServiceMetricsRequest {
    let times = task.route.effective_time_window();
    ServiceMetricsRequest {
        from_loc: task.route.origin,
        to_loc: task.route.destination,
        from_time: times.from,
        to_time: times.to,
        from_date: task.window.start(),
        to_date: task.window.end(),
        days: task.day_type,
        tolerance: tolerance.to_vec(),
    }
}
