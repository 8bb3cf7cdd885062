//! Route-level progress ledger.
//!
//! The ledger survives restarts: once a route is recorded as completed with
//! no task errors against it, later runs skip all of its tasks without
//! consulting the store. A completed route that still has errors recorded is
//! revisited so the failed windows can be fetched again. Every mutation is
//! followed by an atomic rewrite of the file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::state_file::{read_json, write_json_atomic};

/// Error reading or writing the progress file.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("cannot read progress file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write progress file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A route whose run ended with at least one task error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRoute {
    pub route: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub completed_routes: BTreeSet<String>,
    #[serde(default)]
    pub failed_routes: Vec<FailedRoute>,
    #[serde(default)]
    pub total_records: u64,
    /// The route being worked on when the file was last written.
    #[serde(default)]
    pub current_route: Option<String>,
}

impl ProgressState {
    pub fn fresh() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            last_updated: now,
            completed_routes: BTreeSet::new(),
            failed_routes: Vec::new(),
            total_records: 0,
            current_route: None,
        }
    }

    pub fn is_completed(&self, route: &str) -> bool {
        self.completed_routes.contains(route)
    }

    pub fn has_failures(&self, route: &str) -> bool {
        self.failed_routes.iter().any(|f| f.route == route)
    }

    /// Completed with no task errors outstanding.
    pub fn is_settled(&self, route: &str) -> bool {
        self.is_completed(route) && !self.has_failures(route)
    }
}

/// Owns the progress file and its in-memory state.
#[derive(Debug)]
pub struct ProgressTracker {
    path: PathBuf,
    state: ProgressState,
}

impl ProgressTracker {
    /// Load the ledger at `path`, starting fresh if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProgressError> {
        let path = path.into();
        let state = match read_json::<ProgressState>(&path) {
            Ok(Some(state)) => {
                info!(
                    path = %path.display(),
                    completed = state.completed_routes.len(),
                    "resuming from progress file"
                );
                state
            }
            Ok(None) => ProgressState::fresh(),
            Err(source) => return Err(ProgressError::Read { path, source }),
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn is_route_completed(&self, route: &str) -> bool {
        self.state.is_completed(route)
    }

    /// Whether every task of `route` can be skipped on the ledger alone.
    pub fn is_route_settled(&self, route: &str) -> bool {
        self.state.is_settled(route)
    }

    pub fn record_route_started(&mut self, route: &str) -> Result<(), ProgressError> {
        self.state.current_route = Some(route.to_string());
        self.save()
    }

    /// Mark a route done and add the records its run saved.
    pub fn record_route_completed(
        &mut self,
        route: &str,
        records: u64,
    ) -> Result<(), ProgressError> {
        self.state.completed_routes.insert(route.to_string());
        self.state.total_records += records;
        if self.state.current_route.as_deref() == Some(route) {
            self.state.current_route = None;
        }
        self.save()
    }

    /// Note a task error against a route. The route may still complete.
    pub fn record_route_failed(
        &mut self,
        route: &str,
        error: impl Into<String>,
    ) -> Result<(), ProgressError> {
        self.state.failed_routes.push(FailedRoute {
            route: route.to_string(),
            error: error.into(),
            timestamp: Utc::now(),
        });
        self.save()
    }

    /// Drop the errors recorded against `route`, once a later pass over the
    /// route finished without any.
    pub fn clear_route_failures(&mut self, route: &str) -> Result<(), ProgressError> {
        let before = self.state.failed_routes.len();
        self.state.failed_routes.retain(|f| f.route != route);
        if self.state.failed_routes.len() == before {
            return Ok(());
        }
        self.save()
    }

    /// Forget all progress and rewrite the file.
    pub fn reset(&mut self) -> Result<(), ProgressError> {
        info!(path = %self.path.display(), "resetting progress");
        self.state = ProgressState::fresh();
        self.save()
    }

    /// Atomically rewrite the progress file.
    pub fn save(&mut self) -> Result<(), ProgressError> {
        self.state.last_updated = Utc::now();
        write_json_atomic(&self.path, &self.state).map_err(|source| ProgressError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "progress saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_fresh() {
        let dir = tempdir().unwrap();
        let tracker = ProgressTracker::load(dir.path().join("progress.json")).unwrap();
        assert!(tracker.state().completed_routes.is_empty());
        assert_eq!(tracker.state().total_records, 0);
        assert!(!tracker.path().exists());
    }

    #[test]
    fn completed_routes_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");

        let mut tracker = ProgressTracker::load(&path).unwrap();
        tracker.record_route_started("am").unwrap();
        assert_eq!(tracker.state().current_route.as_deref(), Some("am"));
        tracker.record_route_completed("am", 42).unwrap();
        tracker.record_route_started("pm").unwrap();
        tracker.record_route_failed("pm", "HTTP 400").unwrap();

        let reloaded = ProgressTracker::load(&path).unwrap();
        assert!(reloaded.is_route_completed("am"));
        assert!(!reloaded.is_route_completed("pm"));
        assert_eq!(reloaded.state().total_records, 42);
        assert_eq!(reloaded.state().current_route.as_deref(), Some("pm"));
        assert_eq!(reloaded.state().failed_routes.len(), 1);
        assert_eq!(reloaded.state().failed_routes[0].error, "HTTP 400");
        assert_eq!(reloaded.state().started_at, tracker.state().started_at);
    }

    #[test]
    fn completing_twice_keeps_one_entry() {
        let dir = tempdir().unwrap();
        let mut tracker = ProgressTracker::load(dir.path().join("p.json")).unwrap();
        tracker.record_route_completed("am", 1).unwrap();
        tracker.record_route_completed("am", 0).unwrap();
        assert_eq!(tracker.state().completed_routes.len(), 1);
    }

    #[test]
    fn completed_route_with_errors_is_not_settled() {
        let dir = tempdir().unwrap();
        let mut tracker = ProgressTracker::load(dir.path().join("p.json")).unwrap();
        tracker.record_route_failed("am", "HTTP 400").unwrap();
        tracker.record_route_failed("pm", "HTTP 503").unwrap();
        tracker.record_route_completed("am", 0).unwrap();
        tracker.record_route_completed("pm", 0).unwrap();
        assert!(tracker.is_route_completed("am"));
        assert!(!tracker.is_route_settled("am"));

        tracker.clear_route_failures("am").unwrap();
        assert!(tracker.is_route_settled("am"));
        assert!(!tracker.is_route_settled("pm"));
        assert_eq!(tracker.state().failed_routes.len(), 1);
    }

    #[test]
    fn reset_discards_ledger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut tracker = ProgressTracker::load(&path).unwrap();
        tracker.record_route_completed("am", 3).unwrap();
        tracker.reset().unwrap();

        let reloaded = ProgressTracker::load(&path).unwrap();
        assert!(reloaded.state().completed_routes.is_empty());
        assert_eq!(reloaded.state().total_records, 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            ProgressTracker::load(&path),
            Err(ProgressError::Read { .. })
        ));
    }

    #[test]
    fn older_files_without_optional_fields_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"started_at": "2024-01-01T00:00:00Z", "last_updated": "2024-01-01T00:00:00Z",
                "completed_routes": ["am"]}"#,
        )
        .unwrap();
        let tracker = ProgressTracker::load(&path).unwrap();
        assert!(tracker.is_route_completed("am"));
        assert!(tracker.state().failed_routes.is_empty());
    }
}
