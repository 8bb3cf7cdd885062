//! End-to-end runs of the collector against a scripted HSP.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use hsp_collector::collector::{
    CollectError, Collector, ProgressTracker, RunStats, build_tasks,
};
use hsp_collector::domain::{Crs, DayType, Route, Task, TaskStatus};
use hsp_collector::hsp::{HspClient, HspConfig, HspError, RawResponse, RetryPolicy, Transport};
use hsp_collector::store::{MemoryStore, Persistence};

const NO_SERVICES: &str = r#"{"header": {"from_location": "BTN", "to_location": "VIC"}, "Services": []}"#;

/// Replays canned replies; once the script runs out every request gets an
/// empty metrics response.
#[derive(Default)]
struct Upstream {
    replies: Mutex<VecDeque<RawResponse>>,
    requests: Mutex<Vec<Value>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl Upstream {
    fn new(replies: &[(u16, &str)]) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|(status, body)| RawResponse {
                        status: *status,
                        body: body.to_string(),
                    })
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Cancel `token` once `n` requests have been made.
    fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for Upstream {
    async fn post_json(&self, _endpoint: &str, payload: &Value) -> Result<RawResponse, HspError> {
        let made = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(payload.clone());
            requests.len()
        };
        if let Some((n, token)) = &self.cancel_after
            && made >= *n
        {
            token.cancel();
        }
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| RawResponse {
            status: 200,
            body: NO_SERVICES.to_string(),
        }))
    }
}

fn config() -> HspConfig {
    HspConfig::new("user", "pass").with_retry(RetryPolicy::new(
        3,
        Duration::from_millis(500),
        Duration::from_secs(5),
        2.0,
        false,
    ))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn route(name: &str, origin: &str, destination: &str) -> Arc<Route> {
    Arc::new(Route::new(
        name,
        Crs::parse(origin).unwrap(),
        Crs::parse(destination).unwrap(),
    ))
}

fn fortnight(routes: &[Arc<Route>]) -> Vec<Task> {
    build_tasks(routes, date(2024, 1, 1), date(2024, 1, 14), &[DayType::Weekday]).unwrap()
}

fn collector(
    upstream: Upstream,
    store: MemoryStore,
    progress: &Path,
) -> Collector<Upstream, MemoryStore> {
    let client = HspClient::with_transport(upstream, &config());
    Collector::new(client, store, ProgressTracker::load(progress).unwrap())
}

fn week_of_services(route_from: &str, route_to: &str) -> String {
    serde_json::json!({
        "Services": [{
            "serviceAttributesMetrics": {
                "origin_location": route_from,
                "destination_location": route_to,
                "gbtt_ptd": "0712",
                "gbtt_pta": "0823",
                "toc_code": "GX",
                "matched_services": "3",
                "rids": ["202401013361753", "202401023361753", "202401033361753"]
            },
            "Metrics": []
        }]
    })
    .to_string()
}

#[tokio::test(start_paused = true)]
async fn empty_route_completes_with_no_data() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC")]);

    let mut c = collector(Upstream::new(&[]), MemoryStore::new(), &progress);
    let stats = c.run(&tasks).await.unwrap();

    assert_eq!(stats.totals.tasks, 2);
    assert_eq!(stats.count(TaskStatus::NoData), 2);
    assert_eq!(stats.totals.records, 0);
    assert_eq!(c.store().total_records().unwrap(), 0);

    let reloaded = ProgressTracker::load(&progress).unwrap();
    assert!(reloaded.is_route_completed("am"));
    assert_eq!(reloaded.state().total_records, 0);
    assert!(reloaded.state().failed_routes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_run_skips_everything() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC")]);

    let mut first = collector(
        Upstream::new(&[(200, &week_of_services("BTN", "VIC"))]),
        MemoryStore::new(),
        &progress,
    );
    let stats = first.run(&tasks).await.unwrap();
    assert_eq!(stats.count(TaskStatus::Completed), 1);
    assert_eq!(stats.count(TaskStatus::NoData), 1);
    let store = first.into_store();
    let total = store.total_records().unwrap();
    assert_eq!(total, 3);

    // Same ledger: the route is already done.
    let mut second = collector(Upstream::new(&[]), store, &progress);
    let stats = second.run(&tasks).await.unwrap();
    assert_eq!(stats.skip_rate(), 100.0);
    assert!(second.client().transport().requests().is_empty());
    let store = second.into_store();
    assert_eq!(store.total_records().unwrap(), total);

    // Without the ledger, stored records and the fetch log still satisfy
    // every task, including the empty second week.
    let fresh = dir.path().join("fresh.json");
    let mut third = collector(Upstream::new(&[]), store, &fresh);
    let stats = third.run(&tasks).await.unwrap();
    assert_eq!(stats.skip_rate(), 100.0);
    assert!(third.client().transport().requests().is_empty());
    assert_eq!(third.store().total_records().unwrap(), total);
    assert!(third.progress().is_route_completed("am"));
}

#[tokio::test(start_paused = true)]
async fn interrupted_run_resumes_with_remaining_route() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC"), route("pm", "VIC", "BTN")]);

    // Stop once both of the first route's tasks have been sent.
    let token = CancellationToken::new();
    let mut first = collector(
        Upstream::new(&[]).cancel_after(2, token.clone()),
        MemoryStore::new(),
        &progress,
    )
    .with_cancellation(token);
    let stats: RunStats = first.run(&tasks).await.unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.totals.tasks, 2);
    let store = first.into_store();

    let ledger = ProgressTracker::load(&progress).unwrap();
    assert!(ledger.is_route_completed("am"));
    assert!(!ledger.is_route_completed("pm"));

    let mut second = collector(Upstream::new(&[]), store, &progress);
    let stats = second.run(&tasks).await.unwrap();
    assert_eq!(stats.route("am").unwrap().skipped, 2);
    assert_eq!(stats.route("pm").unwrap().no_data, 2);

    let requests = second.client().transport().requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r["from_loc"] == "VIC"));
    assert!(second.progress().is_route_completed("pm"));
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_aborts_run() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC"), route("pm", "VIC", "BTN")]);

    let mut c = collector(Upstream::new(&[(401, "")]), MemoryStore::new(), &progress)
        .with_stats_path(dir.path().join("stats.json"));
    let err = c.run(&tasks).await.unwrap_err();

    assert!(matches!(err, CollectError::Authentication(HspError::Authentication { status: 401 })));
    assert_eq!(c.client().transport().requests().len(), 1);
    assert!(!c.progress().is_route_completed("am"));
    assert!(dir.path().join("stats.json").exists());
}

#[tokio::test(start_paused = true)]
async fn bad_request_fails_task_and_run_continues() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC")]);

    let mut c = collector(
        Upstream::new(&[(400, r#"{"error": "invalid from_date"}"#)]),
        MemoryStore::new(),
        &progress,
    );
    let stats = c.run(&tasks).await.unwrap();

    assert_eq!(stats.count(TaskStatus::Error), 1);
    assert_eq!(stats.count(TaskStatus::NoData), 1);
    assert_eq!(c.client().transport().requests().len(), 2);
    assert!(c.progress().is_route_completed("am"));
    assert_eq!(c.progress().state().failed_routes.len(), 1);
    assert_eq!(c.progress().state().failed_routes[0].route, "am");

    // Same ledger: only the failed window is requested again.
    let store = c.into_store();
    let mut again = collector(
        Upstream::new(&[(200, &week_of_services("BTN", "VIC"))]),
        store,
        &progress,
    );
    let stats = again.run(&tasks).await.unwrap();
    assert_eq!(stats.count(TaskStatus::Completed), 1);
    assert_eq!(stats.count(TaskStatus::Skipped), 1);
    let requests = again.client().transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["from_date"], "2024-01-01");
    assert!(again.progress().state().failed_routes.is_empty());

    // With the errors cleared the ledger alone settles the route.
    let store = again.into_store();
    let mut third = collector(Upstream::new(&[]), store, &progress);
    let stats = third.run(&tasks).await.unwrap();
    assert_eq!(stats.skip_rate(), 100.0);
    assert!(third.client().transport().requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn window_with_only_rejected_services_is_refetched() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    // Services dated 1 to 3 January, sent for the week starting 8 January.
    let tasks = build_tasks(
        &[route("am", "BTN", "VIC")],
        date(2024, 1, 8),
        date(2024, 1, 14),
        &[DayType::Weekday],
    )
    .unwrap();

    let mut c = collector(
        Upstream::new(&[(200, &week_of_services("BTN", "VIC"))]),
        MemoryStore::new(),
        &progress,
    );
    let stats = c.run(&tasks).await.unwrap();
    assert_eq!(stats.count(TaskStatus::NoData), 1);
    assert!(c.store().fetch_entry(&tasks[0].key()).unwrap().is_none());

    let store = c.into_store();
    let fresh = dir.path().join("fresh.json");
    let mut again = collector(Upstream::new(&[]), store, &fresh);
    again.run(&tasks).await.unwrap();
    assert_eq!(again.client().transport().requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unavailable_upstream_is_retried() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC")]);

    let mut c = collector(
        Upstream::new(&[(503, "busy"), (429, "slow down"), (200, &week_of_services("BTN", "VIC"))]),
        MemoryStore::new(),
        &progress,
    );
    let stats = c.run(&tasks).await.unwrap();

    assert_eq!(stats.count(TaskStatus::Completed), 1);
    assert_eq!(stats.totals.records, 3);
    assert_eq!(c.client().transport().requests().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn retries_exhausted_mark_task_failed() {
    let dir = tempdir().unwrap();
    let progress = dir.path().join("progress.json");
    let tasks = fortnight(&[route("am", "BTN", "VIC")]);

    let mut c = collector(
        Upstream::new(&[(503, ""), (503, ""), (503, "")]),
        MemoryStore::new(),
        &progress,
    );
    let stats = c.run(&tasks).await.unwrap();

    assert_eq!(stats.count(TaskStatus::Error), 1);
    assert_eq!(stats.count(TaskStatus::NoData), 1);
    assert_eq!(c.client().transport().requests().len(), 4);
    assert!(c.progress().state().failed_routes[0].error.contains("503"));
}
