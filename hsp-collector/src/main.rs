use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hsp_collector::collector::{
    CollectError, Collector, HspProcessor, ProgressError, ProgressTracker, SkipReason, plan_tasks,
};
use hsp_collector::config::{CollectorConfig, ConfigError};
use hsp_collector::hsp::{HspClient, HspError};
use hsp_collector::store::{Persistence, SqliteStore, StoreError};

#[derive(Parser)]
#[command(
    name = "hsp-collector",
    version,
    about = "Collect historical train performance from National Rail HSP"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "hsp-collector.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every task whose data is not already stored
    Collect {
        /// Forget recorded progress before starting
        #[arg(long)]
        reset: bool,

        /// Report what would be fetched without contacting HSP
        #[arg(long)]
        dry_run: bool,
    },
    /// List every task and whether a run would fetch it
    Plan,
    /// Show the progress ledger
    Status,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("cannot create HSP client: {0}")]
    Client(#[from] HspError),

    #[error(transparent)]
    Collect(#[from] CollectError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hsp_collector=info")),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Command::Collect { reset, dry_run } => collect(&cli.config, reset, dry_run).await,
        Command::Plan => plan(&cli.config, false),
        Command::Status => status(&cli.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn collect(config_path: &Path, reset: bool, dry_run: bool) -> Result<(), CliError> {
    if dry_run {
        return plan(config_path, true);
    }

    let config = CollectorConfig::load(config_path)?;
    let tasks = config.tasks()?;
    let credentials = config.credentials()?;
    let client = HspClient::new(config.hsp_config(&credentials))?;

    let mut progress = ProgressTracker::load(&config.output.progress_file)?;
    if reset {
        progress.reset()?;
    }
    let store = SqliteStore::open(&config.output.database)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current task");
            on_signal.cancel();
        }
    });

    info!(
        config = %config_path.display(),
        routes = config.routes.len(),
        tasks = tasks.len(),
        database = %config.output.database.display(),
        "starting"
    );

    let mut collector = Collector::new(client, store, progress)
        .with_oracle(config.oracle())
        .with_processor(HspProcessor::new(config.fetch_details))
        .with_tolerance(config.tolerance.clone())
        .with_stats_path(&config.output.stats_file)
        .with_cancellation(cancel);

    let stats = collector.run(&tasks).await?;
    println!("{stats}");
    if stats.cancelled {
        println!("Run interrupted; start it again to resume.");
    }
    Ok(())
}

fn plan(config_path: &Path, summary_only: bool) -> Result<(), CliError> {
    let config = CollectorConfig::load(config_path)?;
    let tasks = config.tasks()?;
    let progress = ProgressTracker::load(&config.output.progress_file)?;
    let mut store = SqliteStore::open(&config.output.database)?;

    let planned = plan_tasks(&tasks, &mut store, &progress, &config.oracle())?;
    let mut fetch = 0;
    for p in &planned {
        let action = match p.skip {
            None => {
                fetch += 1;
                "fetch"
            }
            Some(SkipReason::RouteCompleted) => "skip (route done)",
            Some(SkipReason::AlreadyHeld) => "skip (data held)",
        };
        if !summary_only {
            println!("{:<40} {}", p.task.to_string(), action);
        }
    }
    println!(
        "{} tasks: {} to fetch, {} already satisfied",
        planned.len(),
        fetch,
        planned.len() - fetch
    );
    Ok(())
}

fn status(config_path: &Path) -> Result<(), CliError> {
    let config = CollectorConfig::load(config_path)?;
    let progress = ProgressTracker::load(&config.output.progress_file)?;
    let mut store = SqliteStore::open(&config.output.database)?;
    store.prepare()?;
    let state = progress.state();

    println!("progress file:  {}", progress.path().display());
    println!("started:        {}", state.started_at);
    println!("last updated:   {}", state.last_updated);
    println!(
        "routes done:    {}/{}",
        state.completed_routes.len(),
        config.routes.len()
    );
    if let Some(route) = &state.current_route {
        println!("in progress:    {route}");
    }
    println!("records:        {}", state.total_records);
    println!("records stored: {}", store.total_records()?);

    for route in &config.routes {
        let mark = if state.is_settled(&route.name) {
            "done"
        } else if state.is_completed(&route.name) {
            "retry"
        } else {
            "pending"
        };
        let dates = store.distinct_dates(&route.name)?;
        println!("  {:<8} {:>5} dates  {}", mark, dates, route);
    }
    if !state.failed_routes.is_empty() {
        println!("task errors:");
        for failed in &state.failed_routes {
            println!("  {} {} {}", failed.timestamp, failed.route, failed.error);
        }
    }
    Ok(())
}
