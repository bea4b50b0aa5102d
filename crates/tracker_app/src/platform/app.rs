use std::fs;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracker_core::{payload_from_link, ApiBase, AppViewModel, JobId, Stage, PREFILL_PARAM};
use tracker_engine::{
    parse_payload, ClientSettings, KeyValueStore, ReqwestBackend, Tracker, TrackerSettings,
    TrackerStorage,
};
use tracker_logging::{tracker_info, tracker_warn};

use super::cli::{Cli, Command, StartArgs};
use super::logging::{self, LogDestination};
use super::persistence::RonFileStore;
use super::projector::TerminalProjector;

type Storage = TrackerStorage<Box<dyn KeyValueStore>>;

pub fn run_app() -> Result<()> {
    let cli = Cli::parse();
    if let Some(destination) = LogDestination::choose(cli.log_file.as_deref(), cli.quiet) {
        logging::initialize(destination, &cli.log_level);
    }

    // Every effect runs on this one thread, in message order.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let store: Box<dyn KeyValueStore> = Box::new(RonFileStore::open(cli.state_file.clone()));
    let mut storage = TrackerStorage::new(store);

    match &cli.command {
        Command::Start(args) => {
            let raw = read_payload(args)?;
            let payload = parse_payload(&raw)?;
            let base = resolve_and_remember(cli.backend.as_deref(), &cli.origin, &mut storage)?;
            let mut tracker = build_tracker(&cli, base, storage)?;
            tracker.reconcile_on_startup().await;
            let job_id = tracker.start_with(&payload).await?;
            println!("Started job {job_id}");
            follow(&mut tracker).await;
            report_outcome(&tracker, &job_id)
        }
        Command::Resume => {
            let base = resolve_base(cli.backend.as_deref(), &cli.origin, &storage)?;
            let mut tracker = build_tracker(&cli, base, storage)?;
            let report = tracker.reconcile_on_startup().await;
            for job_id in &report.dropped {
                println!("Dropped job {job_id}: snapshot unavailable");
            }
            if report.resumed.is_empty() {
                println!("No running jobs to follow");
                return Ok(());
            }
            println!("Following {} job(s)", tracker.state().view().live_count);
            follow(&mut tracker).await;
            println!("{}", summary(&tracker.state().view()));
            Ok(())
        }
        Command::Endpoint { uri, clear } => update_endpoint(&cli, &mut storage, uri.as_deref(), *clear),
        Command::Tracked => {
            for job_id in storage.tracked_ids() {
                println!("{job_id}");
            }
            Ok(())
        }
    }
}

/// `--backend` wins over the saved base; neither means `origin`.
fn resolve_base(backend: Option<&str>, origin: &str, storage: &Storage) -> Result<ApiBase> {
    let configured = backend.map(str::to_owned).or_else(|| storage.endpoint());
    ApiBase::resolve(configured.as_deref(), origin).context("Invalid backend base")
}

/// Like [`resolve_base`], then saves `backend` for later runs. An invalid
/// base is rejected before anything is written.
fn resolve_and_remember(
    backend: Option<&str>,
    origin: &str,
    storage: &mut Storage,
) -> Result<ApiBase> {
    let base = resolve_base(backend, origin, storage)?;
    if let Some(backend) = backend {
        storage
            .save_endpoint(backend)
            .context("Failed to save backend base")?;
    }
    Ok(base)
}

fn build_tracker(cli: &Cli, base: ApiBase, storage: Storage) -> Result<Tracker> {
    tracker_info!("Using backend {}", base.as_str());

    let mut settings = ClientSettings::new(base);
    settings.request_timeout = cli.timeout_secs.map(Duration::from_secs);
    let backend = ReqwestBackend::new(settings)
        .map_err(|kind| anyhow!("Failed to build HTTP client: {kind}"))?;

    let tracker_settings = TrackerSettings {
        artifact_dir: cli.output_dir.clone(),
    };
    Ok(Tracker::new(
        Arc::new(backend),
        storage,
        Box::new(TerminalProjector::stdout()),
        tracker_settings,
    ))
}

/// Applies stream events until every subscription is closed or the user interrupts.
///
/// Interrupted jobs stay in the tracked set for a later `resume`.
async fn follow(tracker: &mut Tracker) {
    if tracker.streams().active_count() > 0 {
        tokio::select! {
            _ = tracker.run_until_idle() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => println!("Interrupted; run `resume` to keep following"),
                Err(err) => tracker_warn!("Failed to listen for interrupt: {}", err),
            },
        }
    }
    tracker.shutdown().await;
}

fn summary(view: &AppViewModel) -> String {
    let count = |stage: Stage| view.jobs.iter().filter(|row| row.stage == stage).count();
    format!(
        "{} completed, {} failed, {} still tracked",
        count(Stage::Completed),
        count(Stage::Failed),
        view.tracked.len()
    )
}

fn report_outcome(tracker: &Tracker, job_id: &JobId) -> Result<()> {
    match tracker.outcome(job_id) {
        Some(Err(err)) => Err(err.into()),
        _ => Ok(()),
    }
}

fn read_payload(args: &StartArgs) -> Result<String> {
    if let Some(payload) = &args.payload {
        return Ok(payload.clone());
    }
    if let Some(path) = &args.payload_file {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read job parameters from {}", path.display()));
    }
    if let Some(link) = &args.prefill {
        return payload_from_link(link)
            .ok_or_else(|| anyhow!("Link has no `{PREFILL_PARAM}` parameter"));
    }

    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read job parameters from stdin")?;
    Ok(raw)
}

fn update_endpoint(cli: &Cli, storage: &mut Storage, uri: Option<&str>, clear: bool) -> Result<()> {
    if clear {
        storage
            .save_endpoint("")
            .context("Failed to clear backend base")?;
        println!("Saved backend cleared; using {}", cli.origin);
        return Ok(());
    }

    match uri {
        Some(uri) => {
            let base = ApiBase::resolve(Some(uri), &cli.origin).context("Invalid backend base")?;
            storage
                .save_endpoint(uri)
                .context("Failed to save backend base")?;
            println!("Saved backend {}", base.as_str());
        }
        None => match storage.endpoint() {
            Some(base) => println!("{base}"),
            None => println!("No saved backend; using {}", cli.origin),
        },
    }
    Ok(())
}
