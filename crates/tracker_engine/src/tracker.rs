use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracker_core::{update, AppState, Effect, JobId, JobRowView, Msg, Stage};
use tracker_logging::{tracker_debug, tracker_error, tracker_info, tracker_warn};

use crate::client::Backend;
use crate::multiplexer::{StreamEvent, StreamMultiplexer};
use crate::persist::{AtomicFileWriter, KeyValueStore, TrackerStorage};
use crate::{StreamItem, TrackerError};

/// Consumer of state changes. Called synchronously after every applied change.
pub trait Projector: Send {
    fn project(&mut self, row: &JobRowView);

    fn artifact_saved(&mut self, _job_id: &JobId, _path: &Path) {}

    fn artifact_failed(&mut self, _job_id: &JobId, _error: &TrackerError) {}
}

#[derive(Debug, Clone, Default)]
pub struct TrackerSettings {
    /// Where completed job artifacts are written. `None` skips downloads.
    pub artifact_dir: Option<PathBuf>,
}

/// Per-identifier result of [`Tracker::reconcile_on_startup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Still running on the server; resubscribed.
    pub resumed: Vec<JobId>,
    /// Already terminal on the server.
    pub finished: Vec<JobId>,
    /// Snapshot fetch failed; dropped for this session.
    pub dropped: Vec<JobId>,
}

/// Result of a background artifact download.
struct ArtifactDone {
    job_id: JobId,
    result: Result<PathBuf, TrackerError>,
}

/// The single owned session context: job state, live streams and persistence.
///
/// All mutation happens through `&mut self`, one message at a time, and each
/// message's effects run to completion before the next stream event is read.
/// Artifact downloads are the exception: they run as background tasks and
/// report back through [`Tracker::pump`], so a large archive never holds up
/// other jobs' stream events.
pub struct Tracker {
    state: AppState,
    backend: Arc<dyn Backend>,
    streams: StreamMultiplexer,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    artifacts_tx: mpsc::UnboundedSender<ArtifactDone>,
    artifacts: mpsc::UnboundedReceiver<ArtifactDone>,
    pending_artifacts: usize,
    storage: TrackerStorage<Box<dyn KeyValueStore>>,
    projector: Box<dyn Projector>,
    settings: TrackerSettings,
}

impl Tracker {
    pub fn new(
        backend: Arc<dyn Backend>,
        storage: TrackerStorage<Box<dyn KeyValueStore>>,
        projector: Box<dyn Projector>,
        settings: TrackerSettings,
    ) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let streams = StreamMultiplexer::new(backend.clone(), event_tx);
        let (artifacts_tx, artifacts) = mpsc::unbounded_channel();
        Self {
            state: AppState::new(),
            backend,
            streams,
            events,
            artifacts_tx,
            artifacts,
            pending_artifacts: 0,
            storage,
            projector,
            settings,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn streams(&self) -> &StreamMultiplexer {
        &self.streams
    }

    /// Validates raw job parameters, then starts a job with them.
    pub async fn start_job(&mut self, raw: &str) -> Result<JobId, TrackerError> {
        let payload = parse_payload(raw)?;
        self.start_with(&payload).await
    }

    /// Starts a job and begins tracking it. Nothing is stored when the backend refuses.
    pub async fn start_with(&mut self, payload: &serde_json::Value) -> Result<JobId, TrackerError> {
        let started = match self.backend.start(payload).await {
            Ok(started) => started,
            Err(err) => {
                tracker_warn!("Start failed: {}", err);
                return Err(err);
            }
        };
        let job_id = started.job_id.clone();
        self.dispatch(Msg::StartAccepted {
            job_id: started.job_id,
            status: started.status,
        })
        .await;
        Ok(job_id)
    }

    /// Restores tracked jobs from the persisted set using server-truth snapshots.
    ///
    /// Snapshot fetches run concurrently and fail independently.
    pub async fn reconcile_on_startup(&mut self) -> ReconcileReport {
        let job_ids = self.storage.tracked_ids();
        self.dispatch(Msg::ReconcileStarted {
            job_ids: job_ids.clone(),
        })
        .await;

        let backend = self.backend.clone();
        let results = join_all(job_ids.iter().map(|job_id| backend.fetch_snapshot(job_id))).await;

        let mut report = ReconcileReport::default();
        for (job_id, result) in job_ids.into_iter().zip(results) {
            match result {
                Ok(snapshot) => {
                    if snapshot.is_terminal() {
                        report.finished.push(job_id.clone());
                    } else {
                        report.resumed.push(job_id.clone());
                    }
                    self.dispatch(Msg::SnapshotFetched { job_id, snapshot }).await;
                }
                Err(err) => {
                    report.dropped.push(job_id.clone());
                    self.dispatch(Msg::SnapshotUnavailable {
                        job_id,
                        reason: err.to_string(),
                    })
                    .await;
                }
            }
        }

        self.dispatch(Msg::ReconcileFinished).await;
        tracker_info!(
            "Reconciled: {} resumed, {} finished, {} dropped",
            report.resumed.len(),
            report.finished.len(),
            report.dropped.len()
        );
        report
    }

    /// Waits for the next stream event or finished download and applies it.
    ///
    /// Returns false when the event came from a closed subscription and was discarded.
    pub async fn pump(&mut self) -> bool {
        tokio::select! {
            Some(done) = self.artifacts.recv() => {
                self.finish_artifact(done);
                true
            }
            event = self.events.recv() => match event {
                Some(event) => self.handle_stream_event(event).await,
                None => false,
            },
        }
    }

    /// Processes events until no subscription and no download is left.
    pub async fn run_until_idle(&mut self) {
        while self.streams.active_count() > 0 || self.pending_artifacts > 0 {
            self.pump().await;
        }
    }

    /// `Err(JobFailed)` when the job's last known state is failed.
    pub fn outcome(&self, job_id: &JobId) -> Option<Result<Stage, TrackerError>> {
        let job = self.state.store().get(job_id)?;
        Some(match (job.stage(), &job.error) {
            (Stage::Failed, Some(message)) => Err(TrackerError::JobFailed {
                job_id: job_id.clone(),
                message: message.clone(),
            }),
            (stage, _) => Ok(stage),
        })
    }

    pub async fn shutdown(&mut self) {
        self.streams.close_all().await;
    }

    async fn handle_stream_event(&mut self, event: StreamEvent) -> bool {
        if !self.streams.accepts(&event.job_id, event.generation) {
            tracker_debug!(
                "Discarding event from closed subscription {} of job {}",
                event.generation,
                event.job_id
            );
            return false;
        }
        let msg = match event.item {
            StreamItem::Snapshot(snapshot) => Msg::StreamSnapshot {
                job_id: event.job_id,
                snapshot,
            },
            StreamItem::Fault(kind) => {
                let fault = TrackerError::StreamFault {
                    job_id: event.job_id.clone(),
                    kind,
                };
                Msg::StreamFault {
                    job_id: event.job_id,
                    message: fault.to_string(),
                }
            }
        };
        self.dispatch(msg).await;
        true
    }

    async fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        for effect in effects {
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Subscribe { job_id } => {
                self.streams.subscribe(&job_id);
            }
            Effect::Unsubscribe { job_id } => {
                self.streams.unsubscribe(&job_id);
            }
            Effect::PersistTracked { job_ids } => {
                if let Err(err) = self.storage.write_tracked(&job_ids) {
                    tracker_error!("Failed to persist tracked jobs: {}", err);
                }
            }
            Effect::Render { job_id } => {
                if let Some(row) = self.state.row(&job_id) {
                    self.projector.project(&row);
                }
            }
            Effect::FetchArtifact { job_id } => {
                let Some(dir) = self.settings.artifact_dir.clone() else {
                    return;
                };
                tracker_debug!("Downloading artifact for job {}", job_id);
                self.pending_artifacts += 1;
                let backend = self.backend.clone();
                let done_tx = self.artifacts_tx.clone();
                tokio::spawn(async move {
                    let result = save_artifact(backend.as_ref(), &job_id, dir).await;
                    // The receiver lives as long as the tracker.
                    let _ = done_tx.send(ArtifactDone { job_id, result });
                });
            }
        }
    }

    fn finish_artifact(&mut self, done: ArtifactDone) {
        self.pending_artifacts = self.pending_artifacts.saturating_sub(1);
        match done.result {
            Ok(path) => {
                tracker_info!("Saved artifact for job {} to {:?}", done.job_id, path);
                self.projector.artifact_saved(&done.job_id, &path);
            }
            Err(err) => {
                tracker_warn!("Artifact for job {} not saved: {}", done.job_id, err);
                self.projector.artifact_failed(&done.job_id, &err);
            }
        }
    }
}

async fn save_artifact(
    backend: &dyn Backend,
    job_id: &JobId,
    dir: PathBuf,
) -> Result<PathBuf, TrackerError> {
    let bytes = backend.download(job_id).await?;
    let writer = AtomicFileWriter::new(dir);
    Ok(writer.write_bytes(&artifact_filename(job_id), &bytes)?)
}

/// Parses job parameters; they must be a JSON object.
pub fn parse_payload(raw: &str) -> Result<serde_json::Value, TrackerError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| TrackerError::InvalidPayload(err.to_string()))?;
    if !value.is_object() {
        return Err(TrackerError::InvalidPayload(
            "job parameters must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// File name for a job's downloaded archive, with path separators neutralized.
pub fn artifact_filename(job_id: &JobId) -> String {
    let safe: String = job_id
        .as_str()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    format!("{safe}.zip")
}
