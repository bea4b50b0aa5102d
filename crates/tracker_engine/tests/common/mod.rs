#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Semaphore};
use tracker_core::{JobId, JobRowView, JobState};
use tracker_engine::{
    Backend, FailureKind, JobStream, Projector, StartResponse, StreamItem, TrackerError,
};

/// In-memory backend whose responses and stream items are scripted by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    inner: Mutex<Inner>,
    artifact_gate: Mutex<Option<Arc<Semaphore>>>,
}

#[derive(Default)]
struct Inner {
    starts: VecDeque<Result<StartResponse, FailureKind>>,
    start_calls: usize,
    snapshots: HashMap<JobId, Result<JobState, FailureKind>>,
    streams: HashMap<JobId, Vec<mpsc::UnboundedSender<StreamItem>>>,
    artifacts: HashMap<JobId, Vec<u8>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn accept_next_start(&self, job_id: &str) {
        self.inner().starts.push_back(Ok(StartResponse {
            job_id: JobId::from(job_id),
            status: Some("queued".to_string()),
        }));
    }

    pub fn reject_next_start(&self, status: u16) {
        self.inner()
            .starts
            .push_back(Err(FailureKind::HttpStatus(status)));
    }

    pub fn start_calls(&self) -> usize {
        self.inner().start_calls
    }

    pub fn set_snapshot(&self, job_id: &str, snapshot: JobState) {
        self.inner()
            .snapshots
            .insert(JobId::from(job_id), Ok(snapshot));
    }

    pub fn fail_snapshot(&self, job_id: &str, status: u16) {
        self.inner()
            .snapshots
            .insert(JobId::from(job_id), Err(FailureKind::HttpStatus(status)));
    }

    pub fn set_artifact(&self, job_id: &str, bytes: &[u8]) {
        self.inner()
            .artifacts
            .insert(JobId::from(job_id), bytes.to_vec());
    }

    pub fn open_count(&self, job_id: &str) -> usize {
        self.inner()
            .streams
            .get(&JobId::from(job_id))
            .map_or(0, Vec::len)
    }

    /// Sends an item on the most recently opened stream. False if that stream is gone.
    pub fn push(&self, job_id: &str, item: StreamItem) -> bool {
        let inner = self.inner();
        match inner.streams.get(&JobId::from(job_id)).and_then(|s| s.last()) {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    pub fn push_snapshot(&self, job_id: &str, snapshot: JobState) -> bool {
        self.push(job_id, StreamItem::Snapshot(snapshot))
    }

    /// Waits until the `index`-th stream opened for `job_id` has been dropped.
    pub async fn wait_stream_closed(&self, job_id: &str, index: usize) {
        let tx = self.inner().streams[&JobId::from(job_id)][index].clone();
        tokio::time::timeout(Duration::from_secs(2), tx.closed())
            .await
            .expect("stream was not released");
    }

    pub fn stream_is_open(&self, job_id: &str, index: usize) -> bool {
        !self.inner().streams[&JobId::from(job_id)][index].is_closed()
    }

    /// Makes every download wait until [`ScriptedBackend::release_artifacts`].
    pub fn hold_artifacts(&self) {
        *self.artifact_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_artifacts(&self) {
        if let Some(gate) = self.artifact_gate.lock().unwrap().as_ref() {
            gate.add_permits(64);
        }
    }
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    async fn start(&self, _payload: &serde_json::Value) -> Result<StartResponse, TrackerError> {
        let mut inner = self.inner();
        inner.start_calls += 1;
        inner
            .starts
            .pop_front()
            .unwrap_or(Err(FailureKind::HttpStatus(500)))
            .map_err(TrackerError::StartRejected)
    }

    async fn fetch_snapshot(&self, job_id: &JobId) -> Result<JobState, TrackerError> {
        let result = self
            .inner()
            .snapshots
            .get(job_id)
            .cloned()
            .unwrap_or(Err(FailureKind::HttpStatus(404)));
        result
            .map(|mut snapshot| {
                snapshot.id = job_id.clone();
                snapshot
            })
            .map_err(|kind| TrackerError::SnapshotUnavailable {
                job_id: job_id.clone(),
                kind,
            })
    }

    fn open_stream(&self, job_id: &JobId) -> JobStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner()
            .streams
            .entry(job_id.clone())
            .or_default()
            .push(tx);
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }

    async fn download(&self, job_id: &JobId) -> Result<Bytes, TrackerError> {
        let gate = self.artifact_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        self.inner()
            .artifacts
            .get(job_id)
            .map(|bytes| Bytes::from(bytes.clone()))
            .ok_or_else(|| TrackerError::ArtifactUnavailable {
                job_id: job_id.clone(),
                kind: FailureKind::HttpStatus(404),
            })
    }
}

/// Projector that records every call for later inspection.
#[derive(Clone, Default)]
pub struct RecordingProjector {
    rows: Arc<Mutex<Vec<JobRowView>>>,
    artifacts: Arc<Mutex<Vec<(JobId, PathBuf)>>>,
}

impl RecordingProjector {
    pub fn rows(&self) -> Vec<JobRowView> {
        self.rows.lock().unwrap().clone()
    }

    pub fn artifacts(&self) -> Vec<(JobId, PathBuf)> {
        self.artifacts.lock().unwrap().clone()
    }
}

impl Projector for RecordingProjector {
    fn project(&mut self, row: &JobRowView) {
        self.rows.lock().unwrap().push(row.clone());
    }

    fn artifact_saved(&mut self, job_id: &JobId, path: &Path) {
        self.artifacts
            .lock()
            .unwrap()
            .push((job_id.clone(), path.to_path_buf()));
    }
}

pub fn snapshot(progress: u64, total: u64, logs: &[&str], done: bool, error: Option<&str>) -> JobState {
    JobState {
        status: if error.is_some() {
            "failed".to_string()
        } else if done {
            "completed".to_string()
        } else {
            "running".to_string()
        },
        progress,
        total,
        logs: logs.iter().map(|line| line.to_string()).collect(),
        done,
        error: error.map(ToOwned::to_owned),
        ..JobState::default()
    }
}
