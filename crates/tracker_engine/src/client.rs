use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracker_core::{ApiBase, JobId, JobState};
use tracker_logging::{tracker_debug, tracker_info};

use crate::event_source::EventSource;
use crate::wire::{decode_snapshot, decode_start};
use crate::{FailureKind, StartResponse, StreamItem, TrackerError};

/// Lazy, infinite, cancelable sequence of snapshots for one job.
///
/// Dropping the stream releases the underlying connection.
pub type JobStream = BoxStream<'static, StreamItem>;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base: ApiBase,
    /// Wait before reconnecting a dropped event stream, until the server
    /// sends its own `retry:` value.
    pub reconnect_delay: Duration,
    /// Applies to start, snapshot and download calls only, never to streams.
    pub request_timeout: Option<Duration>,
}

impl ClientSettings {
    pub fn new(base: ApiBase) -> Self {
        Self {
            base,
            reconnect_delay: Duration::from_secs(3),
            request_timeout: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn start(&self, payload: &serde_json::Value) -> Result<StartResponse, TrackerError>;

    async fn fetch_snapshot(&self, job_id: &JobId) -> Result<JobState, TrackerError>;

    /// Opening twice for the same id yields two independent streams.
    fn open_stream(&self, job_id: &JobId) -> JobStream;

    async fn download(&self, job_id: &JobId) -> Result<Bytes, TrackerError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: ClientSettings) -> Result<Self, FailureKind> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|_| FailureKind::Network)?;
        Ok(Self { settings, client })
    }

    fn with_timeout(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.settings.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn read_success(&self, request: reqwest::RequestBuilder) -> Result<Bytes, FailureKind> {
        let response = self
            .with_timeout(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FailureKind::HttpStatus(status.as_u16()));
        }
        response.bytes().await.map_err(map_reqwest_error)
    }
}

#[async_trait::async_trait]
impl Backend for ReqwestBackend {
    async fn start(&self, payload: &serde_json::Value) -> Result<StartResponse, TrackerError> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| TrackerError::InvalidPayload(err.to_string()))?;
        let request = self
            .client
            .post(self.settings.base.url("/start"))
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        let bytes = self
            .read_success(request)
            .await
            .map_err(TrackerError::StartRejected)?;
        let started = decode_start(&bytes).map_err(TrackerError::StartRejected)?;
        tracker_info!("Backend started job {}", started.job_id);
        Ok(started)
    }

    async fn fetch_snapshot(&self, job_id: &JobId) -> Result<JobState, TrackerError> {
        let url = self.settings.base.url(&format!("/progress/{job_id}"));
        let unavailable = |kind: FailureKind| TrackerError::SnapshotUnavailable {
            job_id: job_id.clone(),
            kind,
        };

        let bytes = self
            .read_success(self.client.get(url))
            .await
            .map_err(unavailable)?;
        decode_snapshot(job_id, &bytes).map_err(unavailable)
    }

    fn open_stream(&self, job_id: &JobId) -> JobStream {
        let url = self.settings.base.url(&format!("/progress-stream/{job_id}"));
        tracker_debug!("Opening event stream {}", url);
        EventSource::new(
            self.client.clone(),
            url,
            job_id.clone(),
            self.settings.reconnect_delay,
        )
        .into_stream()
    }

    async fn download(&self, job_id: &JobId) -> Result<Bytes, TrackerError> {
        let url = self.settings.base.url(&format!("/download/{job_id}"));
        let request = self.client.get(url).header(ACCEPT, "application/zip");
        self.read_success(request)
            .await
            .map_err(|kind| TrackerError::ArtifactUnavailable {
                job_id: job_id.clone(),
                kind,
            })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        return FailureKind::Timeout;
    }
    if err.is_builder() {
        return FailureKind::InvalidUrl;
    }
    FailureKind::Network
}
