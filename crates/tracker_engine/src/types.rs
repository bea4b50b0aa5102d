use std::fmt;

use tracker_core::{JobId, JobState};

use crate::persist::PersistError;

/// Transport-level classification of a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    MalformedBody(String),
    /// The server ended the event stream.
    Closed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::MalformedBody(reason) => write!(f, "malformed body: {reason}"),
            FailureKind::Closed => write!(f, "stream closed by server"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("invalid job parameters: {0}")]
    InvalidPayload(String),
    #[error("start rejected: {0}")]
    StartRejected(FailureKind),
    #[error("snapshot unavailable for job {job_id}: {kind}")]
    SnapshotUnavailable { job_id: JobId, kind: FailureKind },
    #[error("stream fault for job {job_id}: {kind}")]
    StreamFault { job_id: JobId, kind: FailureKind },
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: JobId, message: String },
    #[error("artifact unavailable for job {job_id}: {kind}")]
    ArtifactUnavailable { job_id: JobId, kind: FailureKind },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Response to a successful start call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResponse {
    pub job_id: JobId,
    pub status: Option<String>,
}

/// One element of a job's live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Snapshot(JobState),
    /// Out-of-band transport error; the stream keeps going.
    Fault(FailureKind),
}
