use crate::{JobId, JobState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Backend accepted a start request and assigned an id.
    StartAccepted {
        job_id: JobId,
        status: Option<String>,
    },
    /// Persisted tracked ids were read; reconciliation begins.
    ReconcileStarted { job_ids: Vec<JobId> },
    /// Server-truth snapshot fetched for a tracked id during reconciliation.
    SnapshotFetched { job_id: JobId, snapshot: JobState },
    /// Snapshot fetch failed; the id is dropped for this session.
    SnapshotUnavailable { job_id: JobId, reason: String },
    /// Every tracked id has been resolved.
    ReconcileFinished,
    /// Live stream delivered a full snapshot.
    StreamSnapshot { job_id: JobId, snapshot: JobState },
    /// Transport-level error on a live stream. Informational only.
    StreamFault { job_id: JobId, message: String },
}
