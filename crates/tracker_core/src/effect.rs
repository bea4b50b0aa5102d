use crate::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open (or reopen) the live stream for a job.
    Subscribe { job_id: JobId },
    /// Close the live stream for a job; no-op when none is open.
    Unsubscribe { job_id: JobId },
    /// Replace the persisted tracked set with exactly these ids.
    PersistTracked { job_ids: Vec<JobId> },
    /// Project the job's current state to the UI.
    Render { job_id: JobId },
    /// The job completed successfully; its artifact may be downloaded.
    FetchArtifact { job_id: JobId },
}
