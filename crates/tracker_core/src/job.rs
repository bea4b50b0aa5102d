use std::fmt;

/// Status reported for a freshly started job before the backend says otherwise.
pub const PLACEHOLDER_STATUS: &str = "queued";

/// Opaque job identifier assigned by the backend at start time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct JobId(String);

impl JobId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for JobId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Lifecycle stage of a job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Active,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Stage::Active)
    }
}

/// Full point-in-time state of one job.
///
/// Every snapshot replaces the previous one wholesale; `logs` is the complete
/// log as last reported, never a diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobState {
    pub id: JobId,
    /// Informational only, taken verbatim from the backend.
    pub status: String,
    pub progress: u64,
    /// `0` means the backend has not reported a total yet.
    pub total: u64,
    pub uploaded: u64,
    pub logs: Vec<String>,
    pub error: Option<String>,
    pub done: bool,
    /// Optional server-side ordering stamp.
    pub seq: Option<u64>,
}

impl JobState {
    /// Optimistic state seeded right after a successful start call.
    pub fn placeholder(id: JobId, status: Option<String>) -> Self {
        Self {
            id,
            status: status.unwrap_or_else(|| PLACEHOLDER_STATUS.to_string()),
            ..Self::default()
        }
    }

    /// A reported error wins over `done` when both are set.
    pub fn stage(&self) -> Stage {
        if self.error.is_some() {
            Stage::Failed
        } else if self.done {
            Stage::Completed
        } else {
            Stage::Active
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage().is_terminal()
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.progress as f64 / self.total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(done: bool, error: Option<&str>) -> JobState {
        JobState {
            id: JobId::from("j"),
            done,
            error: error.map(ToOwned::to_owned),
            ..JobState::default()
        }
    }

    #[test]
    fn placeholder_is_queued_and_empty() {
        let job = JobState::placeholder(JobId::from("j1"), None);
        assert_eq!(job.status, "queued");
        assert_eq!((job.progress, job.total, job.done), (0, 0, false));
        assert_eq!(job.stage(), Stage::Active);
    }

    #[test]
    fn error_takes_priority_over_done() {
        assert_eq!(state(true, Some("boom")).stage(), Stage::Failed);
        assert_eq!(state(true, None).stage(), Stage::Completed);
        assert_eq!(state(false, Some("boom")).stage(), Stage::Failed);
        assert!(!state(false, None).is_terminal());
    }

    #[test]
    fn percent_is_zero_without_total() {
        let mut job = state(false, None);
        job.progress = 3;
        assert_eq!(job.percent(), 0.0);
        job.total = 4;
        assert_eq!(job.percent(), 75.0);
    }
}
