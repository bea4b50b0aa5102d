use crate::{JobId, JobState, Stage};

/// Number of trailing log lines a compact projector should show.
pub const LOG_TAIL_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub jobs: Vec<JobRowView>,
    pub tracked: Vec<JobId>,
    pub live_count: usize,
}

/// Everything a projector needs to draw one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub stage: Stage,
    pub status: String,
    pub progress: u64,
    pub total: u64,
    pub uploaded: u64,
    pub percent: f64,
    pub logs: Vec<String>,
    /// User-facing failure line, set only for failed jobs.
    pub failure: Option<String>,
}

impl JobRowView {
    pub fn from_state(job: &JobState) -> Self {
        Self {
            job_id: job.id.clone(),
            stage: job.stage(),
            status: job.status.clone(),
            progress: job.progress,
            total: job.total,
            uploaded: job.uploaded,
            percent: job.percent(),
            logs: job.logs.clone(),
            failure: job
                .error
                .as_ref()
                .map(|error| format!("Job failed: {error}")),
        }
    }

    pub fn log_tail(&self) -> &[String] {
        let start = self.logs.len().saturating_sub(LOG_TAIL_LINES);
        &self.logs[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_row_carries_error_text() {
        let job = JobState {
            id: JobId::from("j2"),
            error: Some("disk full".to_string()),
            logs: vec!["a".to_string(), "b".to_string()],
            ..JobState::default()
        };
        let row = JobRowView::from_state(&job);
        assert_eq!(row.stage, Stage::Failed);
        assert_eq!(row.failure.as_deref(), Some("Job failed: disk full"));
        assert_eq!(row.logs, ["a", "b"]);
    }

    #[test]
    fn log_tail_keeps_newest_lines() {
        let job = JobState {
            logs: (0..8).map(|i| i.to_string()).collect(),
            ..JobState::default()
        };
        let row = JobRowView::from_state(&job);
        assert_eq!(row.log_tail(), ["3", "4", "5", "6", "7"]);
    }
}
