use serde::Deserialize;
use tracker_core::{JobId, JobState, PLACEHOLDER_STATUS};

use crate::{FailureKind, StartResponse};

#[derive(Debug, Deserialize)]
struct StartBody {
    job_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotBody {
    #[serde(default)]
    progress: u64,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    uploaded: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    seq: Option<u64>,
}

pub(crate) fn decode_start(body: &[u8]) -> Result<StartResponse, FailureKind> {
    let parsed: StartBody = serde_json::from_slice(body)
        .map_err(|err| FailureKind::MalformedBody(err.to_string()))?;
    if parsed.job_id.is_empty() {
        return Err(FailureKind::MalformedBody("empty job_id".to_string()));
    }
    Ok(StartResponse {
        job_id: JobId::new(parsed.job_id),
        status: parsed.status,
    })
}

pub(crate) fn decode_snapshot(job_id: &JobId, body: &[u8]) -> Result<JobState, FailureKind> {
    let parsed: SnapshotBody = serde_json::from_slice(body)
        .map_err(|err| FailureKind::MalformedBody(err.to_string()))?;
    Ok(JobState {
        id: job_id.clone(),
        status: parsed
            .status
            .unwrap_or_else(|| PLACEHOLDER_STATUS.to_string()),
        progress: parsed.progress,
        total: parsed.total,
        uploaded: parsed.uploaded,
        logs: parsed.logs,
        error: parsed.error,
        done: parsed.done,
        seq: parsed.seq,
    })
}
