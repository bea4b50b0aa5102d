use std::collections::{BTreeMap, BTreeSet};

use crate::{JobId, JobState, Stage};

/// Why a snapshot was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The stored job already reached a terminal stage.
    AlreadyTerminal,
    /// Both snapshots carry `seq` and the incoming one is older.
    Stale { current: u64, incoming: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Ignored(IgnoreReason),
    Applied {
        stage: Stage,
        /// The job crossed from unknown/active into a terminal stage.
        became_terminal: bool,
        tracked_changed: bool,
    },
}

/// In-memory job map plus the tracked (persisted) and live (subscribed) key sets.
///
/// `tracked` only ever holds ids whose last known state is active, and `live`
/// is always a subset of the ids present in `jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobStore {
    jobs: BTreeMap<JobId, JobState>,
    tracked: BTreeSet<JobId>,
    live: BTreeSet<JobId>,
}

impl JobStore {
    pub fn get(&self, job_id: &JobId) -> Option<&JobState> {
        self.jobs.get(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobState> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_tracked(&self, job_id: &JobId) -> bool {
        self.tracked.contains(job_id)
    }

    pub fn tracked_ids(&self) -> Vec<JobId> {
        self.tracked.iter().cloned().collect()
    }

    pub fn is_live(&self, job_id: &JobId) -> bool {
        self.live.contains(job_id)
    }

    pub fn live_ids(&self) -> Vec<JobId> {
        self.live.iter().cloned().collect()
    }

    /// Stores an optimistic placeholder and starts tracking it.
    pub(crate) fn seed(&mut self, state: JobState) -> bool {
        let job_id = state.id.clone();
        self.jobs.insert(job_id.clone(), state);
        self.tracked.insert(job_id)
    }

    /// Overwrites the stored state in full and keeps `tracked`/`live` consistent.
    pub(crate) fn apply(&mut self, job_id: &JobId, mut snapshot: JobState) -> ApplyOutcome {
        if let Some(current) = self.jobs.get(job_id) {
            if current.is_terminal() {
                return ApplyOutcome::Ignored(IgnoreReason::AlreadyTerminal);
            }
            if let (Some(current), Some(incoming)) = (current.seq, snapshot.seq) {
                if incoming < current {
                    return ApplyOutcome::Ignored(IgnoreReason::Stale { current, incoming });
                }
            }
        }

        snapshot.id = job_id.clone();
        let stage = snapshot.stage();
        self.jobs.insert(job_id.clone(), snapshot);

        let tracked_changed = if stage.is_terminal() {
            self.live.remove(job_id);
            self.tracked.remove(job_id)
        } else {
            self.tracked.insert(job_id.clone())
        };

        ApplyOutcome::Applied {
            stage,
            // Stored terminal jobs were refused above.
            became_terminal: stage.is_terminal(),
            tracked_changed,
        }
    }

    /// Marks a known, active job as subscribed. Returns false when refused.
    pub(crate) fn mark_live(&mut self, job_id: &JobId) -> bool {
        match self.jobs.get(job_id) {
            Some(job) if !job.is_terminal() => {
                self.live.insert(job_id.clone());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn track(&mut self, job_id: JobId) -> bool {
        self.tracked.insert(job_id)
    }

    pub(crate) fn untrack(&mut self, job_id: &JobId) -> bool {
        self.tracked.remove(job_id)
    }

    /// Drops every tracked id that has no known active state.
    pub(crate) fn retain_active_tracked(&mut self) -> bool {
        let before = self.tracked.len();
        let jobs = &self.jobs;
        self.tracked
            .retain(|job_id| jobs.get(job_id).is_some_and(|job| !job.is_terminal()));
        before != self.tracked.len()
    }
}
