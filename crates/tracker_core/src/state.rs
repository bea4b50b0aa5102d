use std::collections::BTreeSet;

use crate::view_model::{AppViewModel, JobRowView};
use crate::{JobId, JobStore};

/// Single owned session state: the job store plus reconciliation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    store: JobStore,
    reconciling: BTreeSet<JobId>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            jobs: self.store.jobs().map(JobRowView::from_state).collect(),
            tracked: self.store.tracked_ids(),
            live_count: self.store.live_ids().len(),
        }
    }

    pub fn row(&self, job_id: &JobId) -> Option<JobRowView> {
        self.store.get(job_id).map(JobRowView::from_state)
    }

    pub(crate) fn store_mut(&mut self) -> &mut JobStore {
        &mut self.store
    }

    pub(crate) fn begin_reconcile(&mut self, job_ids: Vec<JobId>) {
        for job_id in job_ids {
            self.store.track(job_id.clone());
            self.reconciling.insert(job_id);
        }
    }

    /// Returns false when the id was not awaiting a reconciliation result.
    pub(crate) fn finish_reconcile_of(&mut self, job_id: &JobId) -> bool {
        self.reconciling.remove(job_id)
    }

    pub(crate) fn abandon_reconcile(&mut self) -> Vec<JobId> {
        std::mem::take(&mut self.reconciling).into_iter().collect()
    }
}
