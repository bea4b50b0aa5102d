use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

use crate::{AppState, ApplyOutcome, Effect, JobId, JobState, Msg, Stage};

/// Pure update function: applies a message to state and returns any effects.
///
/// Effects are ordered: the caller must run them before dispatching the next
/// message, which is what makes closing a stream on a terminal snapshot
/// atomic with the store update.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartAccepted { job_id, status } => {
            tracker_info!("Job {} accepted, tracking", job_id);
            let placeholder = JobState::placeholder(job_id.clone(), status);
            let store = state.store_mut();
            store.seed(placeholder);
            store.mark_live(&job_id);
            let tracked = store.tracked_ids();
            vec![
                Effect::Render {
                    job_id: job_id.clone(),
                },
                Effect::PersistTracked { job_ids: tracked },
                Effect::Subscribe { job_id },
            ]
        }
        Msg::ReconcileStarted { job_ids } => {
            tracker_info!("Reconciling {} tracked job(s)", job_ids.len());
            state.begin_reconcile(job_ids);
            Vec::new()
        }
        Msg::SnapshotFetched { job_id, snapshot } => {
            if !state.finish_reconcile_of(&job_id) {
                tracker_debug!("Ignoring unsolicited snapshot for job {}", job_id);
                return (state, Vec::new());
            }
            let mut effects = apply_snapshot(&mut state, &job_id, snapshot);
            let store = state.store_mut();
            if !store.is_live(&job_id) && store.mark_live(&job_id) {
                effects.push(Effect::Subscribe { job_id });
            }
            effects
        }
        Msg::SnapshotUnavailable { job_id, reason } => {
            state.finish_reconcile_of(&job_id);
            tracker_warn!(
                "Snapshot unavailable for job {}, dropping it: {}",
                job_id,
                reason
            );
            let store = state.store_mut();
            if store.untrack(&job_id) {
                vec![Effect::PersistTracked {
                    job_ids: state.store().tracked_ids(),
                }]
            } else {
                Vec::new()
            }
        }
        Msg::ReconcileFinished => {
            let abandoned = state.abandon_reconcile();
            for job_id in &abandoned {
                tracker_warn!("Job {} never resolved during reconciliation", job_id);
            }
            let store = state.store_mut();
            for job_id in &abandoned {
                store.untrack(job_id);
            }
            store.retain_active_tracked();
            let tracked = store.tracked_ids();
            tracker_info!("Reconciliation finished, {} job(s) still active", tracked.len());
            vec![Effect::PersistTracked { job_ids: tracked }]
        }
        Msg::StreamSnapshot { job_id, snapshot } => {
            if !state.store().is_live(&job_id) {
                tracker_debug!("Dropping snapshot for job {} without a live stream", job_id);
                return (state, Vec::new());
            }
            apply_snapshot(&mut state, &job_id, snapshot)
        }
        Msg::StreamFault { job_id, message } => {
            tracker_warn!("Stream fault for job {}: {}", job_id, message);
            Vec::new()
        }
    };

    (state, effects)
}

fn apply_snapshot(state: &mut AppState, job_id: &JobId, snapshot: JobState) -> Vec<Effect> {
    let outcome = state.store_mut().apply(job_id, snapshot);
    let ApplyOutcome::Applied {
        stage,
        became_terminal,
        tracked_changed,
    } = outcome
    else {
        tracker_debug!("Snapshot for job {} ignored: {:?}", job_id, outcome);
        return Vec::new();
    };

    let mut effects = vec![Effect::Render {
        job_id: job_id.clone(),
    }];
    if became_terminal {
        tracker_info!("Job {} reached terminal stage {:?}", job_id, stage);
        effects.push(Effect::Unsubscribe {
            job_id: job_id.clone(),
        });
    }
    if tracked_changed {
        effects.push(Effect::PersistTracked {
            job_ids: state.store().tracked_ids(),
        });
    }
    if became_terminal && stage == Stage::Completed {
        effects.push(Effect::FetchArtifact {
            job_id: job_id.clone(),
        });
    }
    effects
}
