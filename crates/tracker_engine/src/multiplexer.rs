use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracker_core::JobId;
use tracker_logging::{tracker_debug, tracker_info};

use crate::client::{Backend, JobStream};
use crate::StreamItem;

/// Item forwarded from a subscription task, tagged with the subscription that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub job_id: JobId,
    pub generation: u64,
    pub item: StreamItem,
}

struct Subscription {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns at most one live subscription per job.
///
/// Every subscription gets a fresh generation number; events from a closed
/// or replaced subscription fail [`StreamMultiplexer::accepts`] even if they
/// were already queued when it was closed.
pub struct StreamMultiplexer {
    backend: Arc<dyn Backend>,
    events: mpsc::UnboundedSender<StreamEvent>,
    subscriptions: HashMap<JobId, Subscription>,
    next_generation: u64,
}

impl StreamMultiplexer {
    pub fn new(backend: Arc<dyn Backend>, events: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            backend,
            events,
            subscriptions: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Opens a stream for `job_id`, cancelling any existing one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&mut self, job_id: &JobId) -> u64 {
        self.unsubscribe(job_id);

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancellationToken::new();
        let stream = self.backend.open_stream(job_id);
        let task = tokio::spawn(forward(
            job_id.clone(),
            generation,
            stream,
            cancel.clone(),
            self.events.clone(),
        ));

        tracker_info!("Subscribed to job {} (generation {})", job_id, generation);
        self.subscriptions.insert(
            job_id.clone(),
            Subscription {
                generation,
                cancel,
                task,
            },
        );
        generation
    }

    /// Cancels the subscription for `job_id`. Returns false when there was none.
    pub fn unsubscribe(&mut self, job_id: &JobId) -> bool {
        match self.subscriptions.remove(job_id) {
            Some(subscription) => {
                subscription.cancel.cancel();
                tracker_info!(
                    "Unsubscribed from job {} (generation {})",
                    job_id,
                    subscription.generation
                );
                true
            }
            None => false,
        }
    }

    /// Whether an event produced by `generation` may still be applied.
    pub fn accepts(&self, job_id: &JobId, generation: u64) -> bool {
        self.subscriptions
            .get(job_id)
            .is_some_and(|subscription| subscription.generation == generation)
    }

    pub fn is_subscribed(&self, job_id: &JobId) -> bool {
        self.subscriptions.contains_key(job_id)
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn active_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<_> = self.subscriptions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancels every subscription and waits for the forwarding tasks to exit.
    pub async fn close_all(&mut self) {
        let subscriptions: Vec<_> = self.subscriptions.drain().collect();
        for (_, subscription) in &subscriptions {
            subscription.cancel.cancel();
        }
        for (job_id, subscription) in subscriptions {
            if let Err(err) = subscription.task.await {
                tracker_debug!("Stream task for job {} ended abnormally: {}", job_id, err);
            }
        }
    }
}

impl Drop for StreamMultiplexer {
    fn drop(&mut self) {
        for subscription in self.subscriptions.values() {
            subscription.cancel.cancel();
        }
    }
}

async fn forward(
    job_id: JobId,
    generation: u64,
    mut stream: JobStream,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = stream.next() => {
                let Some(item) = item else {
                    tracker_debug!("Stream for job {} ended", job_id);
                    break;
                };
                let event = StreamEvent {
                    job_id: job_id.clone(),
                    generation,
                    item,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    }
    // Dropping `stream` here releases the transport.
}
