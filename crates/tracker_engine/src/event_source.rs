use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracker_core::JobId;
use tracker_logging::{tracker_debug, tracker_trace};

use crate::client::{map_reqwest_error, JobStream};
use crate::sse::SseDecoder;
use crate::wire::decode_snapshot;
use crate::{FailureKind, StreamItem};

/// Only events with this name carry job snapshots.
pub(crate) const PROGRESS_EVENT: &str = "progress";

const LAST_EVENT_ID: &str = "Last-Event-ID";

enum Phase {
    Connect,
    Open(BoxStream<'static, reqwest::Result<Bytes>>),
    Backoff,
}

/// Reconnecting server-push reader for one job.
///
/// Failures are yielded as [`StreamItem::Fault`] and followed by a reconnect
/// after the current retry delay; the sequence only ends when dropped.
pub(crate) struct EventSource {
    client: reqwest::Client,
    url: String,
    job_id: JobId,
    retry: Duration,
    decoder: SseDecoder,
    phase: Phase,
    pending: VecDeque<StreamItem>,
}

impl EventSource {
    pub(crate) fn new(client: reqwest::Client, url: String, job_id: JobId, retry: Duration) -> Self {
        Self {
            client,
            url,
            job_id,
            retry,
            decoder: SseDecoder::new(),
            phase: Phase::Connect,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn into_stream(self) -> JobStream {
        stream::unfold(self, |mut source| async move {
            let item = source.next_item().await;
            Some((item, source))
        })
        .boxed()
    }

    async fn next_item(&mut self) -> StreamItem {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return item;
            }

            match std::mem::replace(&mut self.phase, Phase::Backoff) {
                Phase::Connect => match open(self.request()).await {
                    Ok(body) => {
                        self.decoder.reset_frame();
                        self.phase = Phase::Open(body);
                    }
                    Err(kind) => return StreamItem::Fault(kind),
                },
                Phase::Open(mut body) => match body.next().await {
                    Some(Ok(chunk)) => {
                        self.absorb(&chunk);
                        self.phase = Phase::Open(body);
                    }
                    Some(Err(err)) => return StreamItem::Fault(map_reqwest_error(err)),
                    None => return StreamItem::Fault(FailureKind::Closed),
                },
                Phase::Backoff => {
                    tracker_debug!(
                        "Reconnecting stream for job {} in {:?}",
                        self.job_id,
                        self.retry
                    );
                    tokio::time::sleep(self.retry).await;
                    self.phase = Phase::Connect;
                }
            }
        }
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        match self.decoder.last_event_id() {
            Some(last_id) => request.header(LAST_EVENT_ID, last_id),
            None => request,
        }
    }

    fn absorb(&mut self, chunk: &[u8]) {
        for event in self.decoder.feed(chunk) {
            if event.event != PROGRESS_EVENT {
                tracker_trace!("Skipping '{}' event for job {}", event.event, self.job_id);
                continue;
            }
            let item = match decode_snapshot(&self.job_id, event.data.as_bytes()) {
                Ok(snapshot) => StreamItem::Snapshot(snapshot),
                Err(kind) => StreamItem::Fault(kind),
            };
            self.pending.push_back(item);
        }
        if let Some(retry_ms) = self.decoder.retry_ms() {
            self.retry = Duration::from_millis(retry_ms);
        }
    }
}

async fn open(
    request: reqwest::RequestBuilder,
) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, FailureKind> {
    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FailureKind::HttpStatus(status.as_u16()));
    }
    Ok(response.bytes_stream().boxed())
}
