//! Tracker engine: backend client, live stream multiplexing, persistence and effect execution.
mod client;
mod event_source;
mod multiplexer;
mod persist;
mod sse;
mod tracker;
mod types;
mod wire;

pub use client::{Backend, ClientSettings, JobStream, ReqwestBackend};
pub use multiplexer::{StreamEvent, StreamMultiplexer};
pub use persist::{
    ensure_output_dir, AtomicFileWriter, KeyValueStore, MemoryStore, PersistError,
    TrackerStorage, ENDPOINT_KEY, TRACKED_KEY,
};
pub use sse::{SseDecoder, SseEvent};
pub use tracker::{
    artifact_filename, parse_payload, Projector, ReconcileReport, Tracker,
    TrackerSettings,
};
pub use types::{FailureKind, StartResponse, StreamItem, TrackerError};
