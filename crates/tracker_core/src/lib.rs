//! Tracker core: pure job state machine, reconciliation decisions and view-model helpers.
mod effect;
mod endpoint;
mod job;
mod msg;
mod prefill;
mod state;
mod store;
mod update;
mod view_model;

pub use effect::Effect;
pub use endpoint::{normalize_base_uri, ApiBase, EndpointError, DEFAULT_ORIGIN};
pub use job::{JobId, JobState, Stage, PLACEHOLDER_STATUS};
pub use msg::Msg;
pub use prefill::{payload_from_link, PREFILL_PARAM};
pub use state::AppState;
pub use store::{ApplyOutcome, IgnoreReason, JobStore};
pub use update::update;
pub use view_model::{AppViewModel, JobRowView, LOG_TAIL_LINES};
