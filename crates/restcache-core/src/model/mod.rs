// ── Domain model ──
//
// Identity, query parameters, cache entries, action status, and the
// state tree they compose into.

pub mod action;
pub mod entry;
pub mod failure;
pub mod params;
pub mod record_id;
pub mod state;

pub use action::{ActionOutcome, ActionPayload, ActionSlot, ActionStatus, Verb};
pub use entry::{
    CollectionEntry, FetchTime, Millis, RecordEntry, STALE_AFTER_MS, now_millis,
};
pub use failure::RequestFailure;
pub use params::QueryParams;
pub use record_id::RecordId;
pub use state::{ById, CrudState, ModelStore};
