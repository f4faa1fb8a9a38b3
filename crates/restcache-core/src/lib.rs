//! Normalized client-side cache for REST resources.
//!
//! Two halves, tightly coupled:
//!
//! - **Reducers** ([`store`]): pure, replayable transitions that fold
//!   [`CrudEvent`]s into a [`CrudState`]: one [`ModelStore`] per model with
//!   id-keyed records (`byId`), parameterized list queries (`collections`)
//!   and the latest create/update/delete attempt (`actionStatus`). Every
//!   snapshot shares untouched slices with its predecessor by `Arc`.
//!
//! - **[`Orchestrator`]**: async runtime around the reducers.
//!   [`start()`](Orchestrator::start) spawns one worker per [`IntentKind`],
//!   a single state writer, and the GC timer that evicts stale collections.
//!   [`dispatch()`](Orchestrator::dispatch) takes an [`Intent`], issues the
//!   HTTP call through a [`restcache_api::Transport`], and folds the outcome
//!   back in. Failed requests show up as `error` fields in the state, never
//!   as `Err`.
//!
//! Readers take snapshots with [`Orchestrator::state()`] or subscribe with
//! [`Orchestrator::subscribe()`], and use the [`select`] helpers to decide
//! what to render and what to fetch.

pub mod config;
pub mod error;
pub mod event;
pub mod intent;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod select;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{GcConfig, OrchestratorConfig};
pub use error::CoreError;
pub use event::{CrudEvent, ListPayload, WireEvent, WireMeta};
pub use intent::{ApiRequest, Intent, IntentKind};
pub use model::{
    ActionPayload, ActionSlot, ActionStatus, CollectionEntry, CrudState, FetchTime, Millis,
    ModelStore, QueryParams, RecordEntry, RecordId, RequestFailure, STALE_AFTER_MS, Verb,
};
pub use normalize::{FlatNormalizer, Normalized, NormalizeError, Normalizer, Schema};
pub use orchestrator::{Clock, Orchestrator, OrchestratorBuilder, RunState};
pub use select::{
    CollectionView, RecordView, select_action_status, select_collection, select_record,
};
pub use store::{Slice, reduce, update_in};
pub use stream::{StateStream, StateWatchStream};
