// ── Top-level composition ──
//
// Routes each event to its model slice and to the sub-reducers its kind
// needs. Only the touched spine is copied; everything else is shared by
// pointer with the previous snapshot.

use std::sync::Arc;

use tracing::trace;

use super::{reduce_action_status, reduce_by_id, reduce_collections};
use crate::event::CrudEvent;
use crate::model::{CrudState, ModelStore};

/// A slice of a [`ModelStore`], used as a key in an [`update_in`] path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    ById,
    Collections,
    ActionStatus,
}

/// Fold one event into the state tree.
///
/// Returns the same `Arc` when nothing changed, so subscribers can skip
/// identical snapshots.
pub fn reduce(state: &Arc<CrudState>, event: &CrudEvent) -> Arc<CrudState> {
    use Slice::{ActionStatus as Status, ById as Records, Collections as Lists};

    trace!(kind = event.kind_name(), model = ?event.model(), "reducing event");

    match event {
        CrudEvent::ClearModel { model } => {
            Arc::new(state.with_model(model, Arc::new(ModelStore::default())))
        }
        CrudEvent::ClearActionStatus { model, .. } => update_in(state, model, &[Status], event),
        CrudEvent::GarbageCollect { .. } => collect_garbage(state, event),

        CrudEvent::FetchStarted { model, .. }
        | CrudEvent::FetchSucceeded { model, .. }
        | CrudEvent::FetchFailed { model, .. } => update_in(state, model, &[Lists, Records], event),

        CrudEvent::FetchOneStarted { model, .. }
        | CrudEvent::FetchOneSucceeded { model, .. }
        | CrudEvent::FetchOneFailed { model, .. } => update_in(state, model, &[Records], event),

        CrudEvent::CreateStarted { model } | CrudEvent::CreateFailed { model, .. } => {
            update_in(state, model, &[Status], event)
        }
        CrudEvent::CreateSucceeded { model, .. } => {
            update_in(state, model, &[Records, Lists, Status], event)
        }

        CrudEvent::UpdateStarted { model, .. }
        | CrudEvent::UpdateSucceeded { model, .. }
        | CrudEvent::UpdateFailed { model, .. } => {
            update_in(state, model, &[Records, Status], event)
        }

        CrudEvent::DeleteStarted { model, .. }
        | CrudEvent::DeleteSucceeded { model, .. }
        | CrudEvent::DeleteFailed { model, .. } => {
            update_in(state, model, &[Records, Lists, Status], event)
        }

        CrudEvent::Custom { .. } => Arc::clone(state),
    }
}

/// Apply the reducers for `slices`, in order, to one model.
///
/// A model seen for the first time is materialized with defaults.
///
/// # Panics
///
/// Panics if `slices` is empty. An empty path is a caller bug, not a no-op.
pub fn update_in(
    state: &Arc<CrudState>,
    model: &str,
    slices: &[Slice],
    event: &CrudEvent,
) -> Arc<CrudState> {
    assert!(!slices.is_empty(), "update_in needs at least one key");

    let Some(current) = state.model(model) else {
        let fresh = update_slices(&Arc::default(), slices, event);
        return Arc::new(state.with_model(model, fresh));
    };

    let next = update_slices(current, slices, event);
    if Arc::ptr_eq(current, &next) {
        return Arc::clone(state);
    }
    Arc::new(state.with_model(model, next))
}

fn update_slices(store: &Arc<ModelStore>, slices: &[Slice], event: &CrudEvent) -> Arc<ModelStore> {
    let Some((first, rest)) = slices.split_first() else {
        return Arc::clone(store);
    };

    let mut next = ModelStore::clone(store);
    let changed = match first {
        Slice::ById => {
            next.by_id = reduce_by_id(&store.by_id, event);
            !Arc::ptr_eq(&next.by_id, &store.by_id)
        }
        Slice::Collections => {
            next.collections = reduce_collections(&store.collections, event);
            !Arc::ptr_eq(&next.collections, &store.collections)
        }
        Slice::ActionStatus => {
            next.action_status = reduce_action_status(&store.action_status, event);
            !Arc::ptr_eq(&next.action_status, &store.action_status)
        }
    };

    let next = if changed {
        Arc::new(next)
    } else {
        Arc::clone(store)
    };
    update_slices(&next, rest, event)
}

/// Garbage collection is the one event that reaches every model.
fn collect_garbage(state: &Arc<CrudState>, event: &CrudEvent) -> Arc<CrudState> {
    let mut next: Option<CrudState> = None;
    for (name, store) in state.models() {
        let swept = update_slices(store, &[Slice::Collections, Slice::ById], event);
        if !Arc::ptr_eq(store, &swept) {
            let base = next.unwrap_or_else(|| CrudState::clone(state));
            next = Some(base.with_model(name, swept));
        }
    }
    next.map_or_else(|| Arc::clone(state), Arc::new)
}
