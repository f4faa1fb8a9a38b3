// ── EntityStore reducer ──
//
// Folds record-level events into one model's id -> entry map. Server data
// is canonical: every successful fetch replaces the entry wholesale.

use std::sync::Arc;

use crate::event::CrudEvent;
use crate::model::{ById, RecordEntry, RecordId};

/// Apply `event` to a model's `by_id` map.
///
/// Events that do not concern records return the same `Arc`.
pub fn reduce_by_id(by_id: &Arc<ById>, event: &CrudEvent) -> Arc<ById> {
    match event {
        CrudEvent::FetchSucceeded {
            payload,
            fetch_time,
            ..
        } => {
            let mut next = ById::clone(by_id);
            for (id, record) in &payload.records {
                next.insert(id.clone(), RecordEntry::fetched(record.clone(), *fetch_time));
            }
            Arc::new(next)
        }
        CrudEvent::FetchOneStarted { id, .. } => with_entry(by_id, id, RecordEntry::in_flight()),
        CrudEvent::FetchOneSucceeded {
            id,
            record,
            fetch_time,
            ..
        }
        | CrudEvent::CreateSucceeded {
            id,
            record,
            fetch_time,
            ..
        }
        | CrudEvent::UpdateSucceeded {
            id,
            record,
            fetch_time,
            ..
        } => with_entry(by_id, id, RecordEntry::fetched(record.clone(), *fetch_time)),
        CrudEvent::FetchOneFailed {
            id,
            error,
            fetch_time,
            ..
        } => with_entry(by_id, id, RecordEntry::failed(error.clone(), *fetch_time)),
        CrudEvent::DeleteSucceeded { id, .. } => {
            if !by_id.contains_key(id) {
                return Arc::clone(by_id);
            }
            let mut next = ById::clone(by_id);
            next.remove(id);
            Arc::new(next)
        }
        // UpdateStarted leaves fetch_time alone so dependent collections
        // are not invalidated while the write is in flight.
        _ => Arc::clone(by_id),
    }
}

fn with_entry(by_id: &Arc<ById>, id: &RecordId, entry: RecordEntry) -> Arc<ById> {
    let mut next = ById::clone(by_id);
    next.insert(id.clone(), entry);
    Arc::new(next)
}
