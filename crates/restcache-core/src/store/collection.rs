// ── CollectionIndex reducer ──
//
// One model's cached list queries, each identified by its params. Lookup
// is a linear scan with field-by-field params equality; the list stays
// short because GC evicts stale queries.

use std::sync::Arc;

use crate::event::CrudEvent;
use crate::model::{CollectionEntry, FetchTime, QueryParams};

/// Position of the entry cached for `params`, if any.
pub fn find_collection(collections: &[CollectionEntry], params: &QueryParams) -> Option<usize> {
    collections.iter().position(|entry| entry.params == *params)
}

/// Transition of a single collection entry for a list-fetch event.
///
/// `entry` is the matching cached entry, or `None` to start from an
/// empty one. Non-fetch events return the entry unchanged.
pub fn reduce_collection(entry: Option<&CollectionEntry>, event: &CrudEvent) -> CollectionEntry {
    let mut next = entry.cloned().unwrap_or_default();
    match event {
        CrudEvent::FetchStarted { params, .. } => {
            next.params = params.clone().unwrap_or_default();
            next.fetch_time = FetchTime::InFlight;
            next.error = None;
        }
        CrudEvent::FetchSucceeded {
            params,
            payload,
            fetch_time,
            ..
        } => {
            next.params = params.clone().unwrap_or_default();
            next.ids = payload.ids().cloned().collect();
            next.other_info = payload.other_info.clone();
            next.fetch_time = FetchTime::At(*fetch_time);
            next.error = None;
        }
        // Keep the last good ids and fetch time.
        CrudEvent::FetchFailed { params, error, .. } => {
            next.params = params.clone().unwrap_or_default();
            next.error = Some(error.clone());
        }
        _ => {}
    }
    next
}

/// Apply `event` to a model's collection list.
///
/// Unchanged lists are returned as the same `Arc`.
pub fn reduce_collections(
    collections: &Arc<Vec<CollectionEntry>>,
    event: &CrudEvent,
) -> Arc<Vec<CollectionEntry>> {
    match event {
        CrudEvent::FetchStarted { params, .. }
        | CrudEvent::FetchSucceeded { params, .. }
        | CrudEvent::FetchFailed { params, .. } => {
            // A fetch without params has no target entry.
            let Some(params) = params else {
                return Arc::clone(collections);
            };
            let mut next = Vec::clone(collections);
            match find_collection(&next, params) {
                Some(index) => next[index] = reduce_collection(Some(&next[index]), event),
                None => next.push(reduce_collection(None, event)),
            }
            Arc::new(next)
        }
        CrudEvent::CreateSucceeded { .. } | CrudEvent::DeleteSucceeded { .. } => {
            invalidate_all(collections)
        }
        CrudEvent::GarbageCollect { now } => evict_expired(collections, *now),
        _ => Arc::clone(collections),
    }
}

/// Mark every entry for refetch, keeping `params` and `ids`.
fn invalidate_all(collections: &Arc<Vec<CollectionEntry>>) -> Arc<Vec<CollectionEntry>> {
    if collections
        .iter()
        .all(|entry| entry.fetch_time == FetchTime::Unfetched)
    {
        return Arc::clone(collections);
    }
    let next = collections
        .iter()
        .map(|entry| CollectionEntry {
            fetch_time: FetchTime::Unfetched,
            ..entry.clone()
        })
        .collect();
    Arc::new(next)
}

fn evict_expired(collections: &Arc<Vec<CollectionEntry>>, now: i64) -> Arc<Vec<CollectionEntry>> {
    if !collections.iter().any(|entry| entry.fetch_time.is_expired(now)) {
        return Arc::clone(collections);
    }
    let kept: Vec<CollectionEntry> = collections
        .iter()
        .filter(|entry| !entry.fetch_time.is_expired(now))
        .cloned()
        .collect();
    tracing::trace!(
        evicted = collections.len() - kept.len(),
        kept = kept.len(),
        "evicted stale collections"
    );
    Arc::new(kept)
}
