// ── Read-side selectors ──
//
// What UI code reads from a snapshot: resolved records plus the loading
// and staleness flags that decide whether to dispatch a fetch.

use serde_json::{Map, Value};

use crate::model::{
    ActionSlot, CrudState, FetchTime, Millis, QueryParams, RecordEntry, RecordId,
    RequestFailure, Verb,
};
use crate::store::find_collection;

/// One record as seen by a reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordView {
    pub record: Option<Value>,
    pub error: Option<RequestFailure>,
    pub is_loading: bool,
    pub needs_fetch: bool,
}

/// One cached list query as seen by a reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionView {
    /// Records in server order. Ids with no record entry are skipped.
    pub records: Vec<Value>,
    pub other_info: Map<String, Value>,
    pub error: Option<RequestFailure>,
    pub is_loading: bool,
    pub needs_fetch: bool,
}

fn needs_fetch(fetch_time: FetchTime, now: Millis) -> bool {
    match fetch_time {
        FetchTime::Unfetched => true,
        FetchTime::InFlight => false,
        FetchTime::At(_) => fetch_time.is_expired(now),
    }
}

pub fn select_record(state: &CrudState, model: &str, id: &RecordId, now: Millis) -> RecordView {
    let Some(RecordEntry {
        record,
        fetch_time,
        error,
    }) = state.record(model, id)
    else {
        return RecordView {
            needs_fetch: true,
            ..RecordView::default()
        };
    };

    RecordView {
        record: record.clone(),
        error: error.clone(),
        is_loading: fetch_time.is_in_flight(),
        needs_fetch: needs_fetch(*fetch_time, now),
    }
}

pub fn select_collection(
    state: &CrudState,
    model: &str,
    params: &QueryParams,
    now: Millis,
) -> CollectionView {
    let missing = CollectionView {
        needs_fetch: true,
        ..CollectionView::default()
    };
    let Some(store) = state.model(model) else {
        return missing;
    };
    let Some(index) = find_collection(&store.collections, params) else {
        return missing;
    };

    let entry = &store.collections[index];
    let records = entry
        .ids
        .iter()
        .filter_map(|id| store.by_id.get(id).and_then(|e| e.record.clone()))
        .collect();

    CollectionView {
        records,
        other_info: entry.other_info.clone(),
        error: entry.error.clone(),
        is_loading: entry.fetch_time.is_in_flight(),
        needs_fetch: needs_fetch(entry.fetch_time, now),
    }
}

/// Latest attempt for `verb`. `None` when no attempt was made or it was
/// cleared.
pub fn select_action_status(state: &CrudState, model: &str, verb: Verb) -> Option<ActionSlot> {
    state
        .model(model)
        .and_then(|store| store.action_status.slot(verb).cloned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::event::{CrudEvent, ListPayload};
    use crate::model::STALE_AFTER_MS;
    use crate::store::reduce;
    use serde_json::json;

    fn page_one() -> QueryParams {
        QueryParams::new().with("page", 1)
    }

    fn cached(at: Millis) -> Arc<CrudState> {
        reduce(
            &Arc::default(),
            &CrudEvent::FetchSucceeded {
                model: "books".into(),
                params: Some(page_one()),
                payload: ListPayload::from_value(json!({
                    "data": [{ "id": 2, "title": "B" }, { "id": 1, "title": "A" }],
                    "total": 2
                }))
                .unwrap(),
                fetch_time: at,
            },
        )
    }

    #[test]
    fn unknown_model_needs_fetch() {
        let state = CrudState::new();
        assert!(select_collection(&state, "books", &page_one(), 0).needs_fetch);
        assert!(select_record(&state, "books", &RecordId::Int(1), 0).needs_fetch);
        assert_eq!(select_action_status(&state, "books", Verb::Create), None);
    }

    #[test]
    fn fresh_collection_resolves_records_in_order() {
        let state = cached(1_000);
        let view = select_collection(&state, "books", &page_one(), 2_000);
        assert!(!view.needs_fetch);
        assert!(!view.is_loading);
        assert_eq!(view.records, vec![json!({ "id": 2, "title": "B" }), json!({ "id": 1, "title": "A" })]);
        assert_eq!(view.other_info.get("total"), Some(&json!(2)));
    }

    #[test]
    fn deleted_ids_are_skipped_and_list_needs_refetch() {
        let state = reduce(
            &cached(1_000),
            &CrudEvent::DeleteSucceeded {
                model: "books".into(),
                id: RecordId::Int(2),
                payload: None,
                fetch_time: 1_500,
            },
        );
        let view = select_collection(&state, "books", &page_one(), 2_000);
        assert!(view.needs_fetch);
        assert_eq!(view.records, vec![json!({ "id": 1, "title": "A" })]);
    }

    #[test]
    fn stale_entries_need_fetch() {
        let state = cached(1_000);
        let later = 1_000 + STALE_AFTER_MS;
        assert!(select_collection(&state, "books", &page_one(), later).needs_fetch);
        assert!(select_record(&state, "books", &RecordId::Int(1), later).needs_fetch);
        assert!(!select_record(&state, "books", &RecordId::Int(1), later - 1).needs_fetch);
    }

    #[test]
    fn in_flight_record_is_loading() {
        let state = reduce(
            &Arc::default(),
            &CrudEvent::FetchOneStarted {
                model: "books".into(),
                id: RecordId::Int(9),
            },
        );
        let view = select_record(&state, "books", &RecordId::Int(9), 0);
        assert!(view.is_loading);
        assert!(!view.needs_fetch);
        assert_eq!(view.record, None);
    }
}
