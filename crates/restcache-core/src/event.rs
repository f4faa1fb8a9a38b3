// ── Lifecycle events ──
//
// Every state transition is driven by one CrudEvent. The enum is closed:
// each variant carries exactly the fields its kind needs, so a reducer
// can never read something its event does not set. `WireEvent` is the
// loose JSON form (`{type, payload, meta, error}`) used at the UI boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::model::{Millis, QueryParams, RecordId, RequestFailure, Verb};
use crate::normalize::json_kind;

// ── Wire type names ──────────────────────────────────────────────────

pub const FETCH: &str = "FETCH";
pub const FETCH_SUCCESS: &str = "FETCH_SUCCESS";
pub const FETCH_ERROR: &str = "FETCH_ERROR";
pub const FETCH_ONE: &str = "FETCH_ONE";
pub const FETCH_ONE_SUCCESS: &str = "FETCH_ONE_SUCCESS";
pub const FETCH_ONE_ERROR: &str = "FETCH_ONE_ERROR";
pub const CREATE: &str = "CREATE";
pub const CREATE_SUCCESS: &str = "CREATE_SUCCESS";
pub const CREATE_ERROR: &str = "CREATE_ERROR";
pub const UPDATE: &str = "UPDATE";
pub const UPDATE_SUCCESS: &str = "UPDATE_SUCCESS";
pub const UPDATE_ERROR: &str = "UPDATE_ERROR";
pub const DELETE: &str = "DELETE";
pub const DELETE_SUCCESS: &str = "DELETE_SUCCESS";
pub const DELETE_ERROR: &str = "DELETE_ERROR";
pub const CLEAR_ACTION_STATUS: &str = "CLEAR_ACTION_STATUS";
pub const CLEAR_MODEL_DATA: &str = "CLEAR_MODEL_DATA";
pub const GARBAGE_COLLECT: &str = "GARBAGE_COLLECT";

// ── ListPayload ──────────────────────────────────────────────────────

/// Successful list-fetch payload: the records in server order plus any
/// sibling envelope fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPayload {
    pub records: Vec<(RecordId, Value)>,
    pub other_info: Map<String, Value>,
}

impl ListPayload {
    /// Accept a bare list or a `{ "data": [...], ...meta }` envelope.
    /// Every record must carry an `id`.
    pub fn from_value(payload: Value) -> Result<Self, String> {
        let (data, other_info) = match payload {
            Value::Array(items) => (items, Map::new()),
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => (items, map),
                Some(_) => return Err("envelope `data` is not a list".into()),
                None => return Err("payload is neither a list nor a `data` envelope".into()),
            },
            other => return Err(format!("expected a list payload, got {}", json_kind(&other))),
        };

        let records = data
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                RecordId::of_record(&record, "id")
                    .map(|id| (id, record))
                    .ok_or_else(|| format!("record at index {index} has no usable `id`"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            records,
            other_info,
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.iter().map(|(id, _)| id)
    }

    /// Bare list when there is no envelope metadata, envelope otherwise.
    pub fn to_value(&self) -> Value {
        let data: Vec<Value> = self.records.iter().map(|(_, r)| r.clone()).collect();
        if self.other_info.is_empty() {
            return Value::Array(data);
        }
        let mut map = self.other_info.clone();
        map.insert("data".into(), Value::Array(data));
        Value::Object(map)
    }
}

// ── CrudEvent ────────────────────────────────────────────────────────

/// A lifecycle event folded into the cache by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum CrudEvent {
    FetchStarted {
        model: String,
        params: Option<QueryParams>,
    },
    FetchSucceeded {
        model: String,
        params: Option<QueryParams>,
        payload: ListPayload,
        fetch_time: Millis,
    },
    FetchFailed {
        model: String,
        params: Option<QueryParams>,
        error: RequestFailure,
        fetch_time: Millis,
    },
    FetchOneStarted {
        model: String,
        id: RecordId,
    },
    FetchOneSucceeded {
        model: String,
        id: RecordId,
        record: Value,
        fetch_time: Millis,
    },
    FetchOneFailed {
        model: String,
        id: RecordId,
        error: RequestFailure,
        fetch_time: Millis,
    },
    CreateStarted {
        model: String,
    },
    CreateSucceeded {
        model: String,
        id: RecordId,
        record: Value,
        fetch_time: Millis,
    },
    CreateFailed {
        model: String,
        error: RequestFailure,
        fetch_time: Millis,
    },
    UpdateStarted {
        model: String,
        id: RecordId,
    },
    UpdateSucceeded {
        model: String,
        id: RecordId,
        record: Value,
        fetch_time: Millis,
    },
    UpdateFailed {
        model: String,
        id: RecordId,
        error: RequestFailure,
        fetch_time: Millis,
    },
    DeleteStarted {
        model: String,
        id: RecordId,
    },
    DeleteSucceeded {
        model: String,
        id: RecordId,
        payload: Option<Value>,
        fetch_time: Millis,
    },
    DeleteFailed {
        model: String,
        id: RecordId,
        error: RequestFailure,
        fetch_time: Millis,
    },
    ClearActionStatus {
        model: String,
        verb: Verb,
    },
    ClearModel {
        model: String,
    },
    /// Evict stale collections in every model, relative to `now`.
    GarbageCollect {
        now: Millis,
    },
    /// Result of a generic API call under a caller-chosen name. The cache
    /// ignores it; subscribers to the event feed see it.
    Custom {
        name: String,
        model: Option<String>,
        payload: Value,
        error: bool,
        fetch_time: Option<Millis>,
    },
}

impl CrudEvent {
    /// Wire type name, e.g. `FETCH_SUCCESS`.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::FetchStarted { .. } => FETCH,
            Self::FetchSucceeded { .. } => FETCH_SUCCESS,
            Self::FetchFailed { .. } => FETCH_ERROR,
            Self::FetchOneStarted { .. } => FETCH_ONE,
            Self::FetchOneSucceeded { .. } => FETCH_ONE_SUCCESS,
            Self::FetchOneFailed { .. } => FETCH_ONE_ERROR,
            Self::CreateStarted { .. } => CREATE,
            Self::CreateSucceeded { .. } => CREATE_SUCCESS,
            Self::CreateFailed { .. } => CREATE_ERROR,
            Self::UpdateStarted { .. } => UPDATE,
            Self::UpdateSucceeded { .. } => UPDATE_SUCCESS,
            Self::UpdateFailed { .. } => UPDATE_ERROR,
            Self::DeleteStarted { .. } => DELETE,
            Self::DeleteSucceeded { .. } => DELETE_SUCCESS,
            Self::DeleteFailed { .. } => DELETE_ERROR,
            Self::ClearActionStatus { .. } => CLEAR_ACTION_STATUS,
            Self::ClearModel { .. } => CLEAR_MODEL_DATA,
            Self::GarbageCollect { .. } => GARBAGE_COLLECT,
            Self::Custom { name, .. } => name,
        }
    }

    /// Target model. `None` for garbage collection, which spans every model.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::FetchStarted { model, .. }
            | Self::FetchSucceeded { model, .. }
            | Self::FetchFailed { model, .. }
            | Self::FetchOneStarted { model, .. }
            | Self::FetchOneSucceeded { model, .. }
            | Self::FetchOneFailed { model, .. }
            | Self::CreateStarted { model }
            | Self::CreateSucceeded { model, .. }
            | Self::CreateFailed { model, .. }
            | Self::UpdateStarted { model, .. }
            | Self::UpdateSucceeded { model, .. }
            | Self::UpdateFailed { model, .. }
            | Self::DeleteStarted { model, .. }
            | Self::DeleteSucceeded { model, .. }
            | Self::DeleteFailed { model, .. }
            | Self::ClearActionStatus { model, .. }
            | Self::ClearModel { model } => Some(model),
            Self::GarbageCollect { .. } => None,
            Self::Custom { model, .. } => model.as_deref(),
        }
    }

    /// Whether this event reports a failed request.
    pub fn is_error(&self) -> bool {
        match self {
            Self::FetchFailed { .. }
            | Self::FetchOneFailed { .. }
            | Self::CreateFailed { .. }
            | Self::UpdateFailed { .. }
            | Self::DeleteFailed { .. } => true,
            Self::Custom { error, .. } => *error,
            _ => false,
        }
    }

    /// Loose JSON form of this event.
    #[allow(clippy::too_many_lines)]
    pub fn to_wire(&self) -> WireEvent {
        let mut meta = WireMeta::default();
        let mut payload = Value::Null;

        match self {
            Self::FetchStarted { model, params } => {
                meta.model = Some(model.clone());
                meta.params.clone_from(params);
            }
            Self::FetchSucceeded {
                model,
                params,
                payload: list,
                fetch_time,
            } => {
                meta.model = Some(model.clone());
                meta.params.clone_from(params);
                meta.fetch_time = Some(*fetch_time);
                payload = list.to_value();
            }
            Self::FetchFailed {
                model,
                params,
                error,
                fetch_time,
            } => {
                meta.model = Some(model.clone());
                meta.params.clone_from(params);
                meta.fetch_time = Some(*fetch_time);
                payload = failure_value(error);
            }
            Self::FetchOneStarted { model, id }
            | Self::UpdateStarted { model, id }
            | Self::DeleteStarted { model, id } => {
                meta.model = Some(model.clone());
                meta.id = Some(id.clone());
            }
            Self::FetchOneSucceeded {
                model,
                id,
                record,
                fetch_time,
            }
            | Self::CreateSucceeded {
                model,
                id,
                record,
                fetch_time,
            }
            | Self::UpdateSucceeded {
                model,
                id,
                record,
                fetch_time,
            } => {
                meta.model = Some(model.clone());
                meta.id = Some(id.clone());
                meta.fetch_time = Some(*fetch_time);
                payload = record.clone();
            }
            Self::FetchOneFailed {
                model,
                id,
                error,
                fetch_time,
            }
            | Self::UpdateFailed {
                model,
                id,
                error,
                fetch_time,
            }
            | Self::DeleteFailed {
                model,
                id,
                error,
                fetch_time,
            } => {
                meta.model = Some(model.clone());
                meta.id = Some(id.clone());
                meta.fetch_time = Some(*fetch_time);
                payload = failure_value(error);
            }
            Self::CreateStarted { model } => {
                meta.model = Some(model.clone());
            }
            Self::CreateFailed {
                model,
                error,
                fetch_time,
            } => {
                meta.model = Some(model.clone());
                meta.fetch_time = Some(*fetch_time);
                payload = failure_value(error);
            }
            Self::DeleteSucceeded {
                model,
                id,
                payload: body,
                fetch_time,
            } => {
                meta.model = Some(model.clone());
                meta.id = Some(id.clone());
                meta.fetch_time = Some(*fetch_time);
                payload = body.clone().unwrap_or(Value::Null);
            }
            Self::ClearActionStatus { model, verb } => {
                payload = serde_json::json!({ "model": model, "action": verb });
            }
            Self::ClearModel { model } => {
                payload = serde_json::json!({ "model": model });
            }
            Self::GarbageCollect { now } => {
                meta.now = Some(*now);
            }
            Self::Custom {
                model,
                payload: body,
                fetch_time,
                ..
            } => {
                meta.model.clone_from(model);
                meta.fetch_time = *fetch_time;
                payload = body.clone();
            }
        }

        WireEvent {
            kind: self.kind_name().to_owned(),
            payload,
            meta,
            error: self.is_error(),
        }
    }
}

fn failure_value(failure: &RequestFailure) -> Value {
    serde_json::to_value(failure).unwrap_or(Value::Null)
}

// ── WireEvent ────────────────────────────────────────────────────────

/// JSON shape of an event as exchanged with UI code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub meta: WireMeta,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

/// `meta` block of a [`WireEvent`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<QueryParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_time: Option<Millis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<Millis>,
}

fn required<T>(value: Option<T>, kind: &str, field: &str) -> Result<T, CoreError> {
    value.ok_or_else(|| CoreError::MalformedEvent {
        kind: kind.to_owned(),
        reason: format!("missing {field}"),
    })
}

/// `payload.model`, falling back to `meta.model`.
fn payload_model(payload: &Value, meta_model: Option<String>) -> Option<String> {
    payload
        .get("model")
        .and_then(Value::as_str)
        .map(String::from)
        .or(meta_model)
}

impl TryFrom<WireEvent> for CrudEvent {
    type Error = CoreError;

    /// Fails fast on events whose kind requires a field the wire form lacks,
    /// e.g. an `UPDATE` without `meta.id`.
    #[allow(clippy::too_many_lines)]
    fn try_from(wire: WireEvent) -> Result<Self, CoreError> {
        let WireEvent {
            kind,
            payload,
            meta,
            error,
        } = wire;
        let WireMeta {
            model,
            id,
            params,
            fetch_time,
            now,
        } = meta;
        let k = kind.as_str();

        let event = match k {
            FETCH => Self::FetchStarted {
                model: required(model, k, "meta.model")?,
                params,
            },
            FETCH_SUCCESS => Self::FetchSucceeded {
                model: required(model, k, "meta.model")?,
                params,
                payload: ListPayload::from_value(payload).map_err(|reason| {
                    CoreError::MalformedEvent {
                        kind: kind.clone(),
                        reason,
                    }
                })?,
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            FETCH_ERROR => Self::FetchFailed {
                model: required(model, k, "meta.model")?,
                params,
                error: RequestFailure::from_payload(payload),
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            FETCH_ONE => Self::FetchOneStarted {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
            },
            FETCH_ONE_SUCCESS => Self::FetchOneSucceeded {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
                record: payload,
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            FETCH_ONE_ERROR => Self::FetchOneFailed {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
                error: RequestFailure::from_payload(payload),
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            CREATE => Self::CreateStarted {
                model: required(model, k, "meta.model")?,
            },
            CREATE_SUCCESS => Self::CreateSucceeded {
                model: required(model, k, "meta.model")?,
                id: required(RecordId::of_record(&payload, "id").or(id), k, "payload.id")?,
                record: payload,
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            CREATE_ERROR => Self::CreateFailed {
                model: required(model, k, "meta.model")?,
                error: RequestFailure::from_payload(payload),
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            UPDATE => Self::UpdateStarted {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
            },
            UPDATE_SUCCESS => Self::UpdateSucceeded {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
                record: payload,
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            UPDATE_ERROR => Self::UpdateFailed {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
                error: RequestFailure::from_payload(payload),
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            DELETE => Self::DeleteStarted {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
            },
            DELETE_SUCCESS => Self::DeleteSucceeded {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
                payload: (!payload.is_null()).then_some(payload),
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            DELETE_ERROR => Self::DeleteFailed {
                model: required(model, k, "meta.model")?,
                id: required(id, k, "meta.id")?,
                error: RequestFailure::from_payload(payload),
                fetch_time: required(fetch_time, k, "meta.fetchTime")?,
            },
            CLEAR_ACTION_STATUS => {
                let verb = payload
                    .get("action")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<Verb>().ok());
                Self::ClearActionStatus {
                    model: required(payload_model(&payload, model), k, "payload.model")?,
                    verb: required(verb, k, "payload.action (create, update or delete)")?,
                }
            }
            CLEAR_MODEL_DATA => Self::ClearModel {
                model: required(payload_model(&payload, model), k, "payload.model")?,
            },
            GARBAGE_COLLECT => Self::GarbageCollect {
                now: required(now, k, "meta.now")?,
            },
            _ => Self::Custom {
                name: kind,
                model,
                payload,
                error,
                fetch_time,
            },
        };

        Ok(event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wire(v: Value) -> WireEvent {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn list_payload_from_bare_list() {
        let payload = ListPayload::from_value(json!([{ "id": 1 }, { "id": "b" }])).unwrap();
        let ids: Vec<_> = payload.ids().cloned().collect();
        assert_eq!(ids, vec![RecordId::Int(1), RecordId::from("b")]);
        assert!(payload.other_info.is_empty());
    }

    #[test]
    fn list_payload_from_envelope_keeps_siblings() {
        let payload =
            ListPayload::from_value(json!({ "data": [{ "id": 1 }], "total": 40, "page": 2 }))
                .unwrap();
        assert_eq!(payload.records.len(), 1);
        assert_eq!(payload.other_info, json!({ "total": 40, "page": 2 }).as_object().cloned().unwrap());
    }

    #[test]
    fn list_payload_rejects_records_without_id() {
        let err = ListPayload::from_value(json!([{ "id": 1 }, { "title": "x" }])).unwrap_err();
        assert!(err.contains("index 1"), "{err}");
        assert!(ListPayload::from_value(json!({ "total": 3 })).is_err());
        assert!(ListPayload::from_value(json!("nope")).is_err());
    }

    #[test]
    fn wire_fetch_success_parses() {
        let event = CrudEvent::try_from(wire(json!({
            "type": "FETCH_SUCCESS",
            "payload": [{ "id": 1, "title": "A" }],
            "meta": { "model": "books", "params": { "page": 1 }, "fetchTime": 100 }
        })))
        .unwrap();

        match event {
            CrudEvent::FetchSucceeded {
                model,
                params,
                payload,
                fetch_time,
            } => {
                assert_eq!(model, "books");
                assert_eq!(params, Some(QueryParams::new().with("page", 1)));
                assert_eq!(payload.records.len(), 1);
                assert_eq!(fetch_time, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn wire_error_payload_is_stored_whole() {
        let payload = json!({ "message": "bad", "fields": { "title": "required" } });
        let event = CrudEvent::try_from(wire(json!({
            "type": "FETCH_ONE_ERROR",
            "payload": payload,
            "meta": { "model": "books", "id": 4, "fetchTime": 10 },
            "error": true
        })))
        .unwrap();

        let state = crate::store::reduce(&std::sync::Arc::default(), &event);
        let entry = state.record("books", &RecordId::Int(4)).unwrap();
        let error = entry.error.as_ref().unwrap();
        assert_eq!(error.message, "bad");
        assert_eq!(error.body, Some(payload));
    }

    #[test]
    fn wire_update_without_id_fails_fast() {
        let err = CrudEvent::try_from(wire(json!({
            "type": "UPDATE",
            "meta": { "model": "books" }
        })))
        .unwrap_err();

        match err {
            CoreError::MalformedEvent { kind, reason } => {
                assert_eq!(kind, "UPDATE");
                assert_eq!(reason, "missing meta.id");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wire_clear_action_status_reads_payload() {
        let event = CrudEvent::try_from(wire(json!({
            "type": "CLEAR_ACTION_STATUS",
            "payload": { "model": "books", "action": "delete" }
        })))
        .unwrap();
        assert_eq!(
            event,
            CrudEvent::ClearActionStatus {
                model: "books".into(),
                verb: Verb::Delete
            }
        );
    }

    #[test]
    fn unknown_types_become_custom_events() {
        let event = CrudEvent::try_from(wire(json!({
            "type": "BOOKS_EXPORTED",
            "payload": { "url": "/x.csv" },
            "meta": { "model": "books", "fetchTime": 5 },
            "error": false
        })))
        .unwrap();
        assert_eq!(event.kind_name(), "BOOKS_EXPORTED");
        assert_eq!(event.model(), Some("books"));
        assert!(!event.is_error());
    }

    #[test]
    fn to_wire_marks_failures() {
        let event = CrudEvent::DeleteFailed {
            model: "books".into(),
            id: RecordId::Int(2),
            error: RequestFailure::new("locked").with_status(423),
            fetch_time: 9,
        };
        let wire = event.to_wire();
        assert!(wire.error);
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({
                "type": "DELETE_ERROR",
                "payload": { "message": "locked", "status": 423 },
                "meta": { "model": "books", "id": 2, "fetchTime": 9 },
                "error": true
            })
        );
        assert_eq!(CrudEvent::try_from(wire).unwrap(), event);
    }
}
