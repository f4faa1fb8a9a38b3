// ── Request intents ──
//
// An Intent is what UI code dispatches: "fetch page 1 of books", "delete
// book 7". The orchestrator routes it to the worker for its kind, issues
// the HTTP call, and folds the outcome back in as a CrudEvent.

use std::collections::BTreeMap;

use restcache_api::{ApiResponse, FetchConfig, Method, RequestOptions};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::event::CrudEvent;
use crate::model::{Millis, QueryParams, RecordId, RequestFailure};
use crate::normalize::{Normalizer, Schema};

/// Worker stream an intent is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum IntentKind {
    Fetch,
    FetchOne,
    Create,
    Update,
    Delete,
    ApiCall,
}

impl IntentKind {
    /// Fixed HTTP method per kind. Generic calls choose their own.
    pub fn method(self) -> Option<Method> {
        match self {
            Self::Fetch | Self::FetchOne => Some(Method::Get),
            Self::Create => Some(Method::Post),
            Self::Update => Some(Method::Put),
            Self::Delete => Some(Method::Delete),
            Self::ApiCall => None,
        }
    }
}

/// The HTTP half of an intent.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: QueryParams,
    pub data: Option<Value>,
    pub fetch_config: FetchConfig,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: QueryParams::new(),
            data: None,
            fetch_config: FetchConfig::default(),
        }
    }

    pub fn options(&self) -> RequestOptions {
        RequestOptions {
            params: self.params.as_map().clone(),
            data: self.data.clone(),
            fetch_config: self.fetch_config.clone(),
        }
    }
}

/// A request the orchestrator should perform against one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    pub model: String,
    pub request: ApiRequest,
    pub schema: Schema,
    /// Target record for fetch-one/update/delete.
    pub id: Option<RecordId>,
    /// Collection key for list fetches.
    pub params: Option<QueryParams>,
    /// Event names a generic call reports under.
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
}

impl Intent {
    fn new(kind: IntentKind, model: impl Into<String>, request: ApiRequest) -> Self {
        let model = model.into();
        Self {
            kind,
            schema: Schema::new(model.clone()),
            model,
            request,
            id: None,
            params: None,
            on_success: None,
            on_failure: None,
        }
    }

    // ── Builders ─────────────────────────────────────────────────────

    /// List fetch. `params` is both the query string and the collection key.
    pub fn fetch(model: impl Into<String>, path: impl Into<String>, params: QueryParams) -> Self {
        let mut request = ApiRequest::new(Method::Get, path);
        request.params = params.clone();
        Self {
            params: Some(params),
            ..Self::new(IntentKind::Fetch, model, request)
        }
    }

    pub fn fetch_one(
        model: impl Into<String>,
        path: impl Into<String>,
        id: impl Into<RecordId>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(IntentKind::FetchOne, model, ApiRequest::new(Method::Get, path))
        }
    }

    pub fn create(model: impl Into<String>, path: impl Into<String>, data: Value) -> Self {
        let mut request = ApiRequest::new(Method::Post, path);
        request.data = Some(data);
        Self::new(IntentKind::Create, model, request)
    }

    pub fn update(
        model: impl Into<String>,
        path: impl Into<String>,
        id: impl Into<RecordId>,
        data: Value,
    ) -> Self {
        let mut request = ApiRequest::new(Method::Put, path);
        request.data = Some(data);
        Self {
            id: Some(id.into()),
            ..Self::new(IntentKind::Update, model, request)
        }
    }

    pub fn delete(
        model: impl Into<String>,
        path: impl Into<String>,
        id: impl Into<RecordId>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(IntentKind::Delete, model, ApiRequest::new(Method::Delete, path))
        }
    }

    /// Generic call whose outcome is reported as a [`CrudEvent::Custom`]
    /// named `on_success` or `on_failure`. The cache itself is not touched.
    pub fn api_call(
        model: impl Into<String>,
        method: Method,
        path: impl Into<String>,
        on_success: impl Into<String>,
        on_failure: impl Into<String>,
    ) -> Self {
        Self {
            on_success: Some(on_success.into()),
            on_failure: Some(on_failure.into()),
            ..Self::new(IntentKind::ApiCall, model, ApiRequest::new(method, path))
        }
    }

    /// Add a query parameter. On list fetches the collection key follows.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request.params = self.request.params.with(key, value);
        if self.kind == IntentKind::Fetch {
            self.params = Some(self.request.params.clone());
        }
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.request.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .fetch_config
            .headers
            .insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request.fetch_config.timeout = Some(timeout);
        self
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Reject intents whose kind needs a field they lack.
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing = |reason: &str| CoreError::MalformedIntent {
            kind: self.kind.to_string(),
            model: self.model.clone(),
            reason: reason.to_owned(),
        };

        if self.model.is_empty() {
            return Err(missing("model name is empty"));
        }
        match self.kind {
            IntentKind::FetchOne | IntentKind::Update | IntentKind::Delete
                if self.id.is_none() =>
            {
                Err(missing("missing target id"))
            }
            IntentKind::ApiCall if self.on_success.is_none() || self.on_failure.is_none() => {
                Err(missing("missing success/failure event names"))
            }
            _ => Ok(()),
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Event folded in before the request is issued. Generic calls have none.
    pub fn started_event(&self) -> Option<CrudEvent> {
        let model = self.model.clone();
        let event = match self.kind {
            IntentKind::Fetch => CrudEvent::FetchStarted {
                model,
                params: self.params.clone(),
            },
            IntentKind::FetchOne => CrudEvent::FetchOneStarted {
                model,
                id: self.id.clone()?,
            },
            IntentKind::Create => CrudEvent::CreateStarted { model },
            IntentKind::Update => CrudEvent::UpdateStarted {
                model,
                id: self.id.clone()?,
            },
            IntentKind::Delete => CrudEvent::DeleteStarted {
                model,
                id: self.id.clone()?,
            },
            IntentKind::ApiCall => return None,
        };
        Some(event)
    }

    /// Result event for a successful response.
    ///
    /// A body the normalizer cannot make sense of is reported as a failure
    /// of this intent, like any other operational error.
    pub fn success_event(
        &self,
        response: ApiResponse,
        normalizer: &dyn Normalizer,
        fetch_time: Millis,
    ) -> CrudEvent {
        let (body, headers) = response.into_parts();
        let model = self.model.clone();

        if self.kind == IntentKind::Delete {
            return match self.id.clone() {
                Some(id) => CrudEvent::DeleteSucceeded {
                    model,
                    id,
                    payload: (!body.is_null()).then_some(body),
                    fetch_time,
                },
                None => self.failure(RequestFailure::new("missing target id"), fetch_time),
            };
        }

        let normalized = match normalizer.normalize(&body, &self.schema) {
            Ok(normalized) => normalized,
            Err(err) => {
                let failure = RequestFailure {
                    message: err.to_string(),
                    status: None,
                    body: Some(body),
                };
                return self.failure(failure, fetch_time);
            }
        };

        match (self.kind, self.id.clone()) {
            (IntentKind::Fetch, _) => CrudEvent::FetchSucceeded {
                model,
                params: self.params.clone(),
                payload: normalized.into_list(&self.schema.model),
                fetch_time,
            },
            (IntentKind::FetchOne, Some(id)) => match normalized.into_single(&self.schema.model) {
                Some((_, record)) => CrudEvent::FetchOneSucceeded {
                    model,
                    id,
                    record,
                    fetch_time,
                },
                None => self.failure(RequestFailure::new("response contained no record"), fetch_time),
            },
            (IntentKind::Create, _) => match normalized.into_single(&self.schema.model) {
                Some((id, record)) => CrudEvent::CreateSucceeded {
                    model,
                    id,
                    record,
                    fetch_time,
                },
                None => self.failure(
                    RequestFailure::new("created record has no id"),
                    fetch_time,
                ),
            },
            // An empty update response keeps the submitted body as the record.
            (IntentKind::Update, Some(id)) => CrudEvent::UpdateSucceeded {
                model,
                id,
                record: normalized
                    .into_single(&self.schema.model)
                    .map(|(_, record)| record)
                    .or_else(|| self.request.data.clone())
                    .unwrap_or(Value::Null),
                fetch_time,
            },
            (IntentKind::ApiCall, _) => CrudEvent::Custom {
                name: self.on_success.clone().unwrap_or_default(),
                payload: with_headers(normalized.to_value(&self.schema.model), headers),
                model: Some(model),
                error: false,
                fetch_time: Some(fetch_time),
            },
            _ => self.failure(RequestFailure::new("missing target id"), fetch_time),
        }
    }

    /// Result event for a failed request.
    pub fn failure_event(&self, err: &restcache_api::Error, fetch_time: Millis) -> CrudEvent {
        self.failure(RequestFailure::from(err), fetch_time)
    }

    fn failure(&self, error: RequestFailure, fetch_time: Millis) -> CrudEvent {
        let model = self.model.clone();
        match (self.kind, self.id.clone()) {
            (IntentKind::Fetch, _) => CrudEvent::FetchFailed {
                model,
                params: self.params.clone(),
                error,
                fetch_time,
            },
            (IntentKind::FetchOne, Some(id)) => CrudEvent::FetchOneFailed {
                model,
                id,
                error,
                fetch_time,
            },
            (IntentKind::Create, _) => CrudEvent::CreateFailed {
                model,
                error,
                fetch_time,
            },
            (IntentKind::Update, Some(id)) => CrudEvent::UpdateFailed {
                model,
                id,
                error,
                fetch_time,
            },
            (IntentKind::Delete, Some(id)) => CrudEvent::DeleteFailed {
                model,
                id,
                error,
                fetch_time,
            },
            // Generic calls, and id-less intents that slipped past validation.
            _ => CrudEvent::Custom {
                name: self
                    .on_failure
                    .clone()
                    .unwrap_or_else(|| format!("{}_ERROR", self.kind.to_string().to_uppercase())),
                payload: serde_json::to_value(&error).unwrap_or(Value::Null),
                model: Some(model),
                error: true,
                fetch_time: Some(fetch_time),
            },
        }
    }
}

/// Response headers ride along on generic-call payloads.
fn with_headers(mut payload: Value, headers: BTreeMap<String, String>) -> Value {
    if let Value::Object(map) = &mut payload {
        let headers: Map<String, Value> = headers
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();
        map.insert("headers".to_owned(), Value::Object(headers));
    }
    payload
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::normalize::FlatNormalizer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn verb_to_method_mapping() {
        let methods: Vec<_> = IntentKind::iter().map(IntentKind::method).collect();
        assert_eq!(
            methods,
            vec![
                Some(Method::Get),
                Some(Method::Get),
                Some(Method::Post),
                Some(Method::Put),
                Some(Method::Delete),
                None,
            ]
        );
        let call = Intent::api_call("books", Method::Patch, "/books/1/star", "STARRED", "STAR_FAILED");
        assert_eq!(call.request.method, Method::Patch);
    }

    #[test]
    fn fetch_params_are_query_and_key() {
        let intent = Intent::fetch("books", "/books", QueryParams::new().with("page", 2));
        assert_eq!(intent.request.options().params, json!({ "page": 2 }).as_object().cloned().unwrap());
        assert_eq!(
            intent.started_event(),
            Some(CrudEvent::FetchStarted {
                model: "books".into(),
                params: Some(QueryParams::new().with("page", 2)),
            })
        );
    }

    #[test]
    fn query_on_list_fetch_moves_the_collection_key() {
        let page_one = Intent::fetch("books", "/books", QueryParams::new()).with_query("page", 1);
        let page_two = Intent::fetch("books", "/books", QueryParams::new()).with_query("page", 2);
        assert_ne!(page_one.started_event(), page_two.started_event());
        assert_eq!(page_two.params, Some(QueryParams::new().with("page", 2)));
        assert_eq!(page_two.request.params, QueryParams::new().with("page", 2));

        let one = Intent::fetch_one("books", "/books/1", RecordId::Int(1)).with_query("expand", "author");
        assert_eq!(one.params, None);
    }

    #[test]
    fn update_without_id_is_rejected() {
        let mut intent = Intent::update("books", "/books/1", RecordId::Int(1), json!({}));
        assert!(intent.validate().is_ok());
        intent.id = None;
        let err = intent.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed update intent for model books: missing target id"
        );
    }

    #[test]
    fn api_call_has_no_started_event() {
        let intent = Intent::api_call("books", Method::Post, "/books/export", "EXPORTED", "EXPORT_FAILED");
        assert_eq!(intent.started_event(), None);
    }

    #[test]
    fn create_success_takes_id_from_response() {
        let intent = Intent::create("books", "/books", json!({ "title": "C" }));
        let event = intent.success_event(
            ApiResponse::new(json!({ "id": 12, "title": "C" })),
            &FlatNormalizer,
            500,
        );
        assert_eq!(
            event,
            CrudEvent::CreateSucceeded {
                model: "books".into(),
                id: RecordId::Int(12),
                record: json!({ "id": 12, "title": "C" }),
                fetch_time: 500,
            }
        );
    }

    #[test]
    fn create_response_without_id_is_a_failure() {
        let intent = Intent::create("books", "/books", json!({ "title": "C" }));
        let event = intent.success_event(ApiResponse::new(Value::Null), &FlatNormalizer, 500);
        assert!(matches!(event, CrudEvent::CreateFailed { .. }));
    }

    #[test]
    fn empty_update_response_keeps_submitted_data() {
        let intent = Intent::update("books", "/books/3", RecordId::Int(3), json!({ "id": 3, "title": "D" }));
        let event = intent.success_event(ApiResponse::new(Value::Null), &FlatNormalizer, 1);
        match event {
            CrudEvent::UpdateSucceeded { record, .. } => {
                assert_eq!(record, json!({ "id": 3, "title": "D" }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn list_success_honours_envelope() {
        let intent = Intent::fetch("books", "/books", QueryParams::new().with("page", 1));
        let event = intent.success_event(
            ApiResponse::new(json!({ "data": [{ "id": 1 }], "total": 1 })),
            &FlatNormalizer,
            7,
        );
        match event {
            CrudEvent::FetchSucceeded { payload, fetch_time, .. } => {
                assert_eq!(fetch_time, 7);
                assert_eq!(payload.records.len(), 1);
                assert_eq!(payload.other_info.get("total"), Some(&json!(1)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unnormalizable_list_is_reported_as_failure() {
        let intent = Intent::fetch("books", "/books", QueryParams::new());
        let event = intent.success_event(ApiResponse::new(json!("oops")), &FlatNormalizer, 7);
        match event {
            CrudEvent::FetchFailed { error, .. } => {
                assert_eq!(error.message, "expected a list or an object, got a string");
                assert_eq!(error.body, Some(json!("oops")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_call_outcomes_use_caller_names() {
        let intent = Intent::api_call("books", Method::Post, "/books/export", "EXPORTED", "EXPORT_FAILED");
        let mut response = ApiResponse::new(json!([{ "id": 1 }]));
        response.headers.insert("x-total-count".into(), "1".into());
        let ok = intent.success_event(response, &FlatNormalizer, 3);
        assert_eq!(ok.kind_name(), "EXPORTED");
        assert!(!ok.is_error());
        match &ok {
            CrudEvent::Custom { payload, .. } => {
                assert_eq!(payload["ids"], json!([1]));
                assert_eq!(payload["headers"], json!({ "x-total-count": "1" }));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = restcache_api::Error::Http {
            status: 500,
            message: "boom".into(),
            body: json!({ "message": "boom" }),
        };
        let failed = intent.failure_event(&err, 3);
        assert_eq!(failed.kind_name(), "EXPORT_FAILED");
        assert!(failed.is_error());
    }

    #[test]
    fn delete_failure_carries_target() {
        let intent = Intent::delete("books", "/books/2", RecordId::Int(2));
        let err = restcache_api::Error::Http {
            status: 409,
            message: "in use".into(),
            body: Value::Null,
        };
        assert_eq!(
            intent.failure_event(&err, 9),
            CrudEvent::DeleteFailed {
                model: "books".into(),
                id: RecordId::Int(2),
                error: RequestFailure {
                    message: "in use".into(),
                    status: Some(409),
                    body: Some(Value::Null),
                },
                fetch_time: 9,
            }
        );
    }
}
