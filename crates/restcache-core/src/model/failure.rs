// ── Request failures as data ──
//
// A failed API call never propagates as an error. It is captured in this
// shape and stored on the record, collection, or action slot it targeted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inspectable description of a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Interpret an arbitrary error payload.
    ///
    /// Payloads exactly in the failure shape are taken as-is; anything else,
    /// including a failure shape with extra fields, is kept verbatim in `body`.
    pub fn from_payload(payload: Value) -> Self {
        if let Ok(StrictFailure {
            message,
            status,
            body,
        }) = serde_json::from_value(payload.clone())
        {
            return Self {
                message,
                status,
                body,
            };
        }
        let message = match &payload {
            Value::String(s) => s.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_owned(),
            _ => "request failed".to_owned(),
        };
        Self {
            message,
            status: None,
            body: Some(payload),
        }
    }

    /// Whether the server reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// The failure shape with no room for anything else.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictFailure {
    message: String,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    body: Option<Value>,
}

impl From<&restcache_api::Error> for RequestFailure {
    fn from(err: &restcache_api::Error) -> Self {
        let message = match err {
            restcache_api::Error::Http { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            message,
            status: err.status(),
            body: err.body().cloned(),
        }
    }
}
