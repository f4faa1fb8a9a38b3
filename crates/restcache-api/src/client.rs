// ── Transport boundary ──
//
// The cache core only ever talks to the backing API through `Transport`.
// One call per HTTP verb, each taking a path plus query/body options and
// yielding the decoded body together with the response headers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// HTTP verb used for a request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Per-request tuning that bypasses the shared client defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "opt_millis")]
    pub timeout: Option<Duration>,
}

/// Query string, JSON body, and fetch tuning for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub fetch_config: FetchConfig,
}

impl RequestOptions {
    /// Flatten `params` into query pairs.
    ///
    /// Strings go through verbatim, scalars use their JSON text, arrays
    /// repeat the key, nested objects are JSON-encoded, and nulls are dropped.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.params.len());
        for (key, value) in &self.params {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if let Some(text) = scalar_text(item) {
                            pairs.push((key.clone(), text));
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_text(other) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
        }
        pairs
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Decoded response body plus response headers (lowercased names).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub body: Value,
    pub headers: BTreeMap<String, String>,
}

impl ApiResponse {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn into_parts(self) -> (Value, BTreeMap<String, String>) {
        (self.body, self.headers)
    }
}

/// The backing API as seen by the cache.
///
/// Implementors only need [`request`](Transport::request); the per-verb
/// methods delegate to it. Failures must surface as an inspectable
/// [`Error`] rather than a panic.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error>;

    async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::Get, path, options).await
    }

    async fn post(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::Post, path, options).await
    }

    async fn put(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::Put, path, options).await
    }

    async fn patch(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::Patch, path, options).await
    }

    async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::Delete, path, options).await
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
