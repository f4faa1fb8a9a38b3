// HTTP transport
//
// Wraps `reqwest::Client` with base-URL joining, query flattening, and
// status/body decoding. Every verb funnels through `Transport::request`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::client::{ApiResponse, Method, RequestOptions, Transport};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Longest body excerpt carried in error messages.
const BODY_PREVIEW: usize = 200;

/// reqwest-backed [`Transport`] for a JSON REST API rooted at `base_url`.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl HttpTransport {
    /// Create a transport from a `TransportConfig`.
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout.as_secs(),
        })
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout_secs: 0,
        }
    }

    /// The API root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Join a request path onto the API root: `{base}/{path}`.
    ///
    /// Absolute URLs are passed through untouched.
    pub(crate) fn url_for(&self, path: &str) -> Result<Url, Error> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Response handling ────────────────────────────────────────────

    /// Decode the body, mapping non-success statuses to `Error::Http`.
    async fn parse_response(&self, resp: reqwest::Response) -> Result<ApiResponse, Error> {
        let status = resp.status();
        let headers = collect_headers(resp.headers());
        let text = resp.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));
            return Err(Error::Http {
                status: status.as_u16(),
                message: error_message(&body, status),
                body,
            });
        }

        if text.trim().is_empty() {
            return Ok(ApiResponse {
                body: Value::Null,
                headers,
            });
        }

        let body = serde_json::from_str(&text).map_err(|e| {
            let preview = &text[..floor_char_boundary(&text, BODY_PREVIEW)];
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: text.clone(),
            }
        })?;

        Ok(ApiResponse { body, headers })
    }

    fn map_transport(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        let url = self.url_for(path)?;
        debug!(%method, %url, "sending request");

        let mut builder = self
            .http
            .request(method.into(), url)
            .query(&options.query_pairs());
        for (name, value) in &options.fetch_config.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = options.fetch_config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(ref data) = options.data {
            builder = builder.json(data);
        }

        let resp = builder.send().await.map_err(|e| self.map_transport(e))?;
        trace!(status = %resp.status(), "response received");
        self.parse_response(resp).await
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect()
}

/// Pull a human-readable message out of a JSON error body.
fn error_message(body: &Value, status: reqwest::StatusCode) -> String {
    let from_body = match body {
        Value::Object(map) => ["message", "error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(String::from),
        Value::String(text) if !text.is_empty() => {
            Some(text[..floor_char_boundary(text, BODY_PREVIEW)].to_owned())
        }
        _ => None,
    };
    from_body.unwrap_or_else(|| status.to_string())
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}
